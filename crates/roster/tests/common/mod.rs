//! Shared harness for roster integration tests.

#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use keygate_client::ChainReader;
use keygate_membership::MembershipService;
use keygate_roster::{PortalUser, RosterManager, UserDirectory};
use keygate_store::{KeyValueStore, MemoryStore};
use keygate_test_utils::{
    ScriptedChain,
    fixtures::{CHAIN, membership_config, tier, two_tiers, wallet},
};
use keygate_types::{TokenId, config::RosterCacheConfig};
use parking_lot::RwLock;

/// A directory whose user list tests mutate between rebuilds.
#[derive(Default)]
pub struct ScriptedDirectory {
    users: RwLock<Vec<PortalUser>>,
}

impl ScriptedDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_users(&self, users: Vec<PortalUser>) {
        *self.users.write() = users;
    }
}

#[async_trait]
impl UserDirectory for ScriptedDirectory {
    async fn list_users(&self) -> Result<Vec<PortalUser>, String> {
        Ok(self.users.read().clone())
    }
}

/// A portal user with one linked wallet, `wallet(n)`.
pub fn user(n: u64) -> PortalUser {
    PortalUser {
        user_id: format!("user-{n:03}"),
        display_name: Some(format!("User {n}")),
        email: Some(format!("user{n}@example.com")),
        addresses: vec![wallet(n)],
        auto_renew: Some(n % 2 == 0),
    }
}

/// Everything a roster test needs, wired over one shared in-memory store.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub chain: Arc<ScriptedChain>,
    pub directory: Arc<ScriptedDirectory>,
    pub membership: Arc<MembershipService>,
    pub manager: RosterManager,
}

impl Harness {
    pub fn new(config: RosterCacheConfig) -> Self {
        keygate_test_utils::init_tracing();
        let store = Arc::new(MemoryStore::new());
        let chain = Arc::new(ScriptedChain::new());
        let directory = Arc::new(ScriptedDirectory::new());
        let membership = Arc::new(MembershipService::new(
            Arc::clone(&chain) as Arc<dyn ChainReader>,
            None,
            two_tiers(),
            CHAIN,
            &membership_config(),
        ));
        let manager = RosterManager::new(
            Arc::clone(&store) as Arc<dyn KeyValueStore>,
            Arc::clone(&directory) as Arc<dyn UserDirectory>,
            Arc::clone(&membership),
            config,
        );
        Self { store, chain, directory, membership, manager }
    }

    /// Gives `user(n)` an active patron key expiring one hour out.
    pub fn grant_patron_key(&self, n: u64) {
        let expiry = u64::try_from(keygate_types::epoch_ms_now() / 1000).unwrap() + 3600;
        self.chain.set_key(
            &tier("patron", 1).contract_address,
            &wallet(n),
            TokenId::new(n),
            Some(expiry),
            true,
        );
    }

    /// Revokes `user(n)`'s patron key.
    pub fn revoke_patron_key(&self, n: u64) {
        self.chain.clear_key(&tier("patron", 1).contract_address, &wallet(n));
    }
}
