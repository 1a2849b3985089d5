//! The daily transaction budget.
//!
//! One counter record per `(chain, sponsor, UTC day, scope)`. Day-keying
//! makes reset implicit — a new day is simply a new record — and the
//! increment carries its upper bound in the store condition, so the cap
//! holds under any interleaving without a read-then-write race.

use std::sync::Arc;

use chrono::Utc;
use keygate_store::{Condition, Key, KeyValueStore, Update};
use keygate_types::{Address, ChainId};

use crate::error::{Result, SponsorError};

const COUNT_ATTR: &str = "tx_count";

/// A successful budget reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotReservation {
    /// The UTC day the slot was reserved in.
    pub day: String,
    /// Slots used so far today, including this one.
    pub used: u32,
    /// The configured daily maximum.
    pub max: u32,
}

/// The current UTC day as `YYYY-MM-DD`.
#[must_use]
pub fn current_utc_day() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

/// Reserves daily transaction slots against the shared store.
#[derive(Clone)]
pub struct DailyBudget {
    store: Arc<dyn KeyValueStore>,
}

impl DailyBudget {
    /// Creates a budget over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Reserves one slot for today.
    ///
    /// Returns `Ok(None)` immediately when `max_per_day` is unset (no limit
    /// configured). Never retried: a [`SponsorError::DailyLimitReached`] is
    /// final until the next UTC day.
    ///
    /// # Errors
    ///
    /// [`SponsorError::DailyLimitReached`] when the cap is hit;
    /// [`SponsorError::Store`] on backend failure.
    pub async fn reserve(
        &self,
        chain_id: ChainId,
        sponsor: &Address,
        max_per_day: Option<u32>,
        scope: Option<&str>,
    ) -> Result<Option<SlotReservation>> {
        match max_per_day {
            None => Ok(None),
            Some(max) => self
                .reserve_for_day(chain_id, sponsor, max, scope, &current_utc_day())
                .await
                .map(Some),
        }
    }

    /// Reserves one slot for an explicit day.
    ///
    /// The check and the increment are one conditional update: the store
    /// enforces `count < max`, not the application.
    pub(crate) async fn reserve_for_day(
        &self,
        chain_id: ChainId,
        sponsor: &Address,
        max: u32,
        scope: Option<&str>,
        day: &str,
    ) -> Result<SlotReservation> {
        let key = Self::counter_key(chain_id, sponsor, scope, day);
        let condition = Condition::Or(vec![
            Condition::Absent(COUNT_ATTR.to_string()),
            Condition::NumberLessThan(COUNT_ATTR.to_string(), i64::from(max)),
        ]);

        match self
            .store
            .conditional_update(&key, Update::new().add(COUNT_ATTR, 1), condition)
            .await
        {
            Ok(record) => {
                let used = u32::try_from(record.get_i64(COUNT_ATTR).unwrap_or(0)).unwrap_or(0);
                tracing::debug!(day, used, max, sponsor = sponsor.as_str(), "daily slot reserved");
                Ok(SlotReservation { day: day.to_string(), used, max })
            },
            Err(e) if e.is_condition_failure() => {
                tracing::debug!(day, max, sponsor = sponsor.as_str(), "daily budget exhausted");
                Err(SponsorError::DailyLimitReached { day: day.to_string(), max })
            },
            Err(source) => Err(SponsorError::Store { source }),
        }
    }

    fn counter_key(chain_id: ChainId, sponsor: &Address, scope: Option<&str>, day: &str) -> Key {
        let sort = match scope {
            Some(scope) => format!("{chain_id}#{sponsor}#{day}#{scope}"),
            None => format!("{chain_id}#{sponsor}#{day}"),
        };
        Key::new("sponsor#budget", sort)
    }
}
