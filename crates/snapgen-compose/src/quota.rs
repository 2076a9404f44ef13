//! Daily backend call budget
//!
//! The count resets the first time it is touched on a new UTC date.

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;

use crate::error::GenerativeError;

#[derive(Debug)]
struct QuotaState {
    day: NaiveDate,
    used: u32,
}

/// Calls-per-day limiter
#[derive(Debug)]
pub struct DailyQuota {
    limit: u32,
    state: Mutex<QuotaState>,
}

impl DailyQuota {
    #[must_use]
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            state: Mutex::new(QuotaState {
                day: Utc::now().date_naive(),
                used: 0,
            }),
        }
    }

    /// Take one call from today's budget
    ///
    /// # Errors
    /// Returns [`GenerativeError::QuotaExceeded`] when the budget is spent.
    pub fn try_acquire(&self) -> Result<(), GenerativeError> {
        self.try_acquire_on(Utc::now().date_naive())
    }

    /// Take one call from the budget of `today`
    ///
    /// # Errors
    /// Returns [`GenerativeError::QuotaExceeded`] when the budget is spent.
    pub fn try_acquire_on(&self, today: NaiveDate) -> Result<(), GenerativeError> {
        let mut state = self.state.lock();
        if state.day != today {
            tracing::info!(previous = %state.day, used = state.used, "daily quota reset");
            state.day = today;
            state.used = 0;
        }
        if state.used >= self.limit {
            return Err(GenerativeError::QuotaExceeded { limit: self.limit });
        }
        state.used += 1;
        Ok(())
    }

    /// Calls left today
    #[must_use]
    pub fn remaining(&self) -> u32 {
        let state = self.state.lock();
        if state.day == Utc::now().date_naive() {
            self.limit.saturating_sub(state.used)
        } else {
            self.limit
        }
    }

    #[inline]
    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn exhausts_then_resets_next_day() {
        let quota = DailyQuota::new(2);
        assert!(quota.try_acquire_on(day(1)).is_ok());
        assert!(quota.try_acquire_on(day(1)).is_ok());
        assert!(matches!(
            quota.try_acquire_on(day(1)),
            Err(GenerativeError::QuotaExceeded { limit: 2 })
        ));
        assert!(quota.try_acquire_on(day(2)).is_ok());
    }

    #[test]
    fn zero_limit_refuses_everything() {
        let quota = DailyQuota::new(0);
        assert!(quota.try_acquire().is_err());
        assert_eq!(quota.remaining(), 0);
    }
}
