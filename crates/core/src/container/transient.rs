//! Per-stress-period wrapper with carry-forward semantics.
//!
//! A value set at period `p` stays in force for every later period until
//! the next explicit set. Periods are positive, sparse, and not
//! necessarily contiguous.

use std::collections::BTreeMap;

use crate::error::DataError;

#[derive(Debug, Clone, Default)]
pub struct Transient<T> {
    periods: BTreeMap<u32, T>,
}

impl<T> Transient<T> {
    pub fn new() -> Transient<T> {
        Transient {
            periods: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    /// Store `value` as the active value for `period` and all following
    /// periods, until the next explicit set.
    pub fn set(&mut self, period: u32, value: T) -> Result<(), DataError> {
        if period == 0 {
            return Err(DataError::InvalidPeriod { period: 0 });
        }
        self.periods.insert(period, value);
        Ok(())
    }

    /// The value in force at `period`: the entry at the greatest explicit
    /// period <= `period`, or None if none has been set yet.
    pub fn at(&self, period: u32) -> Option<&T> {
        self.periods.range(..=period).next_back().map(|(_, v)| v)
    }

    pub fn at_mut(&mut self, period: u32) -> Option<&mut T> {
        self.periods
            .range_mut(..=period)
            .next_back()
            .map(|(_, v)| v)
    }

    /// The value explicitly set at `period`, ignoring carry-forward.
    pub fn explicit_at(&self, period: u32) -> Option<&T> {
        self.periods.get(&period)
    }

    /// Remove the explicit entry at `period`, if any.
    pub fn clear_at(&mut self, period: u32) -> Option<T> {
        self.periods.remove(&period)
    }

    /// Explicitly-set periods, ascending.
    pub fn periods(&self) -> Vec<u32> {
        self.periods.keys().copied().collect()
    }
}
