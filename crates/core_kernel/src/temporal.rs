//! Date handling for reporting windows

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors related to temporal operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemporalError {
    #[error("Invalid period: start {start} must not be after end {end}")]
    InvalidPeriod {
        start: String,
        end: String,
    },

    #[error("Date {0} is in the future")]
    FutureDate(String),
}

/// An inclusive calendar-date window, either side optionally open
///
/// Used for payment-date filtering and the per-HMO summary. A missing bound
/// means "no constraint on that side".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self, TemporalError> {
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(TemporalError::InvalidPeriod {
                    start: s.to_string(),
                    end: e.to_string(),
                });
            }
        }
        Ok(Self { start, end })
    }

    /// Creates a bounded range
    pub fn between(start: NaiveDate, end: NaiveDate) -> Result<Self, TemporalError> {
        Self::new(Some(start), Some(end))
    }

    /// A range with no bounds
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Returns true if the timestamp falls on the given calendar date (UTC)
///
/// Claim filters compare the creation date only, never the full timestamp.
pub fn same_calendar_day(timestamp: DateTime<Utc>, date: NaiveDate) -> bool {
    timestamp.date_naive() == date
}

/// Rejects dates after `today`
pub fn ensure_not_future(date: NaiveDate, today: NaiveDate) -> Result<(), TemporalError> {
    if date > today {
        return Err(TemporalError::FutureDate(date.to_string()));
    }
    Ok(())
}
