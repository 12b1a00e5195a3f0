use chrono::NaiveDate;
use thiserror::Error;
use ulid::Ulid;

use crate::model::{DateRange, ReservationStatus};

/// Input that can never be admitted, no matter what else is booked.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("check-out {end} must be after check-in {start}")]
    EmptyRange { start: NaiveDate, end: NaiveDate },
    #[error("invalid date {0:?}: expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("check-in {start} is in the past (today is {today})")]
    InPast { start: NaiveDate, today: NaiveDate },
    #[error("stay of {nights} nights exceeds the {max} night maximum")]
    StayTooLong { nights: u32, max: u32 },
    #[error("check-in {start} is beyond the booking horizon ({horizon})")]
    BeyondHorizon { start: NaiveDate, horizon: NaiveDate },
}

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("listing {listing_id} is already booked for {}", format_ranges(.blocking))]
    Conflict {
        listing_id: Ulid,
        /// The active reservations standing in the way.
        blocking: Vec<DateRange>,
    },
    #[error("user {actor_id} may not change reservation {reservation_id}")]
    Unauthorized { actor_id: Ulid, reservation_id: Ulid },
    #[error("cannot move reservation from {from} to {to}")]
    InvalidTransition {
        from: ReservationStatus,
        to: ReservationStatus,
    },
    #[error("not found: {0}")]
    NotFound(Ulid),
    #[error("already exists: {0}")]
    AlreadyExists(Ulid),
    #[error("listing {0} still has active reservations")]
    HasActiveReservations(Ulid),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("transient store failure: {0}")]
    TransientStore(String),
}

impl BookingError {
    /// Only store contention is worth retrying, and only from scratch.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BookingError::TransientStore(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, BookingError::Conflict { .. })
    }
}

fn format_ranges(ranges: &[DateRange]) -> String {
    ranges
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_message_lists_blocking_ranges() {
        let err = BookingError::Conflict {
            listing_id: Ulid::nil(),
            blocking: vec![
                DateRange::parse("2024-06-10", "2024-06-15").unwrap(),
                DateRange::parse("2024-06-20", "2024-06-22").unwrap(),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("[2024-06-10, 2024-06-15)"));
        assert!(msg.contains("[2024-06-20, 2024-06-22)"));
        assert!(!err.is_retryable());
        assert!(err.is_conflict());
    }

    #[test]
    fn only_transient_is_retryable() {
        assert!(BookingError::TransientStore("lock timeout".into()).is_retryable());
        assert!(!BookingError::NotFound(Ulid::nil()).is_retryable());
        let v: BookingError = ValidationError::InvalidDate("x".into()).into();
        assert!(matches!(v, BookingError::Validation(_)));
        assert!(!v.is_retryable());
    }
}
