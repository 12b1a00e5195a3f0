use chrono::{Days, NaiveDate, Utc};

use crate::limits::*;
use crate::model::*;

use super::availability::AvailabilityIndex;
use super::{BookingError, ValidationError};

/// Today's calendar day. Dates are timezone-naive; UTC is the reference.
pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Checks that only depend on the request itself and the clock.
pub(crate) fn validate_stay(range: &DateRange, today: NaiveDate) -> Result<(), ValidationError> {
    if range.start() < today {
        return Err(ValidationError::InPast {
            start: range.start(),
            today,
        });
    }
    if range.nights() > MAX_STAY_NIGHTS {
        return Err(ValidationError::StayTooLong {
            nights: range.nights(),
            max: MAX_STAY_NIGHTS,
        });
    }
    let horizon = today
        .checked_add_days(Days::new(MAX_BOOKING_HORIZON_DAYS))
        .unwrap_or(NaiveDate::MAX);
    if range.start() > horizon {
        return Err(ValidationError::BeyondHorizon {
            start: range.start(),
            horizon,
        });
    }
    Ok(())
}

pub(crate) fn check_no_conflict(listing: &ListingState, range: &DateRange) -> Result<(), BookingError> {
    let index = AvailabilityIndex::for_listing(listing);
    if index.is_range_free(range) {
        return Ok(());
    }
    Err(BookingError::Conflict {
        listing_id: listing.id,
        blocking: index.conflicts(range),
    })
}

pub(crate) fn total_price(listing: &ListingState, range: &DateRange) -> Result<u64, BookingError> {
    u64::from(range.nights())
        .checked_mul(listing.nightly_rate)
        .ok_or(BookingError::LimitExceeded("total price overflows"))
}

pub(crate) fn validate_window(window: &DateRange) -> Result<(), BookingError> {
    if window.nights() > MAX_CALENDAR_WINDOW_DAYS {
        return Err(BookingError::LimitExceeded("calendar window too wide"));
    }
    Ok(())
}
