//! Availability and booking-conflict engine for a nightly rental marketplace.
//!
//! Reservations are half-open ranges of calendar days. One overlap rule,
//! [`model::DateRange::overlaps`], backs booking admission, calendar blocking
//! and search filtering, and admission for a listing is serialized behind
//! that listing's lock so overlapping requests have exactly one winner.

pub mod compactor;
pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod wal;

pub use config::EngineConfig;
pub use engine::{
    AvailabilityIndex, BookingError, Engine, ReservationSource, ValidationError,
    filter_by_search_availability, filter_listings,
};
pub use model::{DateRange, Location, Reservation, ReservationStatus, SearchQuery};
