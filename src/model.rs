use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::ValidationError;

pub type ListingId = Ulid;
pub type ReservationId = Ulid;
pub type UserId = Ulid;

/// ISO-8601 calendar date format used at the boundary.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Half-open range of calendar days `[start, end)`.
///
/// `start` is the check-in day, `end` the check-out day. The nights occupied
/// are `start` through the day before `end`, so a checkout and a check-in on
/// the same day never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawDateRange")]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Deserialize)]
struct RawDateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<RawDateRange> for DateRange {
    type Error = ValidationError;

    fn try_from(raw: RawDateRange) -> Result<Self, Self::Error> {
        DateRange::new(raw.start, raw.end)
    }
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ValidationError> {
        if start >= end {
            return Err(ValidationError::EmptyRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// For bounds already known to be ordered (merging, clamping).
    pub(crate) fn from_ordered(start: NaiveDate, end: NaiveDate) -> Self {
        debug_assert!(start < end, "DateRange start must be before end");
        Self { start, end }
    }

    /// Parse a check-in/check-out pair of `YYYY-MM-DD` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self, ValidationError> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn nights(&self) -> u32 {
        u32::try_from((self.end - self.start).num_days()).unwrap_or(u32::MAX)
    }

    /// The one overlap rule. Everything that asks "do these collide?" ends up here.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_day(&self, day: NaiveDate) -> bool {
        self.start <= day && day < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_range(&self, other: &DateRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// The overlapping part of two ranges, if any.
    pub fn intersection(&self, other: &DateRange) -> Option<DateRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(DateRange { start, end })
    }

    /// Every occupied night, in order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d < end)
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.format(DATE_FORMAT),
            self.end.format(DATE_FORMAT)
        )
    }
}

pub fn parse_date(s: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|_| ValidationError::InvalidDate(s.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl ReservationStatus {
    /// Active reservations occupy their nights. Pending requests hold the slot
    /// just like confirmed ones.
    pub fn is_active(self) -> bool {
        matches!(self, ReservationStatus::Pending | ReservationStatus::Confirmed)
    }

    pub fn can_transition_to(self, next: ReservationStatus) -> bool {
        use ReservationStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub listing_id: ListingId,
    pub guest_id: UserId,
    pub range: DateRange,
    pub status: ReservationStatus,
    /// `nights × nightly_rate`, in minor currency units.
    pub total_price: u64,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Anything that carries a listing's reservation set. Search filtering is
/// written against this so hosts can pass their own listing rows.
pub trait HasReservations {
    fn reservations(&self) -> &[Reservation];
}

impl HasReservations for Vec<Reservation> {
    fn reservations(&self) -> &[Reservation] {
        self
    }
}

#[derive(Debug, Clone)]
pub struct ListingState {
    pub id: ListingId,
    pub owner_id: UserId,
    /// Price per night in minor currency units.
    pub nightly_rate: u64,
    pub max_guests: u32,
    pub location: Option<Location>,
    /// All reservations including cancelled ones, sorted by `range.start`.
    pub reservations: Vec<Reservation>,
}

impl ListingState {
    pub fn new(id: ListingId, owner_id: UserId, nightly_rate: u64, max_guests: u32) -> Self {
        Self {
            id,
            owner_id,
            nightly_rate,
            max_guests,
            location: None,
            reservations: Vec::new(),
        }
    }

    /// Insert reservation maintaining sort order by check-in.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .partition_point(|r| r.range.start() <= reservation.range.start());
        self.reservations.insert(pos, reservation);
    }

    pub fn get(&self, id: ReservationId) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    pub fn get_mut(&mut self, id: ReservationId) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    pub fn active(&self) -> impl Iterator<Item = &Reservation> {
        self.reservations.iter().filter(|r| r.is_active())
    }

    pub fn has_active(&self) -> bool {
        self.reservations.iter().any(Reservation::is_active)
    }

    /// Reservations (any status) whose range overlaps `query`.
    /// Binary search skips everything checking in on or after `query.end`.
    pub fn overlapping(&self, query: &DateRange) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.range.start() < query.end());
        let query = *query;
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.range.overlaps(&query))
    }

    pub fn snapshot(&self) -> ListingSnapshot {
        ListingSnapshot {
            id: self.id,
            owner_id: self.owner_id,
            nightly_rate: self.nightly_rate,
            max_guests: self.max_guests,
            location: self.location.clone(),
            reservations: self.active().cloned().collect(),
        }
    }
}

impl HasReservations for ListingState {
    fn reservations(&self) -> &[Reservation] {
        &self.reservations
    }
}

/// The event types. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ListingRegistered {
        id: ListingId,
        owner_id: UserId,
        nightly_rate: u64,
        max_guests: u32,
    },
    ListingUpdated {
        id: ListingId,
        nightly_rate: u64,
        max_guests: u32,
    },
    ListingLocated {
        id: ListingId,
        location: Location,
    },
    ListingRemoved {
        id: ListingId,
    },
    ReservationAdmitted {
        reservation: Reservation,
    },
    ReservationStatusChanged {
        id: ReservationId,
        listing_id: ListingId,
        status: ReservationStatus,
    },
}

impl Event {
    pub fn listing_id(&self) -> ListingId {
        match self {
            Event::ListingRegistered { id, .. }
            | Event::ListingUpdated { id, .. }
            | Event::ListingLocated { id, .. }
            | Event::ListingRemoved { id } => *id,
            Event::ReservationAdmitted { reservation } => reservation.listing_id,
            Event::ReservationStatusChanged { listing_id, .. } => *listing_id,
        }
    }
}

/// Where a listing is, as shown on the search page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub city: String,
    pub country: String,
}

impl Location {
    pub fn new(city: impl Into<String>, country: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            country: country.into(),
        }
    }

    /// Case-insensitive substring match against the city or the country.
    /// An empty needle matches everything.
    pub fn matches(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        self.city.to_lowercase().contains(&needle) || self.country.to_lowercase().contains(&needle)
    }
}

// ── Query result types ───────────────────────────────────────────

/// Point-in-time copy of a listing with its active reservations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingSnapshot {
    pub id: ListingId,
    pub owner_id: UserId,
    pub nightly_rate: u64,
    pub max_guests: u32,
    pub location: Option<Location>,
    pub reservations: Vec<Reservation>,
}

impl HasReservations for ListingSnapshot {
    fn reservations(&self) -> &[Reservation] {
        &self.reservations
    }
}

/// Optional search criteria. Every field left `None` is not applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub stay: Option<DateRange>,
    pub guests: Option<u32>,
    pub min_nightly_rate: Option<u64>,
    pub max_nightly_rate: Option<u64>,
    /// Matched against city or country; listings with no location never match.
    pub location: Option<String>,
}

/// Reservation counts for a listing owner's dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnerSummary {
    pub total: usize,
    pub pending: usize,
    pub confirmed: usize,
    pub cancelled: usize,
    /// Sum of `total_price` over confirmed reservations.
    pub confirmed_revenue: u64,
}
