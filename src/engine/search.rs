use async_trait::async_trait;
use futures::future::join_all;
use tracing::debug;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::availability::AvailabilityIndex;
use super::{BookingError, Engine};

/// Where a listing's reservations come from. The engine is one; a host's own
/// persistence layer can be another.
#[async_trait]
pub trait ReservationSource: Send + Sync {
    /// The listing's pending and confirmed reservations.
    async fn load_active_reservations(&self, listing_id: ListingId) -> Result<Vec<Reservation>, BookingError>;
}

#[async_trait]
impl ReservationSource for Engine {
    async fn load_active_reservations(&self, listing_id: ListingId) -> Result<Vec<Reservation>, BookingError> {
        let shared = self
            .get_listing(&listing_id)
            .ok_or(BookingError::NotFound(listing_id))?;
        let guard = shared.read().await;
        Ok(guard.active().cloned().collect())
    }
}

/// Keep the candidates free for `requested`. With no dates requested the
/// input comes back untouched; availability is an opt-in search criterion.
pub fn filter_by_search_availability<C: HasReservations>(
    candidates: impl IntoIterator<Item = C>,
    requested: Option<&DateRange>,
) -> Vec<C> {
    let Some(range) = requested else {
        return candidates.into_iter().collect();
    };
    candidates
        .into_iter()
        .filter(|c| AvailabilityIndex::for_listing(c).is_range_free(range))
        .collect()
}

/// [`filter_by_search_availability`] over ids, loading each candidate's
/// reservations from `source` concurrently. Ids the source doesn't know are
/// dropped; order is preserved.
pub async fn filter_listings<S: ReservationSource + ?Sized>(
    source: &S,
    candidates: &[ListingId],
    requested: Option<&DateRange>,
) -> Result<Vec<ListingId>, BookingError> {
    let Some(range) = requested else {
        return Ok(candidates.to_vec());
    };
    if candidates.len() > MAX_SEARCH_CANDIDATES {
        return Err(BookingError::LimitExceeded("too many search candidates"));
    }

    let loads = join_all(candidates.iter().map(|id| source.load_active_reservations(*id))).await;
    let mut free = Vec::with_capacity(candidates.len());
    for (id, loaded) in candidates.iter().zip(loads) {
        let reservations = match loaded {
            Ok(rs) => rs,
            Err(BookingError::NotFound(_)) => {
                debug!(listing_id = %id, "search candidate not found, skipping");
                continue;
            }
            Err(e) => return Err(e),
        };
        if AvailabilityIndex::for_listing(&reservations).is_range_free(range) {
            free.push(*id);
        }
    }
    Ok(free)
}

impl Engine {
    /// Filter candidate listings by guest count, nightly rate, location and,
    /// if a stay is requested, availability.
    ///
    /// Each listing is read under its own read lock and released before the
    /// next; the result is a point-in-time view that a concurrent booking may
    /// already have invalidated. Admission re-checks.
    pub async fn search(
        &self,
        candidates: &[ListingId],
        query: &SearchQuery,
    ) -> Result<Vec<ListingSnapshot>, BookingError> {
        if candidates.len() > MAX_SEARCH_CANDIDATES {
            return Err(BookingError::LimitExceeded("too many search candidates"));
        }

        let mut snapshots = Vec::with_capacity(candidates.len());
        for id in candidates {
            let Some(snapshot) = self.listing_snapshot(*id).await else {
                continue;
            };
            let fits_guests = query.guests.is_none_or(|g| snapshot.max_guests >= g);
            let above_min = query.min_nightly_rate.is_none_or(|min| snapshot.nightly_rate >= min);
            let below_max = query.max_nightly_rate.is_none_or(|max| snapshot.nightly_rate <= max);
            let in_location = query.location.as_deref().is_none_or(|needle| {
                snapshot.location.as_ref().is_some_and(|loc| loc.matches(needle))
            });
            if fits_guests && above_min && below_max && in_location {
                snapshots.push(snapshot);
            }
        }

        let filtered = if query.stay.is_some() { "true" } else { "false" };
        metrics::counter!(observability::SEARCHES_TOTAL, "filtered" => filtered).increment(1);
        Ok(filter_by_search_availability(snapshots, query.stay.as_ref()))
    }
}
