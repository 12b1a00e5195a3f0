use chrono::NaiveDate;

use crate::model::*;

use super::availability::AvailabilityIndex;
use super::conflict::validate_window;
use super::{BookingError, Engine, SharedListingState};

impl Engine {
    fn all_listings(&self) -> Vec<SharedListingState> {
        self.listings.iter().map(|e| e.value().clone()).collect()
    }

    pub fn listing_count(&self) -> usize {
        self.listings.len()
    }

    pub fn contains_listing(&self, id: &ListingId) -> bool {
        self.listings.contains_key(id)
    }

    /// Point-in-time copy of a listing and its active reservations.
    pub async fn listing_snapshot(&self, id: ListingId) -> Option<ListingSnapshot> {
        let shared = self.get_listing(&id)?;
        let guard = shared.read().await;
        Some(guard.snapshot())
    }

    pub async fn availability_index(&self, listing_id: ListingId) -> Result<AvailabilityIndex, BookingError> {
        let shared = self
            .get_listing(&listing_id)
            .ok_or(BookingError::NotFound(listing_id))?;
        let guard = shared.read().await;
        Ok(AvailabilityIndex::for_listing(&*guard))
    }

    /// Read-only check; no lock is held afterwards, so the answer can be stale
    /// by the time the caller acts on it. Only [`Engine::admit`] decides.
    pub async fn is_range_free(&self, listing_id: ListingId, range: &DateRange) -> Result<bool, BookingError> {
        Ok(self.availability_index(listing_id).await?.is_range_free(range))
    }

    /// Days to disable in a date picker, optionally limited to a window.
    pub async fn blocked_days(
        &self,
        listing_id: ListingId,
        window: Option<&DateRange>,
    ) -> Result<Vec<NaiveDate>, BookingError> {
        if let Some(w) = window {
            validate_window(w)?;
        }
        let index = self.availability_index(listing_id).await?;
        Ok(match window {
            Some(w) => index.blocked_days_within(w).collect(),
            None => index.blocked_days().collect(),
        })
    }

    /// Free stretches inside `window`, for suggesting alternative dates.
    pub async fn free_ranges(&self, listing_id: ListingId, window: &DateRange) -> Result<Vec<DateRange>, BookingError> {
        validate_window(window)?;
        Ok(self.availability_index(listing_id).await?.free_ranges(window))
    }

    pub async fn get_reservation(&self, id: ReservationId) -> Result<Reservation, BookingError> {
        let listing_id = self
            .listing_for_reservation(&id)
            .ok_or(BookingError::NotFound(id))?;
        let shared = self
            .get_listing(&listing_id)
            .ok_or(BookingError::NotFound(listing_id))?;
        let guard = shared.read().await;
        guard.get(id).cloned().ok_or(BookingError::NotFound(id))
    }

    /// Every reservation a guest has made, newest first.
    pub async fn reservations_for_guest(&self, guest_id: UserId) -> Vec<Reservation> {
        let mut out = Vec::new();
        for shared in self.all_listings() {
            let guard = shared.read().await;
            out.extend(guard.reservations.iter().filter(|r| r.guest_id == guest_id).cloned());
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        out
    }

    /// Every reservation on listings the owner holds, newest first.
    pub async fn reservations_for_owner(&self, owner_id: UserId) -> Vec<Reservation> {
        let mut out = Vec::new();
        for shared in self.all_listings() {
            let guard = shared.read().await;
            if guard.owner_id == owner_id {
                out.extend(guard.reservations.iter().cloned());
            }
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        out
    }

    pub async fn owner_summary(&self, owner_id: UserId) -> OwnerSummary {
        let mut summary = OwnerSummary::default();
        for r in self.reservations_for_owner(owner_id).await {
            summary.total += 1;
            match r.status {
                ReservationStatus::Pending => summary.pending += 1,
                ReservationStatus::Confirmed => {
                    summary.confirmed += 1;
                    summary.confirmed_revenue = summary.confirmed_revenue.saturating_add(r.total_price);
                }
                ReservationStatus::Cancelled => summary.cancelled += 1,
            }
        }
        summary
    }
}
