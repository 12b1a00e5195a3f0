use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use dashmap::mapref::entry::Entry;
use tokio::sync::{RwLock, oneshot};
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::{check_no_conflict, today, total_price, validate_stay};
use super::{BookingError, Engine, WalCommand};

impl Engine {
    pub async fn register_listing(
        &self,
        id: ListingId,
        owner_id: UserId,
        nightly_rate: u64,
        max_guests: u32,
    ) -> Result<(), BookingError> {
        if self.listings.len() >= MAX_LISTINGS {
            return Err(BookingError::LimitExceeded("too many listings"));
        }
        let _gate = self.enter_gate().await?;

        // Claim the id with the new listing already write-locked: a racing
        // registration sees it taken, and admissions queue until it is durable.
        let shared = Arc::new(RwLock::new(ListingState::new(
            id,
            owner_id,
            nightly_rate,
            max_guests,
        )));
        let _held = shared.clone().write_owned().await;
        match self.listings.entry(id) {
            Entry::Occupied(_) => return Err(BookingError::AlreadyExists(id)),
            Entry::Vacant(slot) => {
                slot.insert(shared.clone());
            }
        }

        let event = Event::ListingRegistered {
            id,
            owner_id,
            nightly_rate,
            max_guests,
        };
        if let Err(e) = self.wal_append(&event).await {
            self.listings.remove_if(&id, |_, v| Arc::ptr_eq(v, &shared));
            return Err(e);
        }
        metrics::gauge!(observability::LISTINGS_ACTIVE).set(self.listings.len() as f64);
        self.notify.send(id, &event);
        info!(listing_id = %id, %owner_id, "listing registered");
        Ok(())
    }

    pub async fn update_listing(
        &self,
        id: ListingId,
        nightly_rate: u64,
        max_guests: u32,
    ) -> Result<(), BookingError> {
        let mut guard = self.lock_listing(id).await?;
        let event = Event::ListingUpdated {
            id,
            nightly_rate,
            max_guests,
        };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// Set the city and country that location searches match against.
    pub async fn set_listing_location(
        &self,
        id: ListingId,
        location: Location,
    ) -> Result<(), BookingError> {
        if location.city.len() > MAX_LOCATION_LEN || location.country.len() > MAX_LOCATION_LEN {
            return Err(BookingError::LimitExceeded("location name too long"));
        }
        let mut guard = self.lock_listing(id).await?;
        let event = Event::ListingLocated { id, location };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// Drop a listing and its history. Refused while anything active remains.
    pub async fn remove_listing(&self, id: ListingId) -> Result<(), BookingError> {
        let guard = self.lock_listing(id).await?;
        if guard.has_active() {
            return Err(BookingError::HasActiveReservations(id));
        }

        let event = Event::ListingRemoved { id };
        self.wal_append(&event).await?;
        self.listings.remove(&id);
        for r in &guard.reservations {
            self.reservation_to_listing.remove(&r.id);
        }
        drop(guard);
        metrics::gauge!(observability::LISTINGS_ACTIVE).set(self.listings.len() as f64);
        self.notify.send(id, &event);
        self.notify.remove(&id);
        info!(listing_id = %id, "listing removed");
        Ok(())
    }

    /// Admit a booking request for `[check_in, check_out)` as of today.
    pub async fn admit(
        &self,
        listing_id: ListingId,
        range: DateRange,
        guest_id: UserId,
    ) -> Result<Reservation, BookingError> {
        self.admit_on(listing_id, range, guest_id, today()).await
    }

    /// [`Engine::admit`] with an explicit notion of "today".
    ///
    /// The read of the listing's reservations, the free check and the insert
    /// all happen under the listing's write lock: of two overlapping requests,
    /// whichever gets the lock first wins and the other sees its reservation.
    pub async fn admit_on(
        &self,
        listing_id: ListingId,
        range: DateRange,
        guest_id: UserId,
        today: NaiveDate,
    ) -> Result<Reservation, BookingError> {
        let result = self.try_admit(listing_id, range, guest_id, today).await;
        metrics::counter!(
            observability::ADMISSIONS_TOTAL,
            "outcome" => observability::admission_outcome(&result)
        )
        .increment(1);
        result
    }

    async fn try_admit(
        &self,
        listing_id: ListingId,
        range: DateRange,
        guest_id: UserId,
        today: NaiveDate,
    ) -> Result<Reservation, BookingError> {
        validate_stay(&range, today)?;

        let mut guard = self.lock_listing(listing_id).await?;
        if guard.reservations.len() >= MAX_RESERVATIONS_PER_LISTING {
            return Err(BookingError::LimitExceeded("too many reservations on listing"));
        }
        if let Err(e) = check_no_conflict(&guard, &range) {
            debug!(%listing_id, %range, "admission rejected: {e}");
            return Err(e);
        }

        let reservation = Reservation {
            id: Ulid::new(),
            listing_id,
            guest_id,
            range,
            status: ReservationStatus::Pending,
            total_price: total_price(&guard, &range)?,
            created_at: Utc::now(),
        };
        let event = Event::ReservationAdmitted {
            reservation: reservation.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        info!(
            %listing_id,
            reservation_id = %reservation.id,
            %guest_id,
            %range,
            "reservation admitted"
        );
        Ok(reservation)
    }

    /// Move a reservation along `pending → confirmed → cancelled`.
    ///
    /// Only the guest who booked or the listing's owner may do this. An
    /// illegal transition is reported before the actor is considered, so
    /// anything leaving `cancelled` fails the same way for everyone.
    pub async fn set_status(
        &self,
        reservation_id: ReservationId,
        new_status: ReservationStatus,
        actor_id: UserId,
    ) -> Result<Reservation, BookingError> {
        let listing_id = self
            .listing_for_reservation(&reservation_id)
            .ok_or(BookingError::NotFound(reservation_id))?;
        let mut guard = self.lock_listing(listing_id).await?;

        let (current, guest_id) = match guard.get(reservation_id) {
            Some(r) => (r.status, r.guest_id),
            None => return Err(BookingError::NotFound(reservation_id)),
        };
        if !current.can_transition_to(new_status) {
            return Err(BookingError::InvalidTransition {
                from: current,
                to: new_status,
            });
        }
        if actor_id != guest_id && actor_id != guard.owner_id {
            return Err(BookingError::Unauthorized {
                actor_id,
                reservation_id,
            });
        }

        let event = Event::ReservationStatusChanged {
            id: reservation_id,
            listing_id,
            status: new_status,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(observability::STATUS_CHANGES_TOTAL, "status" => new_status.as_str())
            .increment(1);
        info!(
            %listing_id,
            %reservation_id,
            from = %current,
            to = %new_status,
            %actor_id,
            "reservation status changed"
        );

        guard
            .get(reservation_id)
            .cloned()
            .ok_or(BookingError::NotFound(reservation_id))
    }

    /// Rewrite the WAL as the minimal event list that rebuilds current state.
    /// Cancelled reservations are kept; they are history.
    pub async fn compact_wal(&self) -> Result<(), BookingError> {
        let _gate = self.gate.write().await;

        let listings: Vec<_> = self.listings.iter().map(|e| e.value().clone()).collect();
        let mut events = Vec::new();
        for shared in listings {
            let ls = shared.read().await;
            events.push(Event::ListingRegistered {
                id: ls.id,
                owner_id: ls.owner_id,
                nightly_rate: ls.nightly_rate,
                max_guests: ls.max_guests,
            });
            if let Some(location) = &ls.location {
                events.push(Event::ListingLocated {
                    id: ls.id,
                    location: location.clone(),
                });
            }
            events.extend(ls.reservations.iter().map(|r| Event::ReservationAdmitted {
                reservation: r.clone(),
            }));
        }
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| BookingError::TransientStore("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| BookingError::TransientStore("WAL writer dropped response".into()))?
            .map_err(|e| BookingError::TransientStore(format!("WAL compaction failed: {e}")))?;
        info!(events = count, "WAL compacted");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
