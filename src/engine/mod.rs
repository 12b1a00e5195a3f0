mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod search;

pub use availability::{AvailabilityIndex, BlockedDays, merge_overlapping, subtract_ranges};
pub use error::{BookingError, ValidationError};
pub use search::{ReservationSource, filter_by_search_availability, filter_listings};

use std::collections::HashMap;
use std::io;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock, mpsc, oneshot};
use tracing::{info, warn};

use conflict::check_no_conflict;

use crate::config::EngineConfig;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability;
use crate::wal::Wal;

pub type SharedListingState = Arc<RwLock<ListingState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL. Appends that queue up while a flush is running are written
/// together and share one fsync; each caller hears back only after its batch
/// is durable.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch: Vec<PendingAppend> = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                // Keep ordering: flush what we have before compacting.
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }
        commit_batch(&mut wal, batch);
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: Vec<PendingAppend>) {
    metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = Instant::now();

    let mut result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so half-written bytes don't leak into
    // the next batch; this batch is reported failed either way.
    let flushed = wal.flush_sync();
    if result.is_ok() {
        result = flushed;
    }
    metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    if let Err(e) = &result {
        warn!(error = %e, batch = batch.len(), "WAL group commit failed");
    }
    for (_, tx) in batch {
        let reply = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(reply);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result =
                Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

// ── Engine ───────────────────────────────────────────────

/// The single writer for a data directory's reservation sets.
///
/// Each listing sits behind its own `RwLock`; admissions and status changes
/// hold the write lock across check, WAL append and apply, so two requests
/// for the same listing are serialized while different listings never wait on
/// each other.
pub struct Engine {
    pub(super) listings: DashMap<ListingId, SharedListingState>,
    /// Reverse lookup: reservation id → listing id.
    pub(super) reservation_to_listing: DashMap<ReservationId, ListingId>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub(super) notify: Arc<NotifyHub>,
    /// Mutations share it; compaction takes it exclusively so its snapshot
    /// can't miss an in-flight append.
    pub(super) gate: Arc<RwLock<()>>,
    pub(super) config: EngineConfig,
}

/// Write access to one listing, plus the shared side of the compaction gate.
pub(super) struct ListingWriteGuard {
    _gate: OwnedRwLockReadGuard<()>,
    state: OwnedRwLockWriteGuard<ListingState>,
}

impl Deref for ListingWriteGuard {
    type Target = ListingState;

    fn deref(&self) -> &ListingState {
        &self.state
    }
}

impl DerefMut for ListingWriteGuard {
    fn deref_mut(&mut self) -> &mut ListingState {
        &mut self.state
    }
}

/// Apply an event to a listing. Caller holds the lock.
fn apply_to_listing(
    ls: &mut ListingState,
    event: &Event,
    reservation_map: &DashMap<ReservationId, ListingId>,
) {
    match event {
        Event::ReservationAdmitted { reservation } => {
            reservation_map.insert(reservation.id, reservation.listing_id);
            ls.insert_reservation(reservation.clone());
        }
        Event::ReservationStatusChanged { id, status, .. } => {
            if let Some(r) = ls.get_mut(*id) {
                r.status = *status;
            }
        }
        Event::ListingUpdated {
            nightly_rate,
            max_guests,
            ..
        } => {
            ls.nightly_rate = *nightly_rate;
            ls.max_guests = *max_guests;
        }
        Event::ListingLocated { location, .. } => {
            ls.location = Some(location.clone());
        }
        // Registration and removal change the listing map, not the listing.
        Event::ListingRegistered { .. } | Event::ListingRemoved { .. } => {}
    }
}

impl Engine {
    /// Open the WAL under `config.data_dir`, replay it, and start the
    /// group-commit writer. Must be called inside a Tokio runtime.
    pub fn new(config: EngineConfig, notify: Arc<NotifyHub>) -> io::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let wal_path = config.wal_path();
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let reservation_to_listing = DashMap::new();
        let mut replayed: HashMap<ListingId, ListingState> = HashMap::new();
        let mut skipped = 0usize;
        for event in &events {
            match event {
                Event::ListingRegistered {
                    id,
                    owner_id,
                    nightly_rate,
                    max_guests,
                } => {
                    replayed.insert(*id, ListingState::new(*id, *owner_id, *nightly_rate, *max_guests));
                }
                Event::ListingRemoved { id } => {
                    if let Some(ls) = replayed.remove(id) {
                        for r in &ls.reservations {
                            reservation_to_listing.remove(&r.id);
                        }
                    }
                }
                Event::ReservationAdmitted { reservation } => {
                    let Some(ls) = replayed.get_mut(&reservation.listing_id) else {
                        continue;
                    };
                    if reservation.is_active()
                        && let Err(e) = check_no_conflict(ls, &reservation.range)
                    {
                        warn!(
                            reservation_id = %reservation.id,
                            listing_id = %reservation.listing_id,
                            "skipping overlapping reservation in WAL: {e}"
                        );
                        skipped += 1;
                        continue;
                    }
                    apply_to_listing(ls, event, &reservation_to_listing);
                }
                other => {
                    if let Some(ls) = replayed.get_mut(&other.listing_id()) {
                        apply_to_listing(ls, other, &reservation_to_listing);
                    }
                }
            }
        }

        let listings = DashMap::with_capacity(replayed.len());
        for (id, ls) in replayed {
            listings.insert(id, Arc::new(RwLock::new(ls)));
        }
        metrics::gauge!(observability::LISTINGS_ACTIVE).set(listings.len() as f64);
        info!(
            wal = %wal_path.display(),
            events = events.len(),
            listings = listings.len(),
            skipped,
            "engine opened"
        );

        Ok(Self {
            listings,
            reservation_to_listing,
            wal_tx,
            notify,
            gate: Arc::new(RwLock::new(())),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Committed events for one listing, in commit order.
    pub fn subscribe(&self, listing_id: ListingId) -> tokio::sync::broadcast::Receiver<Event> {
        self.notify.subscribe(listing_id)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), BookingError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| BookingError::TransientStore("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| BookingError::TransientStore("WAL writer dropped response".into()))?
            .map_err(|e| BookingError::TransientStore(format!("WAL append failed: {e}")))
    }

    pub(super) fn get_listing(&self, id: &ListingId) -> Option<SharedListingState> {
        self.listings.get(id).map(|e| e.value().clone())
    }

    pub(super) fn listing_for_reservation(&self, id: &ReservationId) -> Option<ListingId> {
        self.reservation_to_listing.get(id).map(|e| *e.value())
    }

    /// Shared side of the compaction gate, for mutations that don't touch an
    /// existing listing.
    pub(super) async fn enter_gate(&self) -> Result<OwnedRwLockReadGuard<()>, BookingError> {
        tokio::time::timeout(self.config.lock_timeout, self.gate.clone().read_owned())
            .await
            .map_err(|_| {
                warn!("timed out waiting for the compaction gate");
                BookingError::TransientStore("timed out waiting for compaction".into())
            })
    }

    /// Take a listing's write lock, bounded by `lock_timeout`.
    pub(super) async fn lock_listing(
        &self,
        listing_id: ListingId,
    ) -> Result<ListingWriteGuard, BookingError> {
        let shared = self
            .get_listing(&listing_id)
            .ok_or(BookingError::NotFound(listing_id))?;
        let started = Instant::now();
        let gate = self.enter_gate().await?;
        let remaining = self.config.lock_timeout.saturating_sub(started.elapsed());
        let state = tokio::time::timeout(remaining, shared.clone().write_owned())
            .await
            .map_err(|_| {
                warn!(%listing_id, "timed out waiting for listing lock");
                BookingError::TransientStore(format!("timed out waiting for listing {listing_id}"))
            })?;
        metrics::histogram!(observability::LISTING_LOCK_WAIT_SECONDS)
            .record(started.elapsed().as_secs_f64());

        // Removed while we queued for the lock.
        let still_registered = self
            .listings
            .get(&listing_id)
            .is_some_and(|e| Arc::ptr_eq(e.value(), &shared));
        if !still_registered {
            return Err(BookingError::NotFound(listing_id));
        }
        Ok(ListingWriteGuard { _gate: gate, state })
    }

    /// WAL-append + apply + notify. Nothing is applied if the append fails.
    pub(super) async fn persist_and_apply(
        &self,
        listing: &mut ListingState,
        event: &Event,
    ) -> Result<(), BookingError> {
        self.wal_append(event).await?;
        apply_to_listing(listing, event, &self.reservation_to_listing);
        self.notify.send(listing.id, event);
        Ok(())
    }
}
