use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Event, ListingId};

const CHANNEL_CAPACITY: usize = 256;

/// Per-listing broadcast of committed events. Hosts subscribe to refresh
/// cached calendars and search pages when a listing's availability moves.
pub struct NotifyHub {
    channels: DashMap<ListingId, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a listing. Creates the channel if needed.
    pub fn subscribe(&self, listing_id: ListingId) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(listing_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, listing_id: ListingId, event: &Event) {
        if let Some(sender) = self.channels.get(&listing_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop a listing's channel; open receivers see the channel close.
    pub fn remove(&self, listing_id: &ListingId) {
        self.channels.remove(listing_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let lid = Ulid::new();
        let mut rx = hub.subscribe(lid);

        let event = Event::ListingUpdated {
            id: lid,
            nightly_rate: 12_000,
            max_guests: 4,
        };
        hub.send(lid, &event);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        let lid = Ulid::new();
        hub.send(lid, &Event::ListingRemoved { id: lid });
    }

    #[tokio::test]
    async fn remove_closes_receivers() {
        let hub = NotifyHub::new();
        let lid = Ulid::new();
        let mut rx = hub.subscribe(lid);
        hub.remove(&lid);
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }
}
