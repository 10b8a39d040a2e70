use tokio::sync::broadcast;
use tracing::debug;

use crate::models::QueueEvent;

pub type QueueEventReceiver = broadcast::Receiver<QueueEvent>;

const CHANNEL_CAPACITY: usize = 256;

/// Fan-out of queue events to notification collaborators (display boards,
/// SMS/WhatsApp senders). Publishing never blocks and never fails the
/// caller; slow subscribers lag and drop old events.
#[derive(Clone)]
pub struct QueueEventPublisher {
    sender: broadcast::Sender<QueueEvent>,
}

impl QueueEventPublisher {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, event: QueueEvent) {
        match self.sender.send(event) {
            Ok(receivers) => debug!("Queue event delivered to {} subscriber(s)", receivers),
            Err(broadcast::error::SendError(event)) => {
                debug!("No subscribers for queue event {:?}", event)
            }
        }
    }

    pub fn subscribe(&self) -> QueueEventReceiver {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for QueueEventPublisher {
    fn default() -> Self {
        Self::new()
    }
}
