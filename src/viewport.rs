//! Terminal width notifications.
//!
//! The event loop publishes every resize; components that care hold a
//! [`ResizeSubscription`] for as long as they live.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam::channel::{Receiver, Sender, TryRecvError, unbounded};

#[derive(Default)]
pub struct Viewport {
    subscribers: Mutex<Vec<(u64, Sender<u16>)>>,
    next_id: AtomicU64,
    width: Mutex<u16>,
}

impl Viewport {
    pub fn new(width: u16) -> Arc<Self> {
        Arc::new(Self {
            width: Mutex::new(width),
            ..Default::default()
        })
    }

    pub fn width(&self) -> u16 {
        *self.width.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(self: &Arc<Self>) -> ResizeSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((id, tx));
        ResizeSubscription {
            id,
            rx,
            viewport: Arc::clone(self),
        }
    }

    /// Record a new width and notify every subscriber.
    pub fn publish(&self, width: u16) {
        *self.width.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = width;
        let subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for (_, tx) in subscribers.iter() {
            let _ = tx.send(width);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn unsubscribe(&self, id: u64) {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .retain(|(sub_id, _)| *sub_id != id);
    }
}

/// Live resize listener. Unsubscribes when dropped.
pub struct ResizeSubscription {
    id: u64,
    rx: Receiver<u16>,
    viewport: Arc<Viewport>,
}

impl ResizeSubscription {
    /// Most recent width published since the last call, if any.
    pub fn latest(&self) -> Option<u16> {
        let mut latest = None;
        loop {
            match self.rx.try_recv() {
                Ok(width) => latest = Some(width),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return latest,
            }
        }
    }

    pub fn current_width(&self) -> u16 {
        self.viewport.width()
    }
}

impl Drop for ResizeSubscription {
    fn drop(&mut self) {
        self.viewport.unsubscribe(self.id);
    }
}
