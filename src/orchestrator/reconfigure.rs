//! Debounced bulk reprocessing after an options change.
//!
//! Each `set_options` call adds the affected images to the pending set and
//! replaces the single debounce timer. Only the last timer in a burst fires;
//! when it does, the pending set is drained and the images are reprocessed
//! one per frame.

use crate::document::NodeId;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Pending images plus the debounce timer guarding them.
#[derive(Debug, Default)]
pub struct Reconfiguration {
    pending: BTreeSet<NodeId>,
    timer: Option<JoinHandle<()>>,
}

impl Reconfiguration {
    pub fn mark(&mut self, images: impl IntoIterator<Item = NodeId>) {
        self.pending.extend(images);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drain the pending set in document-creation order.
    pub fn take_pending(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.pending).into_iter().collect()
    }

    /// Install a new timer, cancelling the previous one.
    pub fn replace_timer(&mut self, timer: JoinHandle<()>) {
        if let Some(previous) = self.timer.replace(timer) {
            previous.abort();
        }
    }

    /// Whether a timer is armed or a batch is still being dispatched.
    pub fn is_scheduled(&self) -> bool {
        self.timer.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.pending.clear();
    }
}

/// Paces dispatches one per frame.
pub struct FrameClock {
    ticker: Interval,
}

impl FrameClock {
    /// A zero period is bumped to 1ms; `interval` rejects zero.
    pub fn new(period: Duration) -> Self {
        let mut ticker = interval(period.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { ticker }
    }

    /// Wait for the next frame. The first call completes immediately.
    pub async fn next_frame(&mut self) {
        self.ticker.tick().await;
    }
}
