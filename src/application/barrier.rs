use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Countdown over the outstanding tasks of one batch.
///
/// Each task calls [`arrive`](Self::arrive) once, on its terminal
/// transition. Exactly one call, the last, returns `true`; at that point
/// every [`wait`](Self::wait)er is released.
#[derive(Debug)]
pub struct CompletionBarrier {
    remaining: AtomicUsize,
    released: Notify,
}

impl CompletionBarrier {
    pub fn new(count: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(count),
            released: Notify::new(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    pub fn is_released(&self) -> bool {
        self.remaining() == 0
    }

    /// Records one terminal task. Returns `true` for the arrival that
    /// releases the barrier. Arrivals beyond the batch size are ignored.
    pub fn arrive(&self) -> bool {
        let prev = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        match prev {
            Ok(1) => {
                self.released.notify_waiters();
                true
            }
            _ => false,
        }
    }

    pub async fn wait(&self) {
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_released() {
                return;
            }
            notified.await;
        }
    }
}
