//! Durable FIFO hit queue.

use crate::{Hit, PipelineResult};
use beacon_core::ConsentStatus;
use beacon_store::{Database, QueuedHit};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info};

/// Strict FIFO queue of serialized hits, durable before `enqueue` returns.
///
/// The queue only stores and orders; pulling, sending, and retry policy live
/// in the processor. Suspension gates delivery, never admission: suspended
/// queues still accept hits.
pub struct HitQueue {
    db: Arc<Database>,
    suspended: AtomicBool,
    work: Notify,
}

impl HitQueue {
    /// Creates a queue over the given store. Queues start suspended until
    /// the first consent resolution so nothing leaves before the gate boots.
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            suspended: AtomicBool::new(true),
            work: Notify::new(),
        }
    }

    /// Persists a hit at the tail. The hit is durable when this returns.
    pub fn enqueue(&self, hit: &Hit) -> PipelineResult<()> {
        let payload = hit.encode()?;
        self.db.enqueue_hit(hit.request_id(), &payload)?;
        self.work.notify_one();
        Ok(())
    }

    /// The row at the head, without removing it.
    pub fn peek(&self) -> PipelineResult<Option<QueuedHit>> {
        Ok(self.db.peek_hit()?)
    }

    /// Removes a processed row. Called only on success or terminal failure.
    pub fn remove(&self, uid: &str) -> PipelineResult<bool> {
        Ok(self.db.remove_hit(uid)?)
    }

    /// Drops every queued hit (full consent revocation).
    pub fn clear(&self) -> PipelineResult<usize> {
        Ok(self.db.clear_hits()?)
    }

    pub fn len(&self) -> PipelineResult<usize> {
        Ok(self.db.hit_count()?)
    }

    pub fn is_empty(&self) -> PipelineResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Pauses delivery; queued hits are kept.
    pub fn suspend(&self) {
        self.suspended.store(true, Ordering::SeqCst);
        debug!("Hit queue suspended");
    }

    /// Resumes delivery and wakes the processor.
    pub fn resume(&self) {
        self.suspended.store(false, Ordering::SeqCst);
        self.work.notify_one();
        debug!("Hit queue resumed");
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }

    /// Applies a consent change to the queue's delivery state.
    pub fn handle_consent_change(&self, status: ConsentStatus) -> PipelineResult<()> {
        match status {
            ConsentStatus::Yes => self.resume(),
            ConsentStatus::Pending => {
                info!("Collect consent pending, suspending hit delivery");
                self.suspend();
            }
            ConsentStatus::No => {
                let dropped = self.clear()?;
                info!(dropped, "Collect consent revoked, cleared hit queue");
                self.resume();
            }
        }
        Ok(())
    }

    /// Waits until new work may be available. Wake-ups are hints; callers
    /// must re-check queue state.
    pub async fn wait_for_work(&self) {
        self.work.notified().await;
    }

    /// Wakes the processor (used on shutdown).
    pub fn wake(&self) {
        self.work.notify_one();
    }
}
