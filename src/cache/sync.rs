//! Pending-mutation queue and background attendance replay.
//!
//! An attendance mutation that fails at the transport level while the
//! client is offline is parked in the dynamic set as a pending entry
//! (request only, no response). A connectivity-restored trigger runs
//! `sync_attendance`, which replays every pending attendance request
//! and deletes an entry only after a confirmed successful replay.
//! Replay is at-least-once; the remote mutation endpoints are expected
//! to tolerate duplicate submissions.

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::cache::manager::{CacheError, CacheManager};
use crate::cache::store::{CacheEntry, RequestSnapshot, ResponseSnapshot};

/// Path fragment identifying attendance mutations in the queue.
const ATTENDANCE_PATH: &str = "/attendance/";

/// Bound on concurrent replays per sync trigger. Replays are
/// independent and unordered; 8 in flight keeps a large backlog quick
/// without hammering the API after an outage.
const MAX_CONCURRENT_REPLAYS: usize = 8;

/// Result of one interactive mutation attempt.
#[derive(Debug)]
pub enum MutationOutcome {
    /// The network answered; the caller inspects the status.
    Sent(ResponseSnapshot),
    /// Transport failed; the request is queued for the next sync.
    Queued,
}

/// Outcome of one sync trigger. Failed entries stay queued for the
/// next trigger.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub replayed: usize,
    pub failed: usize,
}

impl CacheManager {
    /// Park a mutation in the dynamic set for later replay.
    pub fn enqueue_mutation(&self, request: RequestSnapshot) -> Result<(), CacheError> {
        let entry = CacheEntry::pending(request);
        info!(key = %entry.key, "Queueing attendance mutation for replay");
        self.store.put(&self.dynamic_set(), &entry)?;
        Ok(())
    }

    /// Issue a mutation against the live network, queueing it when the
    /// transport is down. An HTTP error status is not queued - the
    /// server saw the request and answered.
    pub async fn dispatch_mutation(
        &self,
        request: RequestSnapshot,
    ) -> Result<MutationOutcome, CacheError> {
        match self.live_fetch(&request).await {
            Ok(response) => Ok(MutationOutcome::Sent(response)),
            Err(e) => {
                debug!(key = %request.key(), error = %e, "Mutation transport failed");
                self.enqueue_mutation(request)?;
                Ok(MutationOutcome::Queued)
            }
        }
    }

    /// Replay every pending attendance mutation once. Entries are
    /// deleted only after a confirmed 2xx replay; one failure never
    /// blocks the rest.
    pub async fn sync_attendance(&self) -> Result<SyncReport, CacheError> {
        let set = self.dynamic_set();
        let pending: Vec<CacheEntry> = self
            .store
            .entries(&set)?
            .into_iter()
            .filter(|e| e.is_pending() && e.key.contains(ATTENDANCE_PATH))
            .collect();

        if pending.is_empty() {
            return Ok(SyncReport::default());
        }
        info!(count = pending.len(), "Replaying queued attendance mutations");

        let results: Vec<bool> = stream::iter(pending)
            .map(|entry| {
                let set = set.clone();
                async move {
                    match self.live_fetch(&entry.request).await {
                        Ok(response) if response.is_success() => {
                            // Delete strictly after the confirmed replay.
                            match self.store.delete(&set, &entry.key) {
                                Ok(_) => true,
                                Err(e) => {
                                    warn!(key = %entry.key, error = %e, "Replayed but failed to dequeue");
                                    false
                                }
                            }
                        }
                        Ok(response) => {
                            warn!(key = %entry.key, status = response.status, "Replay rejected by server");
                            false
                        }
                        Err(e) => {
                            warn!(key = %entry.key, error = %e, "Replay failed, leaving entry queued");
                            false
                        }
                    }
                }
            })
            .buffer_unordered(MAX_CONCURRENT_REPLAYS)
            .collect()
            .await;

        let replayed = results.iter().filter(|ok| **ok).count();
        Ok(SyncReport {
            replayed,
            failed: results.len() - replayed,
        })
    }
}
