//! # Update Queue Processor
//!
//! Turns the raw event stream into a small number of consistent snapshot
//! revisions:
//!
//! 1. **Classify**: every raw event becomes an [`UpdateEvent`] of one kind.
//! 2. **Queue**: updates wait in a pending queue; the first one arms a batch
//!    timer of `batch_window`.
//! 3. **Flush**: the queue is drained at once. Everything queued before the
//!    last full update that applies cleanly is superseded, guardian updates are coalesced per
//!    guardian, and each kind slice is merged into a draft of the snapshot.
//!    A slice that fails to merge is rolled back alone.
//! 4. **Publish**: if anything was applied the draft becomes the new snapshot
//!    (one counter step per batch), the staleness timer is re-armed and
//!    [`DataUpdateEvent::Updated`] is emitted.
//!
//! If no batch is applied within `stale_timeout` the snapshot is flagged stale
//! and [`DataUpdateEvent::Stale`] fires once.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::time::Instant;

use crate::core::listeners::{Listeners, Subscription};
use crate::core::snapshot::{self, DataSnapshot, MergeError};
use crate::core::tasks::{TaskArena, TaskKind};
use crate::models::{
    AnalysisReport, GuardianType, PhilosophyAlignment, RawEvent, UpdateEvent, UpdateKind,
    UpdateSource,
};

/// Timing of the processor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessorConfig {
    /// Micro-batch window, measured from the first update of a batch.
    pub batch_window: Duration,
    /// Time without an applied batch after which the snapshot is stale.
    pub stale_timeout: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            batch_window: Duration::from_millis(100),
            stale_timeout: Duration::from_millis(60_000),
        }
    }
}

/// Notification on the processor's output channel.
#[derive(Debug, Clone)]
pub enum DataUpdateEvent {
    /// A batch was applied.
    Updated {
        snapshot: Arc<DataSnapshot>,
        /// Kinds whose slice was committed, in application order.
        kinds: Vec<UpdateKind>,
        /// Updates merged into the snapshot, coalesced ones included.
        applied: usize,
        /// Updates discarded because a later full update in the batch won.
        superseded: usize,
        /// Updates dropped as undecodable or rolled back.
        dropped: usize,
    },
    /// No batch was applied within the staleness window.
    Stale { last_updated: DateTime<Utc> },
}

/// Outcome of one flush.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushSummary {
    pub kinds: Vec<UpdateKind>,
    pub rolled_back: Vec<UpdateKind>,
    pub applied: usize,
    pub superseded: usize,
    pub dropped: usize,
}

impl FlushSummary {
    /// True when the batch produced a new snapshot revision.
    pub fn committed(&self) -> bool {
        !self.kinds.is_empty()
    }
}

#[derive(Default)]
struct Pending {
    queue: Vec<UpdateEvent>,
    flush_armed: bool,
}

/// Non-full updates of one batch, decoded and grouped by kind.
#[derive(Default)]
struct Grouped {
    partials: Vec<Map<String, Value>>,
    philosophy: Vec<PhilosophyAlignment>,
    guardians: BTreeMap<GuardianType, AnalysisReport>,
    guardian_updates: usize,
    dropped: usize,
}

impl Grouped {
    fn decode<'a>(batch: impl IntoIterator<Item = &'a UpdateEvent>) -> Self {
        let mut grouped = Grouped::default();
        for update in batch {
            let decoded = match update.kind {
                // Resolved before grouping
                UpdateKind::FullUpdate => continue,
                UpdateKind::PartialUpdate => {
                    snapshot::decode_partial(&update.data).map(|p| grouped.partials.push(p))
                }
                UpdateKind::PhilosophyUpdate => {
                    snapshot::decode_philosophy(&update.data).map(|p| grouped.philosophy.push(p))
                }
                UpdateKind::GuardianUpdate => snapshot::decode_guardian(&update.data).map(|r| {
                    grouped.guardian_updates += 1;
                    grouped.guardians.insert(r.guardian_type, r);
                }),
            };
            if let Err(e) = decoded {
                log::warn!("Dropping {} update from {:?}: {}", update.kind, update.source, e);
                grouped.dropped += 1;
            }
        }
        grouped
    }
}

struct ProcessorInner {
    config: ProcessorConfig,
    pending: Mutex<Pending>,
    current: Mutex<Arc<DataSnapshot>>,
    // Monotonic instant of the last applied batch, for staleness
    applied_at: Mutex<Instant>,
    flush_gate: Mutex<()>,
    data_listeners: Arc<Listeners<DataUpdateEvent>>,
    full_requests: Arc<Listeners<String>>,
    tasks: TaskArena,
    closed: AtomicBool,
}

/// # Update Queue Processor
///
/// Sole owner of the [`DataSnapshot`]. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct UpdateQueueProcessor {
    inner: Arc<ProcessorInner>,
}

impl UpdateQueueProcessor {
    /// Creates a processor around `initial`. Timers are not armed until
    /// [`start`](Self::start).
    pub fn new(config: ProcessorConfig, initial: DataSnapshot) -> Self {
        Self {
            inner: Arc::new(ProcessorInner {
                config,
                pending: Mutex::new(Pending::default()),
                current: Mutex::new(Arc::new(initial)),
                applied_at: Mutex::new(Instant::now()),
                flush_gate: Mutex::new(()),
                data_listeners: Listeners::new("data_update"),
                full_requests: Listeners::new("full_update_request"),
                tasks: TaskArena::new("processor"),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Arms the staleness timer, counting from now.
    pub fn start(&self) {
        *self.inner.applied_at.lock() = Instant::now();
        self.inner.arm_stale();
    }

    /// Classifies `event` and queues it.
    pub fn handle_event(&self, event: &RawEvent) {
        self.enqueue(UpdateEvent::from_raw(event));
    }

    /// Queues an already classified update, arming the batch timer if no
    /// flush is pending.
    pub fn enqueue(&self, update: UpdateEvent) {
        if self.inner.closed.load(Ordering::Acquire) {
            log::debug!("Processor shut down, ignoring {} update", update.kind);
            return;
        }

        let mut pending = self.inner.pending.lock();
        pending.queue.push(update);
        if !pending.flush_armed {
            pending.flush_armed = true;
            let weak = Arc::downgrade(&self.inner);
            self.inner
                .tasks
                .schedule(TaskKind::Batch, self.inner.config.batch_window, async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.flush();
                    }
                });
        }
    }

    /// Applies everything queued so far without waiting for the batch timer.
    pub fn flush(&self) -> FlushSummary {
        self.inner.flush()
    }

    /// The current snapshot. Never torn; later revisions replace the `Arc`.
    pub fn snapshot(&self) -> Arc<DataSnapshot> {
        self.inner.current.lock().clone()
    }

    /// Number of updates waiting for the next flush.
    pub fn pending_len(&self) -> usize {
        self.inner.pending.lock().queue.len()
    }

    /// Registers a handler on the processed-output channel.
    pub fn on_data_update<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&DataUpdateEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.data_listeners.add(handler)
    }

    /// Registers a handler invoked whenever the processor wants a full
    /// snapshot from the server. The handler receives the reason.
    pub fn on_full_update_request<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&String) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.full_requests.add(handler)
    }

    /// Asks the server side for a full snapshot instead of trusting the
    /// accumulated partial updates. Returns how many handlers took the request.
    pub fn request_full_update(&self, reason: &str) -> usize {
        log::info!("Requesting full update ({})", reason);
        self.inner.full_requests.emit(&reason.to_string())
    }

    /// Applies `data` as a manual full update immediately, bypassing the socket.
    pub fn force_full_update(&self, data: Value) -> FlushSummary {
        self.enqueue(UpdateEvent::new(UpdateKind::FullUpdate, data, UpdateSource::Manual));
        self.flush()
    }

    /// Cancels the batch and staleness timers and discards queued updates.
    pub fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::Release);
        {
            let mut pending = self.inner.pending.lock();
            pending.queue.clear();
            pending.flush_armed = false;
        }
        self.inner.tasks.cancel_all();
    }

    /// Drops every output and full-update-request handler.
    pub fn clear_handlers(&self) {
        self.inner.data_listeners.clear();
        self.inner.full_requests.clear();
    }
}

impl ProcessorInner {
    fn flush(self: &Arc<Self>) -> FlushSummary {
        // Held from drain to commit so batches land in arrival order
        let gate = self.flush_gate.lock();
        let batch = {
            let mut pending = self.pending.lock();
            pending.flush_armed = false;
            self.tasks.cancel(TaskKind::Batch);
            std::mem::take(&mut pending.queue)
        };
        if batch.is_empty() {
            return FlushSummary::default();
        }

        let (summary, draft) = self.merge_batch(batch);
        let committed = draft.map(|draft| {
            let next = Arc::new(draft);
            *self.current.lock() = next.clone();
            *self.applied_at.lock() = Instant::now();
            next
        });
        drop(gate);

        match committed {
            Some(snapshot) => {
                log::debug!(
                    "Applied batch #{}: kinds={:?} applied={} superseded={} dropped={}",
                    snapshot.update_count,
                    summary.kinds,
                    summary.applied,
                    summary.superseded,
                    summary.dropped
                );
                if !self.closed.load(Ordering::Acquire) {
                    self.arm_stale();
                }
                self.data_listeners.emit(&DataUpdateEvent::Updated {
                    snapshot,
                    kinds: summary.kinds.clone(),
                    applied: summary.applied,
                    superseded: summary.superseded,
                    dropped: summary.dropped,
                });
            }
            None => {
                log::debug!("Batch had nothing to apply (dropped={})", summary.dropped);
            }
        }
        summary
    }

    /// Merges `batch` into a draft of the current snapshot. Returns the draft
    /// only if at least one kind slice was committed.
    ///
    /// The last full update that decodes and merges cleanly wins and
    /// supersedes everything queued before it. Full updates that fail are
    /// dropped and the search falls back to earlier ones; if none applies,
    /// the other updates of the batch are merged as usual.
    fn merge_batch(&self, batch: Vec<UpdateEvent>) -> (FlushSummary, Option<DataSnapshot>) {
        let mut summary = FlushSummary::default();
        let base = self.current.lock().clone();
        let mut draft = (*base).clone();
        let mut rest_from = 0;

        let full_positions: Vec<usize> = batch
            .iter()
            .enumerate()
            .filter(|(_, u)| u.kind == UpdateKind::FullUpdate)
            .map(|(i, _)| i)
            .collect();
        for &pos in full_positions.iter().rev() {
            let update = &batch[pos];
            let payload = match snapshot::decode_full(&update.data) {
                Ok(payload) => payload,
                Err(e) => {
                    log::warn!("Dropping {} update from {:?}: {}", update.kind, update.source, e);
                    summary.dropped += 1;
                    continue;
                }
            };
            let mut trial = draft.clone();
            match trial.apply_full(payload) {
                Ok(()) => {
                    draft = trial;
                    summary.kinds.push(UpdateKind::FullUpdate);
                    summary.applied += 1;
                    summary.superseded = pos;
                    rest_from = pos + 1;
                    break;
                }
                Err(e) => {
                    log::error!("Rolled back {} update from {:?}: {}", update.kind, update.source, e);
                    if !summary.rolled_back.contains(&UpdateKind::FullUpdate) {
                        summary.rolled_back.push(UpdateKind::FullUpdate);
                    }
                    summary.dropped += 1;
                }
            }
        }

        let grouped = Grouped::decode(&batch[rest_from..]);
        summary.dropped += grouped.dropped;

        if !grouped.partials.is_empty() {
            let partials = grouped.partials;
            commit_slice(&mut draft, &mut summary, UpdateKind::PartialUpdate, partials.len(), |d| {
                partials.iter().try_for_each(|patch| d.apply_partial(patch))
            });
        }
        if !grouped.philosophy.is_empty() {
            let updates = grouped.philosophy;
            commit_slice(&mut draft, &mut summary, UpdateKind::PhilosophyUpdate, updates.len(), |d| {
                updates.iter().try_for_each(|alignment| d.apply_philosophy(alignment))
            });
        }
        if !grouped.guardians.is_empty() {
            let reports: Vec<AnalysisReport> = grouped.guardians.into_values().collect();
            commit_slice(
                &mut draft,
                &mut summary,
                UpdateKind::GuardianUpdate,
                grouped.guardian_updates,
                |d| d.apply_guardian_reports(reports),
            );
        }

        if !summary.committed() {
            return (summary, None);
        }

        draft.update_count = base.update_count + 1;
        draft.last_updated = Utc::now();
        draft.is_stale = false;
        (summary, Some(draft))
    }

    fn arm_stale(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        self.tasks
            .schedule(TaskKind::Stale, self.config.stale_timeout, async move {
                if let Some(inner) = weak.upgrade() {
                    inner.mark_stale();
                }
            });
    }

    fn mark_stale(&self) {
        let stale = {
            let _gate = self.flush_gate.lock();
            if self.applied_at.lock().elapsed() < self.config.stale_timeout {
                return;
            }
            let mut current = self.current.lock();
            if current.is_stale {
                return;
            }
            let mut next = (**current).clone();
            next.is_stale = true;
            let last_updated = next.last_updated;
            *current = Arc::new(next);
            last_updated
        };

        log::warn!(
            "No update applied for {:?}, snapshot is stale (last updated {})",
            self.config.stale_timeout,
            stale
        );
        self.data_listeners.emit(&DataUpdateEvent::Stale { last_updated: stale });
    }
}

/// Runs `merge` on a copy of `draft` and keeps the result only on success.
fn commit_slice<F>(
    draft: &mut DataSnapshot,
    summary: &mut FlushSummary,
    kind: UpdateKind,
    count: usize,
    merge: F,
) where
    F: FnOnce(&mut DataSnapshot) -> Result<(), MergeError>,
{
    let mut trial = draft.clone();
    match merge(&mut trial) {
        Ok(()) => {
            *draft = trial;
            summary.kinds.push(kind);
            summary.applied += count;
        }
        Err(e) => {
            log::error!("Rolled back {} slice of {} update(s): {}", kind, count, e);
            summary.rolled_back.push(kind);
            summary.dropped += count;
        }
    }
}
