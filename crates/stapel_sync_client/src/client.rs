//! Single-flight sync client.

use crate::apply::{apply_response, AppliedCounts};
use crate::error::SyncResult;
use crate::queue::{ChangeQueue, LocalChange};
use crate::transport::SyncTransport;
use parking_lot::Mutex;
use stapel_core::{now, ConsumptionEntry, EntityStore, Rack, Timestamp};
use stapel_sync_protocol::{ChangeAction, ConflictRecord, SyncItem, SyncRequest};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Why a trigger did not start a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A round is already in flight; the trigger is dropped, not queued.
    /// Whatever it would have uploaded stays in the queue for the next
    /// round.
    AlreadySyncing,
    /// Sync is disabled by configuration.
    Disabled,
    /// The client is offline.
    Offline,
}

/// Summary of one completed round.
#[derive(Debug, Clone)]
pub struct RoundReport {
    /// Queue items uploaded.
    pub pushed: usize,
    /// Server changes applied to the local replica.
    pub applied: AppliedCounts,
    /// Queue items that lost arbitration.
    pub conflicts: Vec<ConflictRecord>,
    /// The server time of the round; now the client's cursor.
    pub server_timestamp: Timestamp,
}

/// What happened to a trigger.
///
/// A round never panics or propagates an error to the caller; failures
/// are reported here with all durable state untouched, so the next
/// trigger simply retries everything still pending.
#[derive(Debug)]
pub enum SyncOutcome {
    /// A round ran to completion.
    Completed(RoundReport),
    /// No round was started.
    Skipped(SkipReason),
    /// A round started but aborted; queue and cursor are unchanged.
    Failed(String),
}

impl SyncOutcome {
    /// Returns true if a round completed.
    pub fn is_completed(&self) -> bool {
        matches!(self, SyncOutcome::Completed(_))
    }
}

/// Point-in-time view of the client, for UI surfaces.
#[derive(Debug, Clone)]
pub struct ClientStatus {
    /// Whether the client believes it is online.
    pub is_online: bool,
    /// Whether a round is in flight.
    pub is_syncing: bool,
    /// Number of queued local changes.
    pub pending_changes: usize,
    /// When the last successful round finished.
    pub last_sync_at: Option<Timestamp>,
    /// Why the last round failed, if it did.
    pub last_error: Option<String>,
}

/// Drains the change queue into sync rounds and applies server replies.
///
/// One instance exists per running app. Rounds are single-flight: the
/// `syncing` flag is a guard, not a lock, because the client model is
/// single-threaded cooperative with the network call as the only
/// suspension point.
pub struct SyncClient<T: SyncTransport> {
    transport: T,
    racks: Arc<dyn EntityStore<Rack>>,
    consumptions: Arc<dyn EntityStore<ConsumptionEntry>>,
    queue: Mutex<ChangeQueue>,
    cursor: Mutex<Option<Timestamp>>,
    syncing: AtomicBool,
    online: AtomicBool,
    enabled: AtomicBool,
    last_sync_at: Mutex<Option<Timestamp>>,
    last_error: Mutex<Option<String>>,
}

impl<T: SyncTransport> SyncClient<T> {
    /// Creates a client over the given transport and local stores.
    ///
    /// Starts online and enabled with no cursor ("never synced").
    pub fn new(
        transport: T,
        racks: Arc<dyn EntityStore<Rack>>,
        consumptions: Arc<dyn EntityStore<ConsumptionEntry>>,
    ) -> Self {
        Self {
            transport,
            racks,
            consumptions,
            queue: Mutex::new(ChangeQueue::new()),
            cursor: Mutex::new(None),
            syncing: AtomicBool::new(false),
            online: AtomicBool::new(true),
            enabled: AtomicBool::new(true),
            last_sync_at: Mutex::new(None),
            last_error: Mutex::new(None),
        }
    }

    /// The current cursor: the server watermark already reflected
    /// locally, or `None` if never synced.
    pub fn cursor(&self) -> Option<Timestamp> {
        *self.cursor.lock()
    }

    /// Restores a persisted cursor, e.g. at app start.
    pub fn set_cursor(&self, cursor: Option<Timestamp>) {
        *self.cursor.lock() = cursor;
    }

    /// Returns true if a round is in flight.
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::SeqCst)
    }

    /// Enables or disables syncing. Triggers while disabled are skipped.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Number of queued local changes.
    pub fn pending_changes(&self) -> usize {
        self.queue.lock().len()
    }

    /// Updates connectivity. Transitioning from offline to online
    /// triggers a round.
    pub fn set_online(&self, online: bool) -> Option<SyncOutcome> {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        if online && !was_online {
            debug!("back online, triggering sync");
            return Some(self.trigger_sync());
        }
        None
    }

    /// Records a local mutation and, when online and enabled, triggers
    /// a round immediately.
    pub fn record_change(
        &self,
        action: ChangeAction,
        change: impl Into<LocalChange>,
    ) -> Option<SyncOutcome> {
        self.queue.lock().enqueue(action, change);
        if self.online.load(Ordering::SeqCst) && self.enabled.load(Ordering::SeqCst) {
            return Some(self.trigger_sync());
        }
        None
    }

    /// Runs one sync round unless disabled, offline, or already syncing.
    pub fn trigger_sync(&self) -> SyncOutcome {
        if !self.enabled.load(Ordering::SeqCst) {
            return SyncOutcome::Skipped(SkipReason::Disabled);
        }
        if !self.online.load(Ordering::SeqCst) {
            return SyncOutcome::Skipped(SkipReason::Offline);
        }
        if self.syncing.swap(true, Ordering::SeqCst) {
            return SyncOutcome::Skipped(SkipReason::AlreadySyncing);
        }

        let outcome = match self.run_round() {
            Ok(report) => {
                *self.last_error.lock() = None;
                *self.last_sync_at.lock() = Some(now());
                info!(
                    pushed = report.pushed,
                    applied = report.applied.total(),
                    conflicts = report.conflicts.len(),
                    "sync round completed"
                );
                SyncOutcome::Completed(report)
            }
            Err(error) => {
                warn!(%error, retryable = error.is_retryable(), "sync round failed");
                let message = error.to_string();
                *self.last_error.lock() = Some(message.clone());
                SyncOutcome::Failed(message)
            }
        };

        self.syncing.store(false, Ordering::SeqCst);
        outcome
    }

    /// One full round: upload the queue, apply the reply, then commit
    /// by acknowledging the uploaded items and advancing the cursor.
    ///
    /// Queue and cursor are only touched after the reply has been fully
    /// applied; until then the round is a pure function of immutable
    /// snapshots and can be retried verbatim. Changes enqueued while
    /// the exchange was in flight are not acknowledged and ride the
    /// next round.
    fn run_round(&self) -> SyncResult<RoundReport> {
        let items = self.queue.lock().drain();
        let request = build_request(self.cursor(), &items);
        debug!(
            racks = request.racks.len(),
            consumptions = request.consumptions.len(),
            "starting sync round"
        );

        let response = self.transport.send(&request)?;
        let applied = apply_response(&*self.racks, &*self.consumptions, &response)?;

        self.queue.lock().acknowledge(&items);
        *self.cursor.lock() = Some(response.server_timestamp);

        Ok(RoundReport {
            pushed: items.len(),
            applied,
            conflicts: response.conflicts,
            server_timestamp: response.server_timestamp,
        })
    }

    /// Point-in-time status for UI surfaces.
    pub fn status(&self) -> ClientStatus {
        ClientStatus {
            is_online: self.online.load(Ordering::SeqCst),
            is_syncing: self.is_syncing(),
            pending_changes: self.pending_changes(),
            last_sync_at: *self.last_sync_at.lock(),
            last_error: self.last_error.lock().clone(),
        }
    }

    /// Drops all queued changes without uploading them.
    pub fn clear_queue(&self) {
        self.queue.lock().clear();
    }

    /// Forgets the queue and the cursor, e.g. on logout. The next round
    /// behaves like a first sync.
    pub fn reset(&self) {
        self.clear_queue();
        *self.cursor.lock() = None;
        *self.last_sync_at.lock() = None;
        *self.last_error.lock() = None;
    }
}

fn build_request(
    cursor: Option<Timestamp>,
    items: &[crate::queue::ChangeQueueItem],
) -> SyncRequest {
    let mut request = SyncRequest {
        last_sync_timestamp: cursor,
        ..SyncRequest::default()
    };
    for item in items {
        match &item.data {
            LocalChange::Rack(rack) => {
                request.racks.push(SyncItem::new(rack.clone(), item.action));
            }
            LocalChange::Consumption(entry) => {
                request
                    .consumptions
                    .push(SyncItem::new(entry.clone(), item.action));
            }
        }
    }
    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use chrono::TimeZone;
    use stapel_core::{LogSize, MemoryStore, Replicated};
    use stapel_sync_protocol::{ChangeSet, SyncResponse};
    use std::sync::mpsc;

    fn ts(secs: i64) -> Timestamp {
        chrono::Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn rack(name: &str) -> Rack {
        Rack::new(name, 180.0, 200.0, 33.0, LogSize::Cm33, 1.19, 1.66, ts(100))
    }

    fn empty_response(server_ts: Timestamp) -> SyncResponse {
        SyncResponse {
            server_timestamp: server_ts,
            racks: ChangeSet::default(),
            consumptions: ChangeSet::default(),
            conflicts: vec![],
        }
    }

    fn client(transport: MockTransport) -> SyncClient<MockTransport> {
        SyncClient::new(
            transport,
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryStore::new()),
        )
    }

    #[test]
    fn successful_round_clears_queue_and_advances_cursor() {
        let transport = MockTransport::new();
        transport.push_response(empty_response(ts(1_000)));
        let client = client(transport);

        client.queue.lock().enqueue(ChangeAction::Create, rack("shed"));
        let outcome = client.trigger_sync();

        match outcome {
            SyncOutcome::Completed(report) => {
                assert_eq!(report.pushed, 1);
                assert_eq!(report.server_timestamp, ts(1_000));
            }
            other => panic!("expected completion, got {other:?}"),
        }
        assert_eq!(client.pending_changes(), 0);
        assert_eq!(client.cursor(), Some(ts(1_000)));
        assert!(client.status().last_error.is_none());
    }

    #[test]
    fn failed_round_leaves_queue_and_cursor_untouched() {
        let transport = MockTransport::new();
        transport.push_failure("connection reset");
        let client = client(transport);

        client.set_cursor(Some(ts(500)));
        client.queue.lock().enqueue(ChangeAction::Create, rack("shed"));
        let outcome = client.trigger_sync();

        assert!(matches!(outcome, SyncOutcome::Failed(_)));
        assert_eq!(client.pending_changes(), 1);
        assert_eq!(client.cursor(), Some(ts(500)));
        assert!(client.status().last_error.is_some());
        assert!(!client.is_syncing());
    }

    #[test]
    fn failed_round_is_retryable_verbatim() {
        let transport = MockTransport::new();
        transport.push_failure("offline");
        transport.push_response(empty_response(ts(2_000)));
        let client = client(transport);

        client.queue.lock().enqueue(ChangeAction::Create, rack("shed"));
        assert!(matches!(client.trigger_sync(), SyncOutcome::Failed(_)));
        assert!(client.trigger_sync().is_completed());

        // Both rounds uploaded the identical snapshot.
        let requests = client.transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].racks.len(), 1);
        assert_eq!(requests[0].racks[0].data.id, requests[1].racks[0].data.id);
        assert_eq!(client.pending_changes(), 0);
    }

    #[test]
    fn disabled_and_offline_triggers_are_skipped() {
        let client = client(MockTransport::new());

        client.set_enabled(false);
        assert!(matches!(
            client.trigger_sync(),
            SyncOutcome::Skipped(SkipReason::Disabled)
        ));

        client.set_enabled(true);
        client.set_online(false);
        assert!(matches!(
            client.trigger_sync(),
            SyncOutcome::Skipped(SkipReason::Offline)
        ));
    }

    #[test]
    fn record_change_while_offline_queues_without_syncing() {
        let client = client(MockTransport::new());
        client.set_online(false);

        let outcome = client.record_change(ChangeAction::Create, rack("shed"));
        assert!(outcome.is_none());
        assert_eq!(client.pending_changes(), 1);
    }

    #[test]
    fn coming_back_online_triggers_a_round() {
        let transport = MockTransport::new();
        transport.push_response(empty_response(ts(1_000)));
        let client = client(transport);

        client.set_online(false);
        client.record_change(ChangeAction::Create, rack("shed"));

        let outcome = client.set_online(true).expect("transition should trigger");
        assert!(outcome.is_completed());
        assert_eq!(client.pending_changes(), 0);

        // Staying online is not a transition.
        assert!(client.set_online(true).is_none());
    }

    #[test]
    fn request_carries_cursor_and_snapshot_timestamps() {
        let transport = MockTransport::new();
        transport.push_response(empty_response(ts(1_000)));
        let client = client(transport);
        client.set_cursor(Some(ts(700)));

        let mut r = rack("shed");
        r.set_updated_at(ts(800));
        client.queue.lock().enqueue(ChangeAction::Update, r.clone());
        client.trigger_sync();

        let request = client.transport.last_request().unwrap();
        assert_eq!(request.last_sync_timestamp, Some(ts(700)));
        assert_eq!(request.racks[0].local_updated_at, ts(800));
    }

    #[test]
    fn reset_forgets_cursor_and_queue() {
        let transport = MockTransport::new();
        transport.push_response(empty_response(ts(1_000)));
        let client = client(transport);

        client.record_change(ChangeAction::Create, rack("shed"));
        assert!(client.cursor().is_some());

        client.record_change(ChangeAction::Create, rack("other"));
        client.reset();
        assert_eq!(client.pending_changes(), 0);
        assert!(client.cursor().is_none());
        assert!(client.status().last_sync_at.is_none());
    }

    /// Transport that blocks inside `send` until released, to hold a
    /// round in flight from another thread.
    struct BlockingTransport {
        entered: mpsc::Sender<()>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl SyncTransport for BlockingTransport {
        fn send(&self, _request: &SyncRequest) -> crate::error::SyncResult<SyncResponse> {
            self.entered.send(()).expect("test listener gone");
            self.release.lock().recv().expect("test release gone");
            Ok(empty_response(ts(1_000)))
        }
    }

    #[test]
    fn concurrent_trigger_is_dropped_not_queued() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let transport = BlockingTransport {
            entered: entered_tx,
            release: Mutex::new(release_rx),
        };
        let client = Arc::new(SyncClient::new(
            transport,
            Arc::new(MemoryStore::new()) as Arc<dyn EntityStore<Rack>>,
            Arc::new(MemoryStore::new()) as Arc<dyn EntityStore<ConsumptionEntry>>,
        ));

        let worker = {
            let client = Arc::clone(&client);
            std::thread::spawn(move || client.trigger_sync())
        };

        // Wait until the worker is inside the transport call.
        entered_rx.recv().unwrap();
        assert!(client.is_syncing());
        assert!(matches!(
            client.trigger_sync(),
            SyncOutcome::Skipped(SkipReason::AlreadySyncing)
        ));

        release_tx.send(()).unwrap();
        let outcome = worker.join().unwrap();
        assert!(outcome.is_completed());
        assert!(!client.is_syncing());
    }

    #[test]
    fn change_enqueued_mid_round_survives_the_commit() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let transport = BlockingTransport {
            entered: entered_tx,
            release: Mutex::new(release_rx),
        };
        let client = Arc::new(SyncClient::new(
            transport,
            Arc::new(MemoryStore::new()) as Arc<dyn EntityStore<Rack>>,
            Arc::new(MemoryStore::new()) as Arc<dyn EntityStore<ConsumptionEntry>>,
        ));
        client.queue.lock().enqueue(ChangeAction::Create, rack("uploaded"));

        let worker = {
            let client = Arc::clone(&client);
            std::thread::spawn(move || client.trigger_sync())
        };

        entered_rx.recv().unwrap();
        let late = rack("late");
        let outcome = client
            .record_change(ChangeAction::Create, late.clone())
            .expect("online client triggers");
        assert!(matches!(
            outcome,
            SyncOutcome::Skipped(SkipReason::AlreadySyncing)
        ));

        release_tx.send(()).unwrap();
        assert!(worker.join().unwrap().is_completed());

        // Only the uploaded item was acknowledged.
        assert_eq!(client.pending_changes(), 1);
        let remaining = client.queue.lock().drain();
        assert_eq!(remaining[0].entity_id, late.id);
    }
}
