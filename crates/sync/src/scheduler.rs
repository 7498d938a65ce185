#![forbid(unsafe_code)]

use crate::checkin::request_check_in;
use crate::engine::{SyncEngine, SyncScope};
use crate::error::CheckinError;
use crate::remote::{EventService, ProfileResolver};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};
use ts_core::ids::{AttendeeCode, EventId};
use ts_core::model::Attendee;
use ts_storage::Provider;

/// Clonable handle for enqueueing sync requests. Sending never blocks; a
/// request after the scheduler shut down is silently dropped.
#[derive(Clone)]
pub struct SyncRequests {
    tx: mpsc::Sender<SyncScope>,
}

impl SyncRequests {
    pub fn request_sync(&self, checkins_only: bool) {
        let scope = if checkins_only {
            SyncScope::CheckinsOnly
        } else {
            SyncScope::Full
        };
        let _ = self.tx.send(scope);
    }
}

/// The work queue the engine consumes: one worker thread, draining and
/// coalescing queued requests before each run (a queued full sync dominates
/// check-ins-only ones). An engine-less scheduler models the unauthenticated
/// state and drops requests with a log line.
pub struct SyncScheduler {
    requests: SyncRequests,
    worker: JoinHandle<()>,
}

impl SyncScheduler {
    pub fn spawn<S, P>(engine: Option<SyncEngine<S, P>>) -> Self
    where
        S: EventService + Send + 'static,
        P: ProfileResolver + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let worker = thread::spawn(move || sync_worker(engine, rx));
        Self {
            requests: SyncRequests { tx },
            worker,
        }
    }

    pub fn requests(&self) -> SyncRequests {
        self.requests.clone()
    }

    pub fn request_sync(&self, checkins_only: bool) {
        self.requests.request_sync(checkins_only);
    }

    /// Stops accepting requests and waits for the in-flight run, if any.
    /// Outstanding [`SyncRequests`] clones keep the worker alive past this
    /// call.
    pub fn shutdown(self) {
        let Self { requests, worker } = self;
        drop(requests);
        let _ = worker.join();
    }
}

fn sync_worker<S: EventService, P: ProfileResolver>(
    engine: Option<SyncEngine<S, P>>,
    rx: mpsc::Receiver<SyncScope>,
) {
    while let Ok(first) = rx.recv() {
        let mut scope = first;
        while let Ok(next) = rx.try_recv() {
            if next == SyncScope::Full {
                scope = SyncScope::Full;
            }
        }
        let Some(engine) = engine.as_ref() else {
            debug!("no session credential; dropping sync request");
            continue;
        };
        match engine.sync(scope) {
            Ok(report) => debug!(?report, "scheduled sync finished"),
            Err(err) => warn!(error = %err, "scheduled sync aborted; dirty state is kept for retry"),
        }
    }
}

type CheckinCallback = Box<dyn FnOnce(Result<Option<Attendee>, CheckinError>) + Send>;

struct CheckinJob {
    code: AttendeeCode,
    event_id: EventId,
    revert: bool,
    callback: CheckinCallback,
}

/// Runs check-in jobs off the caller's thread and delivers the outcome to a
/// caller-supplied callback. A successful transition fires a check-ins-only
/// sync request before the callback runs.
pub struct CheckinDispatcher {
    tx: mpsc::Sender<CheckinJob>,
    worker: JoinHandle<()>,
}

impl CheckinDispatcher {
    pub fn spawn(provider: Arc<Provider>, sync: Option<SyncRequests>) -> Self {
        let (tx, rx) = mpsc::channel::<CheckinJob>();
        let worker = thread::spawn(move || {
            while let Ok(job) = rx.recv() {
                let result = request_check_in(&provider, &job.code, &job.event_id, job.revert);
                if matches!(result, Ok(Some(_)))
                    && let Some(sync) = sync.as_ref()
                {
                    sync.request_sync(true);
                }
                (job.callback)(result);
            }
        });
        Self { tx, worker }
    }

    pub fn submit(
        &self,
        code: AttendeeCode,
        event_id: EventId,
        revert: bool,
        callback: impl FnOnce(Result<Option<Attendee>, CheckinError>) + Send + 'static,
    ) {
        let _ = self.tx.send(CheckinJob {
            code,
            event_id,
            revert,
            callback: Box::new(callback),
        });
    }

    /// Drains queued jobs, then stops the worker.
    pub fn shutdown(self) {
        let Self { tx, worker } = self;
        drop(tx);
        let _ = worker.join();
    }
}
