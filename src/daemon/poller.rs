use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

use log::{debug, warn};

use crate::daemon::notifier::{NotificationBackend, NotificationRouter};
use crate::daemon::seen::SeenSet;
use crate::domain::email::{Message, MessageId, MessageSummary, OpenTarget};
use crate::error::Result;
use crate::mail::api::MailboxApi;
use crate::store::lifecycle::EmailStore;
use crate::store::repo::LocalStorage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollRequest {
    pub address: String,
    /// Timer-driven polls notify; user-initiated checks only refresh.
    pub silent: bool,
}

#[derive(Debug)]
pub struct PollOutcome {
    pub request: PollRequest,
    pub result: Result<Vec<MessageSummary>>,
}

#[derive(Debug)]
pub struct ReadOutcome {
    pub target: OpenTarget,
    pub result: Result<Message>,
}

enum Job {
    Inbox(PollRequest),
    Read(OpenTarget),
}

/// A finished job handed back to the owner.
#[derive(Debug)]
pub enum WorkerOutcome {
    Inbox(PollOutcome),
    Read(ReadOutcome),
}

/// Runs inbox fetches and message reads off the UI thread, in request order.
pub struct PollWorker {
    jobs: Option<Sender<Job>>,
    outcomes: Receiver<WorkerOutcome>,
    handle: Option<JoinHandle<()>>,
}

impl PollWorker {
    pub fn spawn(api: Arc<dyn MailboxApi>) -> Self {
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let (out_tx, out_rx) = mpsc::channel();

        let handle = thread::spawn(move || {
            for job in job_rx {
                let outcome = match job {
                    Job::Inbox(request) => {
                        let result = api.get_messages(&request.address);
                        WorkerOutcome::Inbox(PollOutcome { request, result })
                    }
                    Job::Read(target) => {
                        let result = api.read_message(&target.address, target.message_id);
                        WorkerOutcome::Read(ReadOutcome { target, result })
                    }
                };
                if out_tx.send(outcome).is_err() {
                    break;
                }
            }
            debug!("poll worker exiting");
        });

        Self {
            jobs: Some(job_tx),
            outcomes: out_rx,
            handle: Some(handle),
        }
    }

    pub fn request(&self, request: PollRequest) {
        self.send(Job::Inbox(request));
    }

    pub fn request_read(&self, target: OpenTarget) {
        self.send(Job::Read(target));
    }

    fn send(&self, job: Job) {
        if let Some(tx) = &self.jobs
            && tx.send(job).is_err()
        {
            warn!("poll worker is gone; request dropped");
        }
    }

    pub fn try_recv(&self) -> Option<WorkerOutcome> {
        match self.outcomes.try_recv() {
            Ok(o) => Some(o),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Closes the job channel and waits for the in-flight fetch.
    pub fn stop(&mut self) {
        self.jobs = None;
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for PollWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A response is stale once its address is gone or, when the caller only
/// shows one inbox, no longer selected.
pub fn is_stale<S: LocalStorage>(
    store: &EmailStore<S>,
    address: &str,
    require_selected: bool,
) -> bool {
    !store.contains(address) || (require_selected && store.selected() != Some(address))
}

/// Records an inbox fetch and routes notifications for unseen messages.
/// Returns the new ids, or `None` if the address is no longer tracked.
#[allow(clippy::too_many_arguments)]
pub fn apply_inbox<S: LocalStorage, B: NotificationBackend>(
    store: &mut EmailStore<S>,
    seen: &mut SeenSet,
    router: &mut NotificationRouter<B>,
    address: &str,
    messages: &[MessageSummary],
    notify: bool,
    has_permission: bool,
    now: i64,
) -> Result<Option<Vec<MessageId>>> {
    if !store.contains(address) {
        debug!("discarding inbox for untracked {address}");
        return Ok(None);
    }

    let count = u32::try_from(messages.len()).unwrap_or(u32::MAX);
    store.record_message_count(address, count)?;

    let new_ids = seen.delta(address, messages.iter().map(|m| m.id));
    if notify {
        for id in &new_ids {
            if let Some(m) = messages.iter().find(|m| m.id == *id) {
                router.notify(address, m, has_permission, now);
            }
        }
    }
    Ok(Some(new_ids))
}
