use std::sync::Arc;
use std::sync::mpsc::Receiver;

use log::{debug, warn};

use crate::daemon::notifier::{DesktopBackend, NotificationBackend, NotificationKey, NotificationRouter};
use crate::daemon::poller::{
    PollOutcome, PollRequest, PollWorker, ReadOutcome, WorkerOutcome, apply_inbox, is_stale,
};
use crate::daemon::schedule::{Tick, now_epoch};
use crate::daemon::seen::SeenSet;
use crate::domain::email::OpenTarget;
use crate::error::DispenserError;
use crate::mail::api::MailboxApi;
use crate::store::lifecycle::{EmailStore, notification_permission};
use crate::store::sqlite::SqliteStorage;
use crate::terminal::state::{AppState, Focus, PolicyDialog};

/// What a key press asks the session to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Generate,
    CommitPolicy,
    CancelDialog,
    SelectEntry,
    CheckMail,
    OpenMessage,
    OpenAttachment(usize),
    DeleteEntry,
    ClearAll,
    Open(OpenTarget),
}

/// Everything the presenter drives: the store plus its collaborators.
pub struct Session<B: NotificationBackend = DesktopBackend> {
    pub store: EmailStore<SqliteStorage>,
    pub api: Arc<dyn MailboxApi>,
    pub router: NotificationRouter<B>,
    pub seen: SeenSet,
    worker: PollWorker,
    clicks: Option<Receiver<NotificationKey>>,
}

impl<B: NotificationBackend> Session<B> {
    pub fn new(
        store: EmailStore<SqliteStorage>,
        api: Arc<dyn MailboxApi>,
        router: NotificationRouter<B>,
    ) -> Self {
        let worker = PollWorker::spawn(api.clone());
        Self {
            store,
            api,
            router,
            seen: SeenSet::new(),
            worker,
            clicks: None,
        }
    }

    pub fn with_clicks(mut self, clicks: Receiver<NotificationKey>) -> Self {
        self.clicks = Some(clicks);
        self
    }

    pub fn dispatch(&mut self, state: &mut AppState, cmd: Command) {
        let now = now_epoch();
        match cmd {
            Command::Generate => match self.store.generate(self.api.as_ref()) {
                Ok(address) => {
                    state.reset_inbox();
                    state.dialog = Some(PolicyDialog::new(address));
                }
                Err(e) => self.router.toast(format!("Could not generate address: {e}"), now),
            },

            Command::CommitPolicy => self.commit_dialog(state, now),

            Command::CancelDialog => state.dialog = None,

            Command::SelectEntry => {
                let Some(address) = state
                    .history
                    .selected()
                    .and_then(|i| self.store.entries().get(i))
                    .map(|e| e.address.clone())
                else {
                    return;
                };
                self.select(state, &address);
                state.focus = Focus::Inbox;
            }

            Command::CheckMail => {
                if let Some(address) = self.store.selected().map(str::to_string) {
                    self.request_poll(state, &address, false);
                }
            }

            Command::OpenMessage => {
                let (Some(address), Some(id)) = (
                    state.inbox_of.clone(),
                    state.selected_message().map(|m| m.id),
                ) else {
                    return;
                };
                let target = OpenTarget {
                    address,
                    message_id: id,
                };
                self.read(state, target);
            }

            Command::OpenAttachment(n) => self.open_attachment(state, n, now),

            Command::DeleteEntry => {
                let Some(address) = state
                    .history
                    .selected()
                    .and_then(|i| self.store.entries().get(i))
                    .map(|e| e.address.clone())
                else {
                    return;
                };
                match self.store.delete(&address) {
                    Ok(()) => {
                        self.seen.forget(&address);
                        if state.inbox_of.as_deref() == Some(address.as_str()) {
                            state.reset_inbox();
                        }
                    }
                    Err(e) => self.router.toast(format!("Delete failed: {e}"), now),
                }
                state.clamp_history(self.store.len());
            }

            Command::ClearAll => {
                match self.store.clear() {
                    Ok(()) => {
                        self.seen.clear();
                        state.reset_inbox();
                    }
                    Err(e) => self.router.toast(format!("Clear failed: {e}"), now),
                }
                state.clamp_history(0);
            }

            Command::Open(target) => {
                if !self.store.contains(&target.address) {
                    self.router
                        .toast(format!("{} is no longer tracked", target.address), now);
                    return;
                }
                if let Some(pos) = self
                    .store
                    .entries()
                    .iter()
                    .position(|e| e.address == target.address)
                {
                    state.history.select(Some(pos));
                }
                self.select(state, &target.address);
                self.read(state, target);
            }
        }
    }

    fn commit_dialog(&mut self, state: &mut AppState, now: i64) {
        let Some(dialog) = state.dialog.as_mut() else {
            return;
        };
        let policy = match dialog.policy() {
            Ok(p) => p,
            Err(e) => {
                dialog.error = Some(e.to_string());
                return;
            }
        };
        let address = dialog.address.clone();
        match self.store.commit(&address, policy, now) {
            Ok(_) => {
                state.dialog = None;
                state.history.select(Some(self.store.len() - 1));
                self.select(state, &address);
            }
            Err(e @ DispenserError::InvalidPolicy(_)) => dialog.error = Some(e.to_string()),
            Err(e) => {
                state.dialog = None;
                self.router.toast(format!("Could not save address: {e}"), now);
            }
        }
    }

    fn select(&mut self, state: &mut AppState, address: &str) {
        if self.store.selected() != Some(address) {
            state.reset_inbox();
        }
        self.store.select(Some(address.to_string()));
        self.request_poll(state, address, false);
    }

    fn request_poll(&mut self, state: &mut AppState, address: &str, silent: bool) {
        if !silent {
            state.checking = true;
        }
        self.worker.request(PollRequest {
            address: address.to_string(),
            silent,
        });
    }

    fn read(&mut self, state: &mut AppState, target: OpenTarget) {
        state.opening = Some(target.clone());
        self.worker.request_read(target);
    }

    fn open_attachment(&mut self, state: &mut AppState, n: usize, now: i64) {
        let Some(message) = &state.opened else {
            return;
        };
        let (Some(address), Some(att)) = (state.inbox_of.as_deref(), message.attachments.get(n))
        else {
            return;
        };
        let opened = self
            .api
            .download_url(address, message.id, &att.filename)
            .map_err(anyhow::Error::from)
            .and_then(|url| open::that(url.as_str()).map_err(anyhow::Error::from));
        if let Err(e) = opened {
            self.router
                .toast(format!("Could not open {}: {e}", att.filename), now);
        }
    }

    pub fn on_tick(&mut self, state: &mut AppState, tick: Tick) {
        let now = now_epoch();
        match tick {
            Tick::Sweep => {
                // the CLI or daemon may have changed the list since the last tick
                self.store.reload();
                match self.store.sweep_expired(now) {
                    Ok(removed) => {
                        for address in &removed {
                            self.seen.forget(address);
                        }
                    }
                    Err(e) => warn!("sweep failed: {e}"),
                }
                if state
                    .inbox_of
                    .as_ref()
                    .is_some_and(|a| !self.store.contains(a))
                {
                    state.reset_inbox();
                }
                state.clamp_history(self.store.len());
            }
            Tick::Poll => {
                if let Some(address) = self.store.selected().map(str::to_string)
                    && self.store.contains(&address)
                {
                    self.request_poll(state, &address, true);
                }
            }
            Tick::Forget => {
                self.router.forget_stale(now);
            }
        }
    }

    /// Applies finished polls and notification clicks.
    pub fn drain_events(&mut self, state: &mut AppState) {
        while let Some(outcome) = self.worker.try_recv() {
            match outcome {
                WorkerOutcome::Inbox(o) => self.apply_outcome(state, o),
                WorkerOutcome::Read(o) => self.apply_read(state, o),
            }
        }

        let mut targets = Vec::new();
        if let Some(clicks) = &self.clicks {
            while let Ok(key) = clicks.try_recv() {
                if let Some(t) = self.router.resolve_click(key) {
                    targets.push(t);
                }
            }
        }
        for t in targets {
            self.dispatch(state, Command::Open(t));
        }
    }

    pub fn apply_outcome(&mut self, state: &mut AppState, outcome: PollOutcome) {
        let PollOutcome { request, result } = outcome;
        let now = now_epoch();

        if is_stale(&self.store, &request.address, true) {
            debug!("discarding stale poll for {}", request.address);
            if state.inbox_of.is_none() {
                state.checking = false;
            }
            return;
        }

        match result {
            Ok(messages) => {
                let has_permission = notification_permission(self.store.storage());
                if let Err(e) = apply_inbox(
                    &mut self.store,
                    &mut self.seen,
                    &mut self.router,
                    &request.address,
                    &messages,
                    request.silent,
                    has_permission,
                    now,
                ) {
                    warn!("could not record inbox: {e}");
                }
                state.show_inbox(&request.address, messages);
            }
            Err(e) => {
                state.checking = false;
                if request.silent {
                    warn!("silent poll failed for {}: {e}", request.address);
                } else {
                    self.router.toast(format!("Could not check mail: {e}"), now);
                }
            }
        }
    }

    /// Shows a fetched message unless the user moved on while it loaded.
    pub fn apply_read(&mut self, state: &mut AppState, outcome: ReadOutcome) {
        let ReadOutcome { target, result } = outcome;
        if state.opening.as_ref() != Some(&target) || !self.store.contains(&target.address) {
            debug!("discarding stale read of {target}");
            return;
        }
        state.opening = None;

        match result {
            Ok(message) => {
                if state.inbox_of.is_none() {
                    state.inbox_of = Some(target.address.clone());
                }
                if let Some(pos) = state.messages.iter().position(|m| m.id == message.id) {
                    state.inbox.select(Some(pos));
                }
                state.open_message(message);
            }
            Err(e) => self
                .router
                .toast(format!("Could not open message: {e}"), now_epoch()),
        }
    }
}
