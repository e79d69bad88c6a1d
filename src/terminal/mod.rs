pub mod events;
pub mod session;
pub mod state;
pub mod ui;

use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{self, Event, KeyEventKind};
use ratatui::DefaultTerminal;

use crate::daemon::notifier::{DesktopBackend, NotificationRouter, Toast};
use crate::daemon::schedule::{Schedule, now_epoch};
use crate::domain::email::OpenTarget;
use crate::mail::api::MailboxApi;
use crate::store::lifecycle::EmailStore;
use crate::store::sqlite::SqliteStorage;
use crate::terminal::events::{KeyOutcome, handle_key};
use crate::terminal::session::{Command, Session};
use crate::terminal::state::AppState;

pub fn run_tui(
    store: EmailStore<SqliteStorage>,
    api: Arc<dyn MailboxApi>,
    poll_interval_secs: u64,
    open: Option<OpenTarget>,
) -> Result<()> {
    let (click_tx, click_rx) = mpsc::channel();
    let router = NotificationRouter::new(DesktopBackend::new(click_tx));
    let mut session = Session::new(store, api, router).with_clicks(click_rx);
    let mut state = AppState::new();
    state.clamp_history(session.store.len());

    if let Some(target) = open {
        session.dispatch(&mut state, Command::Open(target));
    }

    let mut schedule = Schedule::standard(poll_interval_secs);
    schedule.start(Instant::now());

    let terminal = ratatui::init();
    let result = run(terminal, &mut session, &mut state, &mut schedule);
    ratatui::restore();

    schedule.stop();
    result
}

fn run(
    mut terminal: DefaultTerminal,
    session: &mut Session,
    state: &mut AppState,
    schedule: &mut Schedule,
) -> Result<()> {
    loop {
        for tick in schedule.due(Instant::now()) {
            session.on_tick(state, tick);
        }
        session.drain_events(state);

        let now = now_epoch();
        let toasts: Vec<Toast> = session.router.visible_toasts(now).cloned().collect();
        terminal.draw(|f| ui::render(f, state, &session.store, &toasts, now))?;

        let wait = schedule
            .until_next(Instant::now())
            .min(Duration::from_millis(250));
        if !event::poll(wait)? {
            continue;
        }
        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match handle_key(key, state, session.store.len()) {
                KeyOutcome::Quit => return Ok(()),
                KeyOutcome::Command(cmd) => session.dispatch(state, cmd),
                KeyOutcome::Handled => {}
            }
        }
    }
}
