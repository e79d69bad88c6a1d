pub mod notifier;
pub mod poller;
pub mod schedule;
pub mod seen;

use anyhow::Result;
use log::{debug, info, warn};
use std::{
    sync::Arc,
    sync::atomic::{AtomicBool, Ordering},
    sync::mpsc,
    thread,
    time::{Duration, Instant},
};

use crate::daemon::notifier::{DesktopBackend, NotificationBackend, NotificationRouter};
use crate::daemon::poller::apply_inbox;
use crate::daemon::schedule::{Schedule, Tick, now_epoch};
use crate::daemon::seen::SeenSet;
use crate::mail::api::MailboxApi;
use crate::store::lifecycle::{EmailStore, notification_permission};
use crate::store::repo::LocalStorage;

pub struct DaemonConfig {
    pub poll_interval_secs: u64,
    pub terminal: Option<String>,
}

pub fn run_daemon<S: LocalStorage>(
    store: &mut EmailStore<S>,
    api: &dyn MailboxApi,
    cfg: DaemonConfig,
) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let r2 = running.clone();
    ctrlc::set_handler(move || {
        r2.store(false, Ordering::SeqCst);
    })?;

    let (click_tx, click_rx) = mpsc::channel();
    let mut router = NotificationRouter::new(DesktopBackend::new(click_tx));
    let mut seen = SeenSet::new();
    let mut schedule = Schedule::standard(cfg.poll_interval_secs);
    schedule.start(Instant::now());

    info!(
        "daemon started: {} entries, polling every {}s",
        store.len(),
        cfg.poll_interval_secs
    );

    while running.load(Ordering::SeqCst) {
        for tick in schedule.due(Instant::now()) {
            let now = now_epoch();
            match tick {
                Tick::Sweep => {
                    // the CLI may have committed or deleted since the last tick
                    store.reload();
                    match store.sweep_expired(now) {
                        Ok(removed) => removed.iter().for_each(|a| seen.forget(a)),
                        Err(e) => warn!("sweep failed: {e}"),
                    }
                }
                Tick::Poll => poll_all(store, api, &mut seen, &mut router, now),
                Tick::Forget => {
                    let n = router.forget_stale(now);
                    if n > 0 {
                        debug!("forgot {n} stale notifications");
                    }
                }
            }
        }

        while let Ok(key) = click_rx.try_recv() {
            if let Some(target) = router.resolve_click(key)
                && let Err(e) = notifier::open_in_terminal(&target, cfg.terminal.as_deref())
            {
                warn!("{e}");
            }
        }

        // no screen to show toasts on
        for toast in router.drain_toasts() {
            info!("{}", toast.text);
        }

        let wait = schedule.until_next(Instant::now());
        thread::sleep(wait.clamp(Duration::from_millis(50), Duration::from_millis(500)));
    }

    schedule.stop();
    info!("daemon stopped");
    Ok(())
}

fn poll_all<S: LocalStorage, B: NotificationBackend>(
    store: &mut EmailStore<S>,
    api: &dyn MailboxApi,
    seen: &mut SeenSet,
    router: &mut NotificationRouter<B>,
    now: i64,
) {
    let has_permission = notification_permission(store.storage());
    let addresses: Vec<String> = store.entries().iter().map(|e| e.address.clone()).collect();

    for address in addresses {
        match api.get_messages(&address) {
            Ok(messages) => {
                if let Err(e) = apply_inbox(
                    store,
                    seen,
                    router,
                    &address,
                    &messages,
                    true,
                    has_permission,
                    now,
                ) {
                    warn!("could not record inbox for {address}: {e}");
                }
            }
            Err(e) => warn!("poll failed for {address}: {e}"),
        }
    }
}
