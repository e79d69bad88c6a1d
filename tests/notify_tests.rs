use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use mail_dispenser::DispenserError;
use mail_dispenser::daemon::notifier::{
    Channel, NotificationBackend, NotificationKey, NotificationRouter, PENDING_TTL_SECS,
    SystemNotification, TOAST_TTL_SECS,
};
use mail_dispenser::daemon::seen::SeenSet;
use mail_dispenser::domain::email::{MessageSummary, OpenTarget};

const T0: i64 = 1_700_000_000;

#[derive(Debug, Clone)]
struct MockBackend {
    available: bool,
    fail: Arc<AtomicBool>,
    shown: Arc<Mutex<Vec<(NotificationKey, SystemNotification)>>>,
}

impl MockBackend {
    fn new(available: bool) -> Self {
        Self {
            available,
            fail: Arc::new(AtomicBool::new(false)),
            shown: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn shown(&self) -> Vec<(NotificationKey, SystemNotification)> {
        self.shown
            .lock()
            .map_or_else(|_| Vec::new(), |s| s.clone())
    }
}

impl NotificationBackend for MockBackend {
    fn is_available(&self) -> bool {
        self.available
    }

    fn show(
        &self,
        key: NotificationKey,
        notification: &SystemNotification,
    ) -> mail_dispenser::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DispenserError::Notification("daemon went away".into()));
        }
        self.shown
            .lock()
            .map_err(|_| DispenserError::Notification("lock poisoned".into()))?
            .push((key, notification.clone()));
        Ok(())
    }
}

fn msg(id: u64) -> MessageSummary {
    MessageSummary {
        id,
        from: "alice@example.com".into(),
        subject: format!("hello {id}"),
        date: "2024-01-01 10:00:00".into(),
    }
}

#[test]
fn test_seen_delta_replaces_wholesale() {
    let mut seen = SeenSet::new();
    seen.delta("a@x.com", [1, 2]);

    let new_ids = seen.delta("a@x.com", [2, 3, 4]);
    assert_eq!(new_ids, vec![3, 4]);

    let stored: Vec<u64> = {
        let mut v: Vec<u64> = seen.get("a@x.com").expect("set").iter().copied().collect();
        v.sort_unstable();
        v
    };
    assert_eq!(stored, vec![2, 3, 4]);
}

#[test]
fn test_seen_message_that_reappears_is_not_renotified() {
    let mut seen = SeenSet::new();
    assert_eq!(seen.delta("a@x.com", [1]), vec![1]);
    assert!(seen.delta("a@x.com", [1]).is_empty());
    assert_eq!(seen.delta("a@x.com", [2]), vec![2]);
    assert!(!seen.get("a@x.com").expect("set").contains(&1));

    assert!(seen.delta("a@x.com", [1, 2]).is_empty());
}

#[test]
fn test_seen_forget_resets_history() {
    let mut seen = SeenSet::new();
    seen.delta("a@x.com", [1]);
    seen.forget("a@x.com");
    assert_eq!(seen.delta("a@x.com", [1]), vec![1]);
}

#[test]
fn test_seen_is_per_address() {
    let mut seen = SeenSet::new();
    assert_eq!(seen.delta("a@x.com", [1, 2]), vec![1, 2]);
    assert_eq!(seen.delta("b@x.com", [1]), vec![1]);
    seen.forget("a@x.com");
    assert!(seen.get("a@x.com").is_none());
    assert!(seen.get("b@x.com").is_some());
}

#[test]
fn test_notify_with_permission_uses_system_channel() {
    let backend = MockBackend::new(true);
    let mut router = NotificationRouter::new(backend.clone());

    let channel = router.notify("a@x.com", &msg(7), true, T0);
    assert_eq!(channel, Channel::System);

    let shown = backend.shown();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].1.title, "New mail for a@x.com");
    assert_eq!(shown[0].1.body, "alice@example.com: hello 7");
    assert_eq!(router.visible_toasts(T0).count(), 0);

    let target = router.resolve_click(shown[0].0).expect("pending target");
    assert_eq!(
        target,
        OpenTarget {
            address: "a@x.com".into(),
            message_id: 7
        }
    );
    // clicking clears the pending state
    assert!(router.resolve_click(shown[0].0).is_none());
}

#[test]
fn test_notify_without_permission_toasts() {
    let backend = MockBackend::new(true);
    let mut router = NotificationRouter::new(backend.clone());

    assert_eq!(router.notify("a@x.com", &msg(1), false, T0), Channel::Toast);
    assert!(backend.shown().is_empty());
    assert_eq!(router.pending_len(), 0);

    let toasts: Vec<String> = router.visible_toasts(T0).map(|t| t.text.clone()).collect();
    assert_eq!(toasts, vec!["New mail from alice@example.com".to_string()]);
}

#[test]
fn test_notify_unavailable_backend_toasts() {
    let backend = MockBackend::new(false);
    let mut router = NotificationRouter::new(backend.clone());
    assert_eq!(router.notify("a@x.com", &msg(1), true, T0), Channel::Toast);
    assert!(backend.shown().is_empty());
}

#[test]
fn test_notify_falls_back_to_toast_on_failure() {
    let backend = MockBackend::new(true);
    backend.fail.store(true, Ordering::SeqCst);
    let mut router = NotificationRouter::new(backend);
    assert_eq!(router.notify("a@x.com", &msg(1), true, T0), Channel::Toast);
    assert_eq!(router.pending_len(), 0);
}

#[test]
fn test_toasts_auto_dismiss() {
    let mut router = NotificationRouter::new(MockBackend::new(false));
    router.toast("Could not check mail", T0);
    assert_eq!(router.visible_toasts(T0 + TOAST_TTL_SECS - 1).count(), 1);
    assert_eq!(router.visible_toasts(T0 + TOAST_TTL_SECS).count(), 0);
}

#[test]
fn test_forget_stale_pending() {
    let backend = MockBackend::new(true);
    let mut router = NotificationRouter::new(backend.clone());
    router.notify("a@x.com", &msg(1), true, T0);
    router.notify("a@x.com", &msg(2), true, T0 + 1800);

    assert_eq!(router.forget_stale(T0 + PENDING_TTL_SECS - 1), 0);
    assert_eq!(router.forget_stale(T0 + PENDING_TTL_SECS), 1);
    assert_eq!(router.pending_len(), 1);

    let first_key = backend.shown()[0].0;
    assert!(router.resolve_click(first_key).is_none());
}
