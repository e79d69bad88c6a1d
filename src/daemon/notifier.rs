//! Routes new-mail events to desktop notifications or in-app toasts.

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::Sender;

use log::{debug, warn};
use notify_rust::{Notification, Timeout};

use crate::domain::email::{MessageSummary, OpenTarget};
use crate::error::{DispenserError, Result};
use crate::mail::decoders::normalize_snippet;

pub type NotificationKey = u64;

/// Pending click targets are forgotten after this long.
pub const PENDING_TTL_SECS: i64 = 3600;
pub const TOAST_TTL_SECS: i64 = 5;
const MAX_TOASTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemNotification {
    pub title: String,
    pub body: String,
}

/// Notification backends, mockable in tests.
pub trait NotificationBackend {
    fn is_available(&self) -> bool;
    /// Shows a notification; a click must report `key` back to the owner.
    fn show(&self, key: NotificationKey, notification: &SystemNotification) -> Result<()>;
}

/// Desktop notifications via notify-rust. Clicks arrive on `clicks`.
pub struct DesktopBackend {
    clicks: Sender<NotificationKey>,
}

impl DesktopBackend {
    pub fn new(clicks: Sender<NotificationKey>) -> Self {
        Self { clicks }
    }
}

impl NotificationBackend for DesktopBackend {
    fn is_available(&self) -> bool {
        #[cfg(all(unix, not(target_os = "macos")))]
        {
            notify_rust::get_server_information().is_ok()
        }
        #[cfg(not(all(unix, not(target_os = "macos"))))]
        {
            true
        }
    }

    fn show(&self, key: NotificationKey, notification: &SystemNotification) -> Result<()> {
        let mut n = Notification::new();
        n.appname("Mail Dispenser")
            .summary(&notification.title)
            .body(&notification.body)
            .icon("mail-unread")
            .timeout(Timeout::Milliseconds(8000));

        #[cfg(all(unix, not(target_os = "macos")))]
        {
            // "default" is what most servers send when the body is clicked
            n.hint(notify_rust::Hint::Category("email".to_string()))
                .action("default", "Open")
                .action("open", "Open");
        }

        let handle = n
            .show()
            .map_err(|e| DispenserError::Notification(e.to_string()))?;

        #[cfg(all(unix, not(target_os = "macos")))]
        {
            let clicks = self.clicks.clone();
            std::thread::spawn(move || {
                handle.wait_for_action(|action| {
                    if action == "default" || action == "open" {
                        let _ = clicks.send(key);
                    }
                });
            });
        }
        #[cfg(not(all(unix, not(target_os = "macos"))))]
        {
            let _ = (handle, key);
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    System,
    Toast,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub text: String,
    pub shown_at: i64,
}

#[derive(Debug)]
struct Pending {
    target: OpenTarget,
    issued_at: i64,
}

/// Fire-and-forget delivery: nothing is retried.
pub struct NotificationRouter<B: NotificationBackend = DesktopBackend> {
    backend: B,
    pending: HashMap<NotificationKey, Pending>,
    next_key: NotificationKey,
    toasts: VecDeque<Toast>,
}

impl<B: NotificationBackend> NotificationRouter<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            pending: HashMap::new(),
            next_key: 1,
            toasts: VecDeque::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn notify(
        &mut self,
        address: &str,
        message: &MessageSummary,
        has_permission: bool,
        now: i64,
    ) -> Channel {
        if has_permission && self.backend.is_available() {
            let key = self.next_key;
            self.next_key += 1;
            let notification = SystemNotification {
                title: format!("New mail for {address}"),
                body: format!(
                    "{}: {}",
                    message.from,
                    normalize_snippet(&message.subject, 120)
                ),
            };
            match self.backend.show(key, &notification) {
                Ok(()) => {
                    self.pending.insert(
                        key,
                        Pending {
                            target: OpenTarget {
                                address: address.to_string(),
                                message_id: message.id,
                            },
                            issued_at: now,
                        },
                    );
                    return Channel::System;
                }
                Err(e) => warn!("falling back to toast: {e}"),
            }
        }

        self.toast(format!("New mail from {}", message.from), now);
        Channel::Toast
    }

    /// Consumes a click, returning what to open.
    pub fn resolve_click(&mut self, key: NotificationKey) -> Option<OpenTarget> {
        let target = self.pending.remove(&key).map(|p| p.target);
        if target.is_none() {
            debug!("click on forgotten notification {key}");
        }
        target
    }

    pub fn forget_stale(&mut self, now: i64) -> usize {
        let before = self.pending.len();
        self.pending
            .retain(|_, p| now - p.issued_at < PENDING_TTL_SECS);
        before - self.pending.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn toast(&mut self, text: impl Into<String>, now: i64) {
        self.toasts.push_back(Toast {
            text: text.into(),
            shown_at: now,
        });
        while self.toasts.len() > MAX_TOASTS {
            self.toasts.pop_front();
        }
    }

    /// Drops dismissed toasts and returns the ones still on screen.
    pub fn visible_toasts(&mut self, now: i64) -> impl Iterator<Item = &Toast> {
        self.toasts.retain(|t| now - t.shown_at < TOAST_TTL_SECS);
        self.toasts.iter()
    }

    pub fn drain_toasts(&mut self) -> Vec<Toast> {
        self.toasts.drain(..).collect()
    }
}

/// Emulators tried in order when none is configured, with the flags that
/// make each run the command that follows.
const TERMINALS: &[(&str, &[&str])] = &[
    ("x-terminal-emulator", &["-e"]),
    ("kitty", &[]),
    ("alacritty", &["-e"]),
    ("foot", &[]),
    ("wezterm", &["start", "--"]),
    ("gnome-terminal", &["--"]),
    ("konsole", &["-e"]),
    ("xterm", &["-e"]),
];

/// Program plus leading flags for one emulator. A configured value is taken
/// literally, so `"gnome-terminal --"` or `"wezterm start --"` work as written.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Launcher {
    program: String,
    flags: Vec<String>,
}

impl Launcher {
    fn parse(configured: &str) -> Option<Self> {
        let mut words = configured.split_whitespace().map(str::to_string);
        let program = words.next()?;
        Some(Self {
            program,
            flags: words.collect(),
        })
    }

    fn candidates(configured: Option<&str>) -> Vec<Self> {
        if let Some(l) = configured.and_then(Self::parse) {
            return vec![l];
        }
        TERMINALS
            .iter()
            .map(|(program, flags)| Self {
                program: program.to_string(),
                flags: flags.iter().map(|f| f.to_string()).collect(),
            })
            .collect()
    }
}

/// The command line that reopens the TUI on `target`.
fn tui_command(exe: &std::path::Path, target: &OpenTarget) -> Vec<String> {
    vec![
        exe.display().to_string(),
        "tui".into(),
        "--open".into(),
        target.to_string(),
    ]
}

/// Launches the TUI on `target` in a terminal emulator.
pub fn open_in_terminal(target: &OpenTarget, terminal: Option<&str>) -> anyhow::Result<()> {
    let command = tui_command(&std::env::current_exe()?, target);

    for launcher in Launcher::candidates(terminal) {
        match std::process::Command::new(&launcher.program)
            .args(&launcher.flags)
            .args(&command)
            .spawn()
        {
            Ok(_) => {
                debug!("opened {target} in {}", launcher.program);
                return Ok(());
            }
            Err(e) => debug!("{} unavailable: {e}", launcher.program),
        }
    }

    anyhow::bail!(
        "no terminal emulator could be started for {target}; set `terminal` in config.toml or MAIL_DISPENSER_TERMINAL"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_terminal_keeps_its_flags() {
        let l = Launcher::parse("  wezterm start -- ").expect("launcher");
        assert_eq!(l.program, "wezterm");
        assert_eq!(l.flags, vec!["start", "--"]);
        assert_eq!(Launcher::candidates(Some("foot")).len(), 1);
    }

    #[test]
    fn blank_terminal_falls_back_to_known_emulators() {
        assert!(Launcher::parse("   ").is_none());
        let all = Launcher::candidates(Some(" "));
        assert_eq!(all.len(), TERMINALS.len());
        assert_eq!(all[0].program, "x-terminal-emulator");
    }

    #[test]
    fn tui_command_reopens_the_target() {
        let target = OpenTarget {
            address: "a@x.com".into(),
            message_id: 7,
        };
        let cmd = tui_command(std::path::Path::new("/usr/bin/mail_dispenser"), &target);
        assert_eq!(cmd[..3], ["/usr/bin/mail_dispenser", "tui", "--open"]);
        assert_eq!(cmd[3], target.to_string());
    }
}
