use ratatui::widgets::ListState;

use crate::domain::email::{ExpirationPolicy, Message, MessageSummary, OpenTarget, TimeUnit};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    History,
    Inbox,
    Message,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PolicyChoice {
    Preset(f64),
    Never,
    Custom,
}

/// Modal for picking how long a freshly generated address lives.
#[derive(Debug, Clone)]
pub struct PolicyDialog {
    pub address: String,
    pub choices: Vec<PolicyChoice>,
    pub index: usize,
    pub custom_input: String,
    pub unit: TimeUnit,
    pub error: Option<String>,
}

impl PolicyDialog {
    pub fn new(address: String) -> Self {
        let mut choices: Vec<PolicyChoice> = ExpirationPolicy::PRESET_HOURS
            .iter()
            .map(|h| PolicyChoice::Preset(*h))
            .collect();
        choices.push(PolicyChoice::Never);
        choices.push(PolicyChoice::Custom);
        Self {
            address,
            choices,
            index: 0,
            custom_input: String::new(),
            unit: TimeUnit::Hours,
            error: None,
        }
    }

    pub fn choice(&self) -> PolicyChoice {
        self.choices[self.index]
    }

    pub fn move_choice(&mut self, delta: i32) {
        let len = self.choices.len() as i32;
        self.index = (self.index as i32 + delta).rem_euclid(len) as usize;
        self.error = None;
    }

    pub fn cycle_unit(&mut self, delta: i32) {
        let units = TimeUnit::ALL;
        let pos = units.iter().position(|u| *u == self.unit).unwrap_or(0) as i32;
        let next = (pos + delta).rem_euclid(units.len() as i32) as usize;
        self.unit = units[next];
    }

    pub fn push_char(&mut self, c: char) {
        if self.choice() == PolicyChoice::Custom && self.custom_input.len() < 12 {
            self.custom_input.push(c);
            self.error = None;
        }
    }

    pub fn pop_char(&mut self) {
        if self.choice() == PolicyChoice::Custom {
            self.custom_input.pop();
        }
    }

    pub fn policy(&self) -> Result<ExpirationPolicy> {
        match self.choice() {
            PolicyChoice::Preset(h) => Ok(ExpirationPolicy::Hours(h)),
            PolicyChoice::Never => Ok(ExpirationPolicy::Never),
            PolicyChoice::Custom => ExpirationPolicy::custom(&self.custom_input, self.unit),
        }
    }
}

pub struct AppState {
    pub history: ListState,

    /// Inbox of the address the messages belong to.
    pub inbox_of: Option<String>,
    pub messages: Vec<MessageSummary>,
    pub inbox: ListState,
    pub checking: bool,

    pub opened: Option<Message>,
    /// Message requested from the worker and not yet shown.
    pub opening: Option<OpenTarget>,
    pub body_scroll: u16,

    pub focus: Focus,
    pub dialog: Option<PolicyDialog>,
}

impl AppState {
    pub fn new() -> Self {
        let mut s = Self {
            history: ListState::default(),
            inbox_of: None,
            messages: vec![],
            inbox: ListState::default(),
            checking: false,
            opened: None,
            opening: None,
            body_scroll: 0,
            focus: Focus::History,
            dialog: None,
        };
        s.history.select(Some(0));
        s
    }

    pub fn move_history(&mut self, delta: i32, len: usize) {
        move_in(&mut self.history, delta, len);
    }

    pub fn move_inbox(&mut self, delta: i32) {
        move_in(&mut self.inbox, delta, self.messages.len());
    }

    pub fn clamp_history(&mut self, len: usize) {
        if len == 0 {
            self.history.select(None);
        } else {
            let cur = self.history.selected().unwrap_or(0);
            self.history.select(Some(cur.min(len - 1)));
        }
    }

    pub fn selected_message(&self) -> Option<&MessageSummary> {
        self.messages.get(self.inbox.selected()?)
    }

    pub fn show_inbox(&mut self, address: &str, messages: Vec<MessageSummary>) {
        if self.inbox_of.as_deref() != Some(address) {
            self.inbox.select(None);
        }
        self.inbox_of = Some(address.to_string());
        self.messages = messages;
        self.checking = false;
        if self.messages.is_empty() {
            self.inbox.select(None);
        } else if self.inbox.selected().is_none() {
            self.inbox.select(Some(0));
        } else {
            let cur = self.inbox.selected().unwrap_or(0);
            self.inbox.select(Some(cur.min(self.messages.len() - 1)));
        }
    }

    pub fn open_message(&mut self, message: Message) {
        self.opened = Some(message);
        self.body_scroll = 0;
        self.focus = Focus::Message;
    }

    pub fn close_message(&mut self) {
        self.opened = None;
        self.body_scroll = 0;
        self.focus = Focus::Inbox;
    }

    /// Clears the message panes, e.g. after their address was removed.
    pub fn reset_inbox(&mut self) {
        self.inbox_of = None;
        self.messages.clear();
        self.inbox.select(None);
        self.checking = false;
        self.opened = None;
        self.opening = None;
        self.body_scroll = 0;
        self.focus = Focus::History;
    }

    pub fn scroll_body(&mut self, delta: i32) {
        if delta < 0 {
            self.body_scroll = self.body_scroll.saturating_sub((-delta) as u16);
        } else {
            self.body_scroll = self.body_scroll.saturating_add(delta as u16);
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

fn move_in(list: &mut ListState, delta: i32, len: usize) {
    if len == 0 {
        list.select(None);
        return;
    }
    let cur = list.selected().unwrap_or(0) as i32;
    let next = (cur + delta).clamp(0, len as i32 - 1) as usize;
    list.select(Some(next));
}
