use crossterm::event::{KeyCode, KeyEvent};

use crate::terminal::session::Command;
use crate::terminal::state::{AppState, Focus};

pub enum KeyOutcome {
    Quit,
    Command(Command),
    Handled,
}

pub fn handle_key(key: KeyEvent, state: &mut AppState, history_len: usize) -> KeyOutcome {
    if state.dialog.is_some() {
        return handle_dialog_keys(key, state);
    }

    match key.code {
        KeyCode::Char('q') => return KeyOutcome::Quit,

        KeyCode::Esc => {
            return match state.focus {
                Focus::Message => {
                    state.close_message();
                    KeyOutcome::Handled
                }
                Focus::Inbox => {
                    state.focus = Focus::History;
                    KeyOutcome::Handled
                }
                Focus::History => KeyOutcome::Quit,
            };
        }

        KeyCode::Tab => {
            state.focus = match state.focus {
                Focus::History if state.inbox_of.is_some() => Focus::Inbox,
                Focus::Inbox if state.opened.is_some() => Focus::Message,
                _ => Focus::History,
            };
            return KeyOutcome::Handled;
        }

        KeyCode::Char('g') => return KeyOutcome::Command(Command::Generate),
        KeyCode::Char('c') => return KeyOutcome::Command(Command::CheckMail),
        KeyCode::Char('C') => return KeyOutcome::Command(Command::ClearAll),

        _ => {}
    }

    match state.focus {
        Focus::History => handle_history_keys(key, state, history_len),
        Focus::Inbox => handle_inbox_keys(key, state),
        Focus::Message => handle_message_keys(key, state),
    }
}

fn handle_dialog_keys(key: KeyEvent, state: &mut AppState) -> KeyOutcome {
    let Some(dialog) = state.dialog.as_mut() else {
        return KeyOutcome::Handled;
    };
    match key.code {
        KeyCode::Esc => return KeyOutcome::Command(Command::CancelDialog),
        KeyCode::Enter => return KeyOutcome::Command(Command::CommitPolicy),
        KeyCode::Down => dialog.move_choice(1),
        KeyCode::Up => dialog.move_choice(-1),
        KeyCode::Right => dialog.cycle_unit(1),
        KeyCode::Left => dialog.cycle_unit(-1),
        KeyCode::Backspace => dialog.pop_char(),
        KeyCode::Char(c) if c.is_ascii_digit() || c == '.' || c == '-' => dialog.push_char(c),
        _ => {}
    }
    KeyOutcome::Handled
}

fn handle_history_keys(key: KeyEvent, state: &mut AppState, len: usize) -> KeyOutcome {
    match key.code {
        KeyCode::Down | KeyCode::Char('j') => state.move_history(1, len),
        KeyCode::Up | KeyCode::Char('k') => state.move_history(-1, len),
        KeyCode::Enter => return KeyOutcome::Command(Command::SelectEntry),
        KeyCode::Char('d') | KeyCode::Delete => return KeyOutcome::Command(Command::DeleteEntry),
        _ => {}
    }
    KeyOutcome::Handled
}

fn handle_inbox_keys(key: KeyEvent, state: &mut AppState) -> KeyOutcome {
    match key.code {
        KeyCode::Down | KeyCode::Char('j') => state.move_inbox(1),
        KeyCode::Up | KeyCode::Char('k') => state.move_inbox(-1),
        KeyCode::Enter => return KeyOutcome::Command(Command::OpenMessage),
        _ => {}
    }
    KeyOutcome::Handled
}

fn handle_message_keys(key: KeyEvent, state: &mut AppState) -> KeyOutcome {
    match key.code {
        KeyCode::Down | KeyCode::Char('j') => state.scroll_body(1),
        KeyCode::Up | KeyCode::Char('k') => state.scroll_body(-1),
        KeyCode::PageDown => state.scroll_body(10),
        KeyCode::PageUp => state.scroll_body(-10),
        KeyCode::Home => state.body_scroll = 0,
        KeyCode::Char('o') => return KeyOutcome::Command(Command::OpenAttachment(0)),
        KeyCode::Char(c @ '1'..='9') => {
            let n = c as usize - '1' as usize;
            return KeyOutcome::Command(Command::OpenAttachment(n));
        }
        _ => {}
    }
    KeyOutcome::Handled
}
