//! Disposable-address dispenser backed by a temporary-mailbox REST API.
//!
//! Generated addresses are tracked with an expiration policy in a
//! device-local store, their inboxes are polled, and new mail is routed to
//! desktop notifications or in-app toasts.

pub mod config;
pub mod daemon;
pub mod domain;
pub mod error;
pub mod format;
pub mod mail;
pub mod store;
pub mod terminal;

pub use error::{DispenserError, Result};
