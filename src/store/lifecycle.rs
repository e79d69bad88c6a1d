//! Email lifecycle store: generated addresses, their expiry and inbox sizes.

use std::collections::BTreeSet;

use log::{debug, info, warn};

use crate::domain::email::{EmailEntry, EntryId, ExpirationPolicy, Remaining};
use crate::error::{DispenserError, Result};
use crate::mail::api::MailboxApi;
use crate::store::repo::LocalStorage;

const DEVICE_ID_KEY: &str = "dispenser.device_id";
const PERMISSION_KEY: &str = "dispenser.notify_permission";

/// Returns this device's storage identifier, creating it on first use.
pub fn device_id(storage: &dyn LocalStorage) -> Result<String> {
    if let Some(id) = storage.get_item(DEVICE_ID_KEY)?
        && !id.trim().is_empty()
    {
        return Ok(id);
    }
    let id = uuid::Uuid::new_v4().simple().to_string();
    storage.set_item(DEVICE_ID_KEY, &id)?;
    info!("created device id {id}");
    Ok(id)
}

pub fn entries_key(device_id: &str) -> String {
    format!("dispenser.emails.{device_id}")
}

/// Whether the user granted system notifications.
pub fn notification_permission(storage: &dyn LocalStorage) -> bool {
    matches!(storage.get_item(PERMISSION_KEY), Ok(Some(v)) if v == "granted")
}

pub fn set_notification_permission(storage: &dyn LocalStorage, granted: bool) -> Result<()> {
    storage.set_item(PERMISSION_KEY, if granted { "granted" } else { "denied" })
}

/// Pure countdown for an entry; negative means expired but not yet swept.
pub fn time_remaining(entry: &EmailEntry, now: i64) -> Remaining {
    match entry.expires_at {
        None => Remaining::Infinite,
        Some(exp) => Remaining::Seconds(exp - now),
    }
}

/// Owns the tracked addresses. Each mutation re-reads the persisted list,
/// applies its change and writes it back, so concurrent processes sharing the
/// database do not overwrite each other.
pub struct EmailStore<S: LocalStorage> {
    storage: S,
    key: String,
    entries: Vec<EmailEntry>,
    selected: Option<String>,
    /// Generated address still waiting for an expiration decision.
    current: Option<String>,
}

impl<S: LocalStorage> EmailStore<S> {
    /// Loads persisted entries. Corrupt or unreadable state resets to empty.
    pub fn restore(storage: S) -> Result<Self> {
        let key = entries_key(&device_id(&storage)?);
        let entries = match load_entries(&storage, &key) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("resetting stored entries ({}): {e}", e.code());
                Vec::new()
            }
        };
        debug!("restored {} entries from {key}", entries.len());
        Ok(Self {
            storage,
            key,
            entries,
            selected: None,
            current: None,
        })
    }

    /// Re-reads entries written by another process, keeping the selection.
    /// A failed read keeps what is already in memory.
    pub fn reload(&mut self) {
        match self.latest() {
            Ok(entries) => self.entries = entries,
            Err(e) => warn!("keeping cached entries ({}): {e}", e.code()),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn entries(&self) -> &[EmailEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, address: &str) -> Option<&EmailEntry> {
        self.entries.iter().find(|e| e.address == address)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.get(address).is_some()
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Selection may point at an address that is not (or no longer) tracked.
    pub fn select(&mut self, address: Option<String>) {
        self.selected = address;
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Requests a fresh address. Nothing is persisted until `commit`.
    pub fn generate(&mut self, api: &dyn MailboxApi) -> Result<String> {
        let address = api.gen_random_mailbox()?;
        self.current = Some(address.clone());
        self.selected = Some(address.clone());
        Ok(address)
    }

    pub fn commit(
        &mut self,
        address: &str,
        policy: ExpirationPolicy,
        now: i64,
    ) -> Result<EntryId> {
        let expires_at = policy.expires_at(now)?;
        self.mutate(|entries| {
            if entries.iter().any(|e| e.address == address) {
                return Err(DispenserError::DuplicateAddress(address.to_string()));
            }
            entries.push(EmailEntry {
                address: address.to_string(),
                created_at: now,
                expires_at,
                message_count: 0,
            });
            Ok(())
        })?;

        if self.current.as_deref() == Some(address) {
            self.current = None;
        }
        info!("committed {address} (expires_at={expires_at:?})");
        Ok(address.to_string())
    }

    /// Absent addresses are ignored: a poll may outlive its entry.
    pub fn record_message_count(&mut self, address: &str, count: u32) -> Result<()> {
        self.mutate(|entries| {
            match entries.iter_mut().find(|e| e.address == address) {
                Some(entry) => entry.message_count = count,
                None => debug!("ignoring message count for untracked {address}"),
            }
            Ok(())
        })
    }

    pub fn sweep_expired(&mut self, now: i64) -> Result<BTreeSet<String>> {
        let removed = self.mutate(|entries| {
            let mut removed = BTreeSet::new();
            entries.retain(|e| {
                if e.is_expired(now) {
                    removed.insert(e.address.clone());
                    false
                } else {
                    true
                }
            });
            Ok(removed)
        })?;
        if removed.is_empty() {
            return Ok(removed);
        }

        if let Some(sel) = &self.selected
            && removed.contains(sel)
        {
            self.selected = None;
        }
        info!("swept {} expired entries", removed.len());
        Ok(removed)
    }

    pub fn delete(&mut self, address: &str) -> Result<()> {
        self.mutate(|entries| {
            entries.retain(|e| e.address != address);
            Ok(())
        })?;
        if self.selected.as_deref() == Some(address) {
            self.selected = None;
        }
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        write_entries(&self.storage, &self.key, &[])?;
        self.entries.clear();
        self.selected = None;
        self.current = None;
        Ok(())
    }

    /// Entries as currently persisted. A corrupt blob reads as empty so the
    /// next write replaces it.
    fn latest(&self) -> Result<Vec<EmailEntry>> {
        match load_entries(&self.storage, &self.key) {
            Err(e @ DispenserError::StorageCorrupt(_)) => {
                warn!("resetting stored entries ({}): {e}", e.code());
                Ok(Vec::new())
            }
            other => other,
        }
    }

    /// Applies `change` to the persisted entries and writes them back. Memory
    /// is only updated once the write succeeded; an unchanged list is not
    /// written.
    fn mutate<T>(
        &mut self,
        change: impl FnOnce(&mut Vec<EmailEntry>) -> Result<T>,
    ) -> Result<T> {
        let latest = self.latest()?;
        let mut next = latest.clone();
        let out = change(&mut next)?;
        if next != latest {
            write_entries(&self.storage, &self.key, &next)?;
        }
        self.entries = next;
        Ok(out)
    }
}

fn load_entries(storage: &dyn LocalStorage, key: &str) -> Result<Vec<EmailEntry>> {
    let Some(raw) = storage.get_item(key)? else {
        return Ok(Vec::new());
    };
    let mut entries: Vec<EmailEntry> = serde_json::from_str(&raw)?;

    // keep the first occurrence if a hand-edited record repeats an address
    let mut seen = std::collections::HashSet::new();
    entries.retain(|e| seen.insert(e.address.clone()));
    Ok(entries)
}

fn write_entries(storage: &dyn LocalStorage, key: &str, entries: &[EmailEntry]) -> Result<()> {
    let json =
        serde_json::to_string(entries).map_err(|e| DispenserError::Storage(e.to_string()))?;
    storage.set_item(key, &json)
}
