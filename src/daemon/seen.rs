use std::collections::{HashMap, HashSet};

use crate::domain::email::MessageId;

/// Message ids already surfaced per address. In memory only, so a restart
/// starts from scratch.
#[derive(Debug, Default)]
pub struct SeenSet {
    /// Ids of the latest fetch, replaced wholesale on every delta.
    current: HashMap<String, HashSet<MessageId>>,
    /// Every id ever reported, so one that vanishes and comes back stays quiet.
    surfaced: HashMap<String, HashSet<MessageId>>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the ids not seen before (in fetch order) and replaces the
    /// recorded set with `fresh`.
    pub fn delta<I>(&mut self, address: &str, fresh: I) -> Vec<MessageId>
    where
        I: IntoIterator<Item = MessageId>,
    {
        let prior = self.current.remove(address).unwrap_or_default();
        let surfaced = self.surfaced.entry(address.to_string()).or_default();

        let mut current = HashSet::new();
        let mut new_ids = Vec::new();
        for id in fresh {
            if current.insert(id) && !prior.contains(&id) && surfaced.insert(id) {
                new_ids.push(id);
            }
        }
        self.current.insert(address.to_string(), current);
        new_ids
    }

    pub fn get(&self, address: &str) -> Option<&HashSet<MessageId>> {
        self.current.get(address)
    }

    pub fn forget(&mut self, address: &str) {
        self.current.remove(address);
        self.surfaced.remove(address);
    }

    pub fn clear(&mut self) {
        self.current.clear();
        self.surfaced.clear();
    }
}
