use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::path::{Path, PathBuf};
use tracing::warn;

/// What is currently known about one expected file (or failed request).
#[derive(Debug, Clone, PartialEq)]
pub enum FileFact {
    Expected,
    /// Already on disk; not downloaded.
    Skipped(PathBuf),
    Downloaded(PathBuf),
    Failed(String),
}

impl FileFact {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FileFact::Expected)
    }

    /// Local path for files that ended up on disk.
    pub fn path(&self) -> Option<&Path> {
        match self {
            FileFact::Skipped(p) | FileFact::Downloaded(p) => Some(p),
            _ => None,
        }
    }
}

/// Tracks expected keys against their terminal outcomes.
///
/// Keys are only ever added. Each key leaves [`FileFact::Expected`] at most once; later marks
/// for the same key are ignored.
#[derive(Debug, Clone, Default)]
pub struct Results {
    facts: BTreeMap<String, FileFact>,
}

impl Results {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers keys as expected. Returns how many were new.
    pub fn register<I, S>(&mut self, keys: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut added = 0;
        for key in keys {
            if let Entry::Vacant(e) = self.facts.entry(key.into()) {
                e.insert(FileFact::Expected);
                added += 1;
            }
        }
        added
    }

    pub fn mark_downloaded(&mut self, key: &str, path: PathBuf) -> bool {
        self.settle(key, FileFact::Downloaded(path))
    }

    pub fn mark_skipped(&mut self, key: &str, path: PathBuf) -> bool {
        self.settle(key, FileFact::Skipped(path))
    }

    pub fn mark_failed(&mut self, key: &str, reason: impl Into<String>) -> bool {
        self.settle(key, FileFact::Failed(reason.into()))
    }

    // Unregistered keys are registered on the spot so the key count never shrinks.
    fn settle(&mut self, key: &str, fact: FileFact) -> bool {
        let slot = self
            .facts
            .entry(key.to_string())
            .or_insert(FileFact::Expected);
        if slot.is_terminal() {
            warn!(key, current = ?slot, ignored = ?fact, "key already settled");
            return false;
        }
        *slot = fact;
        true
    }

    pub fn is_complete(&self) -> bool {
        self.facts.values().all(FileFact::is_terminal)
    }

    pub fn get(&self, key: &str) -> Option<&FileFact> {
        self.facts.get(key)
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.facts.values().filter(|f| !f.is_terminal()).count()
    }

    pub fn expected_keys(&self) -> Vec<String> {
        self.facts
            .iter()
            .filter(|(_, f)| !f.is_terminal())
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FileFact)> {
        self.facts.iter().map(|(k, f)| (k.as_str(), f))
    }

    /// Local paths of downloaded and skipped files.
    pub fn paths(&self) -> Vec<&Path> {
        self.facts.values().filter_map(FileFact::path).collect()
    }

    /// Keys that failed, with their reasons.
    pub fn failures(&self) -> Vec<(&str, &str)> {
        self.facts
            .iter()
            .filter_map(|(k, f)| match f {
                FileFact::Failed(reason) => Some((k.as_str(), reason.as_str())),
                _ => None,
            })
            .collect()
    }
}
