//! Fingerprint index preventing duplicate admission
//!
//! The index only grows: a fingerprint stays recorded after its item completes,
//! which gives exactly-once admission per fingerprint for the life of a run.
//! The scheduler keeps it behind its lock, so check-then-insert is atomic.

use crate::item::Fingerprint;
use std::collections::HashSet;

/// Set of admitted fingerprints
#[derive(Debug, Clone)]
pub struct DedupIndex {
    fingerprints: HashSet<Fingerprint>,
    enabled: bool,
}

impl DedupIndex {
    /// Creates an index; a disabled index admits everything but still records
    pub fn new(enabled: bool) -> Self {
        Self {
            fingerprints: HashSet::new(),
            enabled,
        }
    }

    /// Returns true the first time `fingerprint` is seen, false afterwards
    ///
    /// When deduplication is disabled every call returns true.
    pub fn admit(&mut self, fingerprint: &Fingerprint) -> bool {
        let first = self.fingerprints.insert(fingerprint.clone());
        first || !self.enabled
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.fingerprints.contains(fingerprint)
    }

    /// Records fingerprints without admitting anything (used when restoring)
    pub fn extend<I>(&mut self, fingerprints: I)
    where
        I: IntoIterator<Item = Fingerprint>,
    {
        self.fingerprints.extend(fingerprints);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }

    /// All recorded fingerprints in sorted order
    pub fn sorted(&self) -> Vec<Fingerprint> {
        let mut all: Vec<Fingerprint> = self.fingerprints.iter().cloned().collect();
        all.sort();
        all
    }
}
