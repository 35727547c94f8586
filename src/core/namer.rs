//! Collision-safe parameter identifiers
//!
//! Test programs often repeat an item name (two `VTH` measurements under
//! different conditions, say). Each occurrence gets a distinct id: the first
//! keeps the bare name, later ones get a numeric suffix starting at 2.
//!
//! A namer belongs to exactly one lot. Sharing one across lots would suffix
//! names that never actually collided.

use std::collections::HashMap;

/// Assigns unique ids from display names, counting occurrences per name
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
pub struct UniqueNamer {
    /// Times each base name has been requested
    counts: HashMap<String, u32>,
}

impl UniqueNamer {
    /// Create an empty namer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a namer that already knows the given ids
    ///
    /// Used when ids were established elsewhere (for example derived
    /// parameters) and new names must not collide with them.
    pub fn with_existing<'a>(ids: impl IntoIterator<Item = &'a str>) -> Self {
        let mut namer = Self::new();
        for id in ids {
            namer.counts.entry(id.to_string()).or_insert(1);
        }
        namer
    }

    /// Return a unique id for `name`
    ///
    /// Names are trimmed first. The n-th request for the same name returns
    /// `name` followed by `n` (the first request returns `name` itself). If
    /// a suffixed form is already taken, the suffix keeps increasing.
    pub fn name(&mut self, name: &str) -> String {
        let base = name.trim().to_string();
        let count = self.counts.entry(base.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            return base;
        }

        let mut suffix = *count;
        loop {
            let candidate = format!("{}{}", base, suffix);
            if !self.counts.contains_key(&candidate) {
                self.counts.insert(candidate.clone(), 1);
                if let Some(count) = self.counts.get_mut(&base) {
                    *count = suffix;
                }
                return candidate;
            }
            suffix += 1;
        }
    }

    /// Whether `id` has been handed out (or registered) already
    pub fn contains(&self, id: &str) -> bool {
        self.counts.contains_key(id)
    }

    /// Number of distinct names seen
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Check if nothing has been named yet
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Forget every name
    pub fn clear(&mut self) {
        self.counts.clear();
    }
}
