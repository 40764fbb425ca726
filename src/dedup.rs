// src/dedup.rs
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::scan::Posting;

/// How the seen-set evolves between cycles.
///
/// `ReplaceEachCycle` tracks only the previous cycle's ids, so a posting that
/// drops off page one and later reappears is notified again. `Accumulate`
/// keeps every id for the process lifetime and suppresses reappearances, at
/// the cost of unbounded (in practice: small) growth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeenPolicy {
    #[default]
    ReplaceEachCycle,
    Accumulate,
}

/// Classifies scan results as new or already-seen.
///
/// Invariant: an id present in the seen-set never produces a second
/// notification unless the set is reset (process restart).
#[derive(Debug, Default)]
pub struct DeduplicationTracker {
    policy: SeenPolicy,
    seen: HashMap<String, DateTime<Utc>>,
}

impl DeduplicationTracker {
    pub fn new(policy: SeenPolicy) -> Self {
        Self {
            policy,
            seen: HashMap::new(),
        }
    }

    /// Split this cycle's scan results into the not-yet-seen postings and
    /// update the seen-set according to the configured policy.
    pub fn filter(&mut self, scanned: Vec<Posting>) -> Vec<Posting> {
        let now = Utc::now();
        let mut current: HashMap<String, DateTime<Utc>> = HashMap::new();
        let mut fresh = Vec::new();

        for posting in scanned {
            current.insert(posting.id.clone(), now);
            if !self.seen.contains_key(&posting.id) {
                fresh.push(posting);
            }
        }

        match self.policy {
            SeenPolicy::ReplaceEachCycle => {
                self.seen = current;
            }
            SeenPolicy::Accumulate => {
                self.seen.extend(current);
            }
        }
        fresh
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}
