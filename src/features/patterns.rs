//! Frequent event patterns before tries

use std::collections::HashMap;

use serde::Serialize;

use crate::features::windows::partition_events;
use crate::{Event, Result, TrylineError};

/// A distinct pattern with the number of tries it preceded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatternCount {
    pub pattern: Vec<String>,
    pub count: usize,
}

/// Counted patterns, ranked most frequent first.
///
/// Equal counts keep the order in which each pattern was first seen, so the
/// ranking never depends on hash iteration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatternCounts {
    ranked: Vec<PatternCount>,
    total_tries: usize,
}

impl PatternCounts {
    pub fn ranked(&self) -> &[PatternCount] {
        &self.ranked
    }

    pub fn most_common(&self, n: usize) -> &[PatternCount] {
        &self.ranked[..n.min(self.ranked.len())]
    }

    /// Count for an exact pattern, 0 if never seen
    pub fn count_of<S: AsRef<str>>(&self, pattern: &[S]) -> usize {
        self.ranked
            .iter()
            .find(|p| {
                p.pattern.len() == pattern.len()
                    && p.pattern.iter().zip(pattern).all(|(a, b)| a == b.as_ref())
            })
            .map(|p| p.count)
            .unwrap_or(0)
    }

    /// Number of tries examined
    pub fn total_tries(&self) -> usize {
        self.total_tries
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }
}

/// Mines the `n_events` events preceding each try
#[derive(Debug, Clone, Copy)]
pub struct PatternMiner {
    n_events: usize,
}

impl PatternMiner {
    pub fn new(n_events: usize) -> Result<Self> {
        if n_events == 0 {
            return Err(TrylineError::InvalidInput(
                "pattern length must be at least 1".to_string(),
            ));
        }
        Ok(PatternMiner { n_events })
    }

    /// Count antecedent patterns over the whole log.
    ///
    /// For every try, the events of the same match and team with a strictly
    /// earlier timestamp are taken in chronological order and the last
    /// `n_events` of them form the pattern. Tries near the start of a
    /// partition give shorter patterns; nothing is padded.
    pub fn mine(&self, events: &[Event]) -> PatternCounts {
        let mut partition_of: HashMap<(crate::MatchId, &str), usize> = HashMap::new();
        let partitions = partition_events(events);
        for (i, p) in partitions.iter().enumerate() {
            partition_of.insert((p.match_id, p.team_name), i);
        }

        let mut slots: HashMap<Vec<&str>, usize> = HashMap::new();
        let mut ranked: Vec<PatternCount> = Vec::new();
        let mut total_tries = 0;

        // Tries are visited in log order, which fixes first-seen order
        for try_event in events.iter().filter(|e| e.is_try()) {
            total_tries += 1;
            let Some(&idx) = partition_of.get(&(try_event.match_id, try_event.team_name.as_str()))
            else {
                continue;
            };
            let stream = &partitions[idx].events;
            let earlier = stream.partition_point(|e| e.timestamp < try_event.timestamp);
            let start = earlier.saturating_sub(self.n_events);
            let pattern: Vec<&str> = stream[start..earlier]
                .iter()
                .map(|e| e.event_type.as_str())
                .collect();

            match slots.get(&pattern) {
                Some(&slot) => ranked[slot].count += 1,
                None => {
                    slots.insert(pattern.clone(), ranked.len());
                    ranked.push(PatternCount {
                        pattern: pattern.into_iter().map(str::to_string).collect(),
                        count: 1,
                    });
                }
            }
        }

        // Stable sort keeps first-seen order among ties
        ranked.sort_by(|a, b| b.count.cmp(&a.count));

        log::debug!(
            "Mined {} distinct patterns from {} tries (n_events = {})",
            ranked.len(),
            total_tries,
            self.n_events
        );

        PatternCounts {
            ranked,
            total_tries,
        }
    }
}
