//! Sliding-window extraction over per-team event streams
//!
//! Each (match, team) partition is ordered by timestamp and cut into
//! overlapping windows of `maxlen` event codes. A window is labelled 1 when
//! the event right after it is a try.

use std::collections::HashMap;

use crate::features::EventVocabulary;
use crate::{Event, MatchId, Result, TrylineError, SCORING_EVENT};

/// One team's chronological events within one match
#[derive(Debug, Clone)]
pub struct Partition<'a> {
    pub match_id: MatchId,
    pub team_name: &'a str,
    pub events: Vec<&'a Event>,
}

impl Partition<'_> {
    pub fn event_types(&self) -> Vec<&str> {
        self.events.iter().map(|e| e.event_type.as_str()).collect()
    }
}

/// Group events by (match, team) in first-seen order and sort each group by
/// timestamp. The sort is stable, so equal timestamps keep log order.
pub fn partition_events(events: &[Event]) -> Vec<Partition<'_>> {
    let mut index: HashMap<(MatchId, &str), usize> = HashMap::new();
    let mut partitions: Vec<Partition<'_>> = Vec::new();

    for event in events {
        let key = (event.match_id, event.team_name.as_str());
        let slot = *index.entry(key).or_insert_with(|| {
            partitions.push(Partition {
                match_id: event.match_id,
                team_name: event.team_name.as_str(),
                events: Vec::new(),
            });
            partitions.len() - 1
        });
        partitions[slot].events.push(event);
    }

    for partition in &mut partitions {
        partition.events.sort_by_key(|e| e.timestamp);
    }

    partitions
}

/// Encoded windows with parallel labels and source matches
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedWindows {
    pub windows: Vec<Vec<u32>>,
    pub labels: Vec<u8>,
    pub match_ids: Vec<MatchId>,
}

impl ExtractedWindows {
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Windows followed by a try
    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|&&l| l == 1).count()
    }
}

/// Produces fixed-length labelled windows from an event log
#[derive(Debug, Clone, Copy)]
pub struct SequenceExtractor {
    maxlen: usize,
}

impl SequenceExtractor {
    pub fn new(maxlen: usize) -> Result<Self> {
        if maxlen == 0 {
            return Err(TrylineError::InvalidInput(
                "window length must be at least 1".to_string(),
            ));
        }
        Ok(SequenceExtractor { maxlen })
    }

    pub fn maxlen(&self) -> usize {
        self.maxlen
    }

    /// Extract every window that has a following event.
    ///
    /// A partition of `k` events yields `k - maxlen` windows when
    /// `k > maxlen` and none otherwise. Overlapping windows share most of
    /// their events, so samples from one match are strongly correlated.
    pub fn extract(&self, events: &[Event], vocabulary: &EventVocabulary) -> ExtractedWindows {
        let mut out = ExtractedWindows::default();

        for partition in partition_events(events) {
            let types = partition.event_types();
            if types.len() <= self.maxlen {
                continue;
            }
            let codes = vocabulary.encode_sequence(types.as_slice());

            for start in 0..types.len() - self.maxlen {
                let next = types[start + self.maxlen];
                out.windows.push(codes[start..start + self.maxlen].to_vec());
                out.labels.push(u8::from(next == SCORING_EVENT));
                out.match_ids.push(partition.match_id);
            }
        }

        log::debug!(
            "Extracted {} windows ({} followed by a try) with maxlen {}",
            out.len(),
            out.positives(),
            self.maxlen
        );

        out
    }
}

/// Fit an encoded sequence to exactly `maxlen` codes.
///
/// Shorter sequences are left-padded with the unknown/pad code; longer ones
/// keep only the most recent `maxlen` codes.
pub fn pad_window(codes: &[u32], maxlen: usize) -> Vec<u32> {
    if codes.len() >= maxlen {
        return codes[codes.len() - maxlen..].to_vec();
    }
    let mut window = vec![EventVocabulary::UNKNOWN; maxlen - codes.len()];
    window.extend_from_slice(codes);
    window
}

/// Encode raw symbols and fit them to a `maxlen` window
pub fn encode_window<S: AsRef<str>>(
    symbols: &[S],
    vocabulary: &EventVocabulary,
    maxlen: usize,
) -> Vec<u32> {
    pad_window(&vocabulary.encode_sequence(symbols), maxlen)
}

/// Per-position one-hot features: `maxlen * num_codes` floats
pub fn one_hot_features(window: &[u32], num_codes: usize) -> Vec<f32> {
    let mut features = vec![0.0f32; window.len() * num_codes];
    for (pos, &code) in window.iter().enumerate() {
        let code = code as usize;
        if code < num_codes {
            features[pos * num_codes + code] = 1.0;
        }
    }
    features
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn t(sec: u32) -> NaiveTime {
        NaiveTime::from_num_seconds_from_midnight_opt(sec, 0).unwrap()
    }

    fn events(match_id: i64, team: &str, types: &[&str]) -> Vec<Event> {
        types
            .iter()
            .enumerate()
            .map(|(i, ty)| Event::new(match_id, team, ty, t(i as u32 * 10)))
            .collect()
    }

    #[test]
    fn test_single_window_before_try() {
        let vocab = EventVocabulary::rugby();
        let log = events(1, "Lions", &["pass", "tackle", "try"]);
        let out = SequenceExtractor::new(2).unwrap().extract(&log, &vocab);

        assert_eq!(out.len(), 1);
        assert_eq!(out.windows[0], vec![vocab.encode("pass"), vocab.encode("tackle")]);
        assert_eq!(out.labels, vec![1]);
        assert_eq!(out.match_ids, vec![MatchId(1)]);
    }

    #[test]
    fn test_short_partitions_yield_nothing() {
        let vocab = EventVocabulary::rugby();
        let extractor = SequenceExtractor::new(3).unwrap();
        assert!(extractor.extract(&events(1, "A", &["pass", "run", "try"]), &vocab).is_empty());
        assert!(extractor.extract(&[], &vocab).is_empty());
    }

    #[test]
    fn test_window_count_is_k_minus_maxlen() {
        let vocab = EventVocabulary::rugby();
        let types = ["kickoff", "carry", "ruck", "pass", "run", "tackle", "ruck", "try", "conversion"];
        let log = events(7, "Sharks", &types);
        for maxlen in 1..types.len() {
            let out = SequenceExtractor::new(maxlen).unwrap().extract(&log, &vocab);
            assert_eq!(out.len(), types.len() - maxlen);
            assert!(out.windows.iter().all(|w| w.len() == maxlen));
            assert!(out.labels.iter().all(|&l| l <= 1));
        }
    }

    #[test]
    fn test_partitions_by_match_and_team() {
        let vocab = EventVocabulary::rugby();
        let mut log = events(1, "A", &["pass", "run"]);
        log.extend(events(1, "B", &["tackle", "try"]));
        log.extend(events(2, "A", &["kick", "try"]));

        let out = SequenceExtractor::new(1).unwrap().extract(&log, &vocab);
        assert_eq!(out.len(), 3);
        // a window never crosses teams: "run" is A's last event, "tackle" belongs to B
        assert_eq!(out.labels, vec![0, 1, 1]);
        assert_eq!(out.match_ids, vec![MatchId(1), MatchId(1), MatchId(2)]);
    }

    #[test]
    fn test_events_sorted_by_timestamp_stably() {
        let mut log = vec![
            Event::new(1, "A", "try", t(30)),
            Event::new(1, "A", "pass", t(10)),
            Event::new(1, "A", "run", t(20)),
            Event::new(1, "A", "carry", t(20)),
        ];
        let partitions = partition_events(&log);
        assert_eq!(partitions.len(), 1);
        assert_eq!(partitions[0].event_types(), vec!["pass", "run", "carry", "try"]);
    }

    #[test]
    fn test_padding_and_truncation() {
        let vocab = EventVocabulary::new("test", &["try", "kick", "pass"]).unwrap();
        assert_eq!(encode_window(&["kick", "pass"], &vocab, 3), vec![0, 2, 3]);
        assert_eq!(encode_window(&["kick", "pass", "try", "kick"], &vocab, 3), vec![3, 1, 2]);
        assert_eq!(encode_window::<&str>(&[], &vocab, 3), vec![0, 0, 0]);
        assert_eq!(encode_window(&["kick", "pass", "try"], &vocab, 3), vec![2, 3, 1]);
    }

    #[test]
    fn test_one_hot_layout() {
        let features = one_hot_features(&[0, 2], 3);
        assert_eq!(features, vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
    }
}
