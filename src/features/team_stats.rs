//! Per-match team statistics
//!
//! Event counts for one team in one match, the derived tackle success rate,
//! rule-based coaching suggestions, and the flat feature record consumed by
//! match-outcome classifiers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::features::windows::partition_events;
use crate::{Event, MatchId, Result, TrylineError};

/// Event counts for one team in one match
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TeamMatchStats {
    pub match_id: MatchId,
    pub team_name: String,
    pub tackles: u32,
    pub missed_tackles: u32,
    pub tries: u32,
    pub passes: u32,
    pub carries: u32,
    pub penalties: u32,
}

impl TeamMatchStats {
    /// Count events for every (match, team) in the log, in first-seen order
    pub fn from_events(events: &[Event]) -> Vec<Self> {
        partition_events(events)
            .into_iter()
            .map(|partition| {
                let mut stats = TeamMatchStats {
                    match_id: partition.match_id,
                    team_name: partition.team_name.to_string(),
                    ..Default::default()
                };
                for event in &partition.events {
                    stats.record(&event.event_type);
                }
                stats
            })
            .collect()
    }

    fn record(&mut self, event_type: &str) {
        match event_type {
            "tackle" => self.tackles += 1,
            "missed_tackle" => self.missed_tackles += 1,
            "try" => self.tries += 1,
            "pass" => self.passes += 1,
            "carry" => self.carries += 1,
            "penalty" => self.penalties += 1,
            _ => {}
        }
    }

    /// Made tackles over attempted tackles; `None` without any attempt
    pub fn tackle_success_rate(&self) -> Option<f32> {
        let attempts = self.tackles + self.missed_tackles;
        if attempts == 0 {
            None
        } else {
            Some(self.tackles as f32 / attempts as f32)
        }
    }

    /// Coaching suggestions triggered by this match's numbers
    pub fn suggestions(&self) -> Vec<&'static str> {
        let mut out = Vec::new();

        if self.missed_tackles > 5 {
            out.push("Too many missed tackles — improve defensive positioning.");
        }
        if let Some(rate) = self.tackle_success_rate() {
            if rate < 0.6 {
                out.push("Tackle success rate below 60% — focus on contact drills.");
            }
        }
        if self.penalties > 3 {
            out.push("High number of penalties — work on discipline in breakdown.");
        }
        if self.carries > 0 && (self.passes as f32 / self.carries as f32) < 0.8 {
            out.push("Low pass-to-carry ratio — consider better ball movement.");
        }

        out
    }
}

/// Input record for match-outcome classifiers.
///
/// Field names are fixed; building from a loose key/value map fails on
/// missing or unexpected keys instead of zero-filling them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchOutcomeFeatures {
    pub tackles: f32,
    pub missed_tackles: f32,
    pub passes: f32,
    pub tries: f32,
    pub penalties: f32,
}

impl MatchOutcomeFeatures {
    pub const FIELDS: [&'static str; 5] = ["tackles", "missed_tackles", "passes", "tries", "penalties"];

    pub fn from_stats(stats: &TeamMatchStats) -> Self {
        MatchOutcomeFeatures {
            tackles: stats.tackles as f32,
            missed_tackles: stats.missed_tackles as f32,
            passes: stats.passes as f32,
            tries: stats.tries as f32,
            penalties: stats.penalties as f32,
        }
    }

    /// Validate and build from a key/value map
    pub fn from_map(values: &HashMap<String, f32>) -> Result<Self> {
        let mut unknown: Vec<&str> = values
            .keys()
            .map(String::as_str)
            .filter(|k| !Self::FIELDS.iter().any(|f| f == k))
            .collect();
        if !unknown.is_empty() {
            unknown.sort_unstable();
            return Err(TrylineError::InvalidInput(format!(
                "unknown feature(s): {}",
                unknown.join(", ")
            )));
        }

        let get = |name: &str| {
            values
                .get(name)
                .copied()
                .ok_or_else(|| TrylineError::InvalidInput(format!("{} is required", name)))
        };

        Ok(MatchOutcomeFeatures {
            tackles: get("tackles")?,
            missed_tackles: get("missed_tackles")?,
            passes: get("passes")?,
            tries: get("tries")?,
            penalties: get("penalties")?,
        })
    }

    /// Values in `FIELDS` order
    pub fn to_vec(&self) -> Vec<f32> {
        vec![
            self.tackles,
            self.missed_tackles,
            self.passes,
            self.tries,
            self.penalties,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn ev(team: &str, ty: &str, sec: u32) -> Event {
        Event::new(1, team, ty, NaiveTime::from_num_seconds_from_midnight_opt(sec, 0).unwrap())
    }

    #[test]
    fn test_counts_per_team() {
        let log = vec![
            ev("A", "tackle", 1),
            ev("A", "missed_tackle", 2),
            ev("B", "pass", 3),
            ev("A", "tackle", 4),
            ev("B", "try", 5),
        ];
        let stats = TeamMatchStats::from_events(&log);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].team_name, "A");
        assert_eq!(stats[0].tackles, 2);
        assert_eq!(stats[0].missed_tackles, 1);
        assert_eq!(stats[1].tries, 1);
        assert_eq!(stats[1].passes, 1);
        assert!((stats[0].tackle_success_rate().unwrap() - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(stats[1].tackle_success_rate(), None);
    }

    #[test]
    fn test_suggestions() {
        let stats = TeamMatchStats {
            tackles: 5,
            missed_tackles: 6,
            penalties: 4,
            passes: 2,
            carries: 5,
            ..Default::default()
        };
        assert_eq!(
            stats.suggestions(),
            vec![
                "Too many missed tackles — improve defensive positioning.",
                "Tackle success rate below 60% — focus on contact drills.",
                "High number of penalties — work on discipline in breakdown.",
                "Low pass-to-carry ratio — consider better ball movement.",
            ]
        );
        assert!(TeamMatchStats::default().suggestions().is_empty());
    }

    #[test]
    fn test_outcome_features_schema() {
        let mut values: HashMap<String, f32> = MatchOutcomeFeatures::FIELDS
            .iter()
            .map(|f| (f.to_string(), 1.0))
            .collect();
        let features = MatchOutcomeFeatures::from_map(&values).unwrap();
        assert_eq!(features.to_vec(), vec![1.0; 5]);

        values.insert("scrums".to_string(), 2.0);
        assert!(matches!(
            MatchOutcomeFeatures::from_map(&values),
            Err(TrylineError::InvalidInput(msg)) if msg.contains("scrums")
        ));

        values.remove("scrums");
        values.remove("tries");
        assert!(MatchOutcomeFeatures::from_map(&values).is_err());
    }

    #[test]
    fn test_outcome_features_reject_unknown_json() {
        let json = r#"{"tackles":1,"missed_tackles":0,"passes":3,"tries":1,"penalties":0,"extra":1}"#;
        assert!(serde_json::from_str::<MatchOutcomeFeatures>(json).is_err());
    }
}
