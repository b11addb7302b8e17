//! Player-level descriptive statistics
//!
//! Per-player event totals and the per-match summary of team breakdowns and
//! most involved players.

use std::collections::HashMap;

use serde::Serialize;

use crate::data::database::event_type_counts;
use crate::{Event, MatchId};

/// Players listed in a match summary
pub const TOP_PLAYERS: usize = 5;

/// Event totals for one player
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlayerStats {
    pub player_id: i64,
    pub total_events: usize,
    pub tackles: usize,
    pub missed_tackles: usize,
    pub passes: usize,
    pub carries: usize,
    pub try_assists: usize,
    /// Count per event type, most frequent first
    pub event_breakdown: Vec<(String, usize)>,
}

impl PlayerStats {
    /// Summarise the events credited to `player_id`; other players' events are ignored
    pub fn from_events(player_id: i64, events: &[Event]) -> Self {
        let own: Vec<Event> = events
            .iter()
            .filter(|e| e.player_id == Some(player_id))
            .cloned()
            .collect();
        let count = |ty: &str| own.iter().filter(|e| e.event_type == ty).count();

        PlayerStats {
            player_id,
            total_events: own.len(),
            tackles: count("tackle"),
            missed_tackles: count("missed_tackle"),
            passes: count("pass"),
            carries: count("carry"),
            try_assists: count("try_assist"),
            event_breakdown: event_type_counts(&own),
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
}

/// Events of one team within a match
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamBreakdown {
    pub team_name: String,
    pub event_counts: Vec<(String, usize)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlayerInvolvement {
    pub player_id: i64,
    pub total: usize,
}

/// Per-team breakdown and most involved players of one match
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchSummary {
    pub match_id: MatchId,
    /// Teams in first-seen order
    pub teams: Vec<TeamBreakdown>,
    /// At most [`TOP_PLAYERS`], most events first; ties keep first-seen order
    pub top_players: Vec<PlayerInvolvement>,
}

impl MatchSummary {
    /// Summarise `match_id`; events from other matches are ignored.
    ///
    /// Events without a player count towards their team but not towards
    /// player involvement.
    pub fn from_events(match_id: MatchId, events: &[Event]) -> Self {
        let in_match: Vec<&Event> = events.iter().filter(|e| e.match_id == match_id).collect();

        let mut team_order: Vec<&str> = Vec::new();
        let mut by_team: HashMap<&str, Vec<Event>> = HashMap::new();
        for event in &in_match {
            let name = event.team_name.as_str();
            if !by_team.contains_key(name) {
                team_order.push(name);
            }
            by_team.entry(name).or_default().push((*event).clone());
        }
        let teams = team_order
            .iter()
            .map(|name| TeamBreakdown {
                team_name: name.to_string(),
                event_counts: by_team.get(name).map(|e| event_type_counts(e)).unwrap_or_default(),
            })
            .collect();

        let mut involvement: Vec<PlayerInvolvement> = Vec::new();
        let mut index: HashMap<i64, usize> = HashMap::new();
        for player_id in in_match.iter().filter_map(|e| e.player_id) {
            let slot = *index.entry(player_id).or_insert_with(|| {
                involvement.push(PlayerInvolvement { player_id, total: 0 });
                involvement.len() - 1
            });
            involvement[slot].total += 1;
        }
        // stable, so equal totals stay in first-seen order
        involvement.sort_by(|a, b| b.total.cmp(&a.total));
        involvement.truncate(TOP_PLAYERS);

        MatchSummary {
            match_id,
            teams,
            top_players: involvement,
        }
    }
}
