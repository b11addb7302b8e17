//! Descriptive try statistics

use std::collections::HashMap;

use serde::Serialize;

use crate::Event;

/// Where and by whom tries were scored
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TryBreakdown {
    pub total: usize,
    /// (team, tries), most first
    pub by_team: Vec<(String, usize)>,
    /// (zone, tries), most first; tries without a zone are not counted
    pub by_zone: Vec<(String, usize)>,
    /// Coordinates of tries that recorded both x and y
    pub locations: Vec<(f32, f32)>,
}

impl TryBreakdown {
    pub fn from_events(events: &[Event]) -> Self {
        let mut by_team: HashMap<&str, usize> = HashMap::new();
        let mut by_zone: HashMap<&str, usize> = HashMap::new();
        let mut breakdown = TryBreakdown::default();

        for event in events.iter().filter(|e| e.is_try()) {
            breakdown.total += 1;
            *by_team.entry(event.team_name.as_str()).or_default() += 1;
            if let Some(zone) = event.location_zone.as_deref().filter(|z| !z.is_empty()) {
                *by_zone.entry(zone).or_default() += 1;
            }
            if let (Some(x), Some(y)) = (event.x_coord, event.y_coord) {
                breakdown.locations.push((x, y));
            }
        }

        breakdown.by_team = ranked(by_team);
        breakdown.by_zone = ranked(by_zone);
        breakdown
    }
}

fn ranked(counts: HashMap<&str, usize>) -> Vec<(String, usize)> {
    let mut out: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(name, count)| (name.to_string(), count))
        .collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    out
}
