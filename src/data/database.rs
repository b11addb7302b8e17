//! SQLite storage for match events

use crate::{Event, MatchId, Result};
use chrono::NaiveTime;
use rusqlite::{params, Connection};
use std::collections::{HashMap, HashSet};
use std::path::Path;

const TIME_FORMAT: &str = "%H:%M:%S%.f";

/// Database connection and operations
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                match_id INTEGER NOT NULL,
                team_name TEXT NOT NULL,
                player_id INTEGER,
                event_type TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                phase INTEGER,
                x_coord REAL,
                y_coord REAL,
                location_zone TEXT,
                description TEXT NOT NULL DEFAULT ''
            );

            CREATE INDEX IF NOT EXISTS idx_events_partition
                ON events(match_id, team_name, timestamp);
            CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type);
            "#,
        )?;
        Ok(())
    }

    // ==================== Event Operations ====================

    /// Insert an event and return its new id
    pub fn insert_event(&self, event: &Event) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO events (match_id, team_name, player_id, event_type, timestamp,
                                phase, x_coord, y_coord, location_zone, description)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                event.match_id.0,
                event.team_name,
                event.player_id,
                event.event_type,
                event.timestamp.format(TIME_FORMAT).to_string(),
                event.phase,
                event.x_coord,
                event.y_coord,
                event.location_zone,
                event.description,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Insert events in one transaction
    pub fn insert_events(&mut self, events: &[Event]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO events (match_id, team_name, player_id, event_type, timestamp,
                                    phase, x_coord, y_coord, location_zone, description)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
            )?;
            for event in events {
                stmt.execute(params![
                    event.match_id.0,
                    event.team_name,
                    event.player_id,
                    event.event_type,
                    event.timestamp.format(TIME_FORMAT).to_string(),
                    event.phase,
                    event.x_coord,
                    event.y_coord,
                    event.location_zone,
                    event.description,
                ])?;
            }
        }
        tx.commit()?;
        Ok(events.len())
    }

    /// Events matching the filter, in insertion order
    pub fn get_events(&self, filter: &EventFilter) -> Result<Vec<Event>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, match_id, team_name, player_id, event_type, timestamp,
                    phase, x_coord, y_coord, location_zone, description
             FROM events
             WHERE (?1 IS NULL OR match_id = ?1)
             ORDER BY id",
        )?;

        let rows = stmt
            .query_map(params![filter.match_id.map(|m| m.0)], Self::row_to_event)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            match row {
                Ok(event) => events.push(event),
                Err((id, raw)) => log::warn!("Skipping event {} with bad timestamp '{}'", id, raw),
            }
        }

        Ok(filter.apply(events))
    }

    /// All events in insertion order
    pub fn get_all_events(&self) -> Result<Vec<Event>> {
        self.get_events(&EventFilter::default())
    }

    fn row_to_event(
        row: &rusqlite::Row,
    ) -> rusqlite::Result<std::result::Result<Event, (i64, String)>> {
        let id: i64 = row.get(0)?;
        let raw_time: String = row.get(5)?;
        let Ok(timestamp) = NaiveTime::parse_from_str(&raw_time, TIME_FORMAT) else {
            return Ok(Err((id, raw_time)));
        };

        Ok(Ok(Event {
            id,
            match_id: MatchId(row.get(1)?),
            team_name: row.get(2)?,
            player_id: row.get(3)?,
            event_type: row.get(4)?,
            timestamp,
            phase: row.get(6)?,
            x_coord: row.get(7)?,
            y_coord: row.get(8)?,
            location_zone: row.get(9)?,
            description: row.get(10)?,
        }))
    }

    // ==================== Statistics ====================

    /// Get database statistics
    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let event_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;

        let match_count: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT match_id) FROM events",
            [],
            |row| row.get(0),
        )?;

        let team_count: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT team_name) FROM events",
            [],
            |row| row.get(0),
        )?;

        let try_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM events WHERE event_type = ?1",
            params![crate::SCORING_EVENT],
            |row| row.get(0),
        )?;

        Ok(DatabaseStats {
            event_count: event_count as usize,
            match_count: match_count as usize,
            team_count: team_count as usize,
            try_count: try_count as usize,
        })
    }
}

/// Database statistics
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub event_count: usize,
    pub match_count: usize,
    pub team_count: usize,
    pub try_count: usize,
}

/// Restricts which events feed analysis and training
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Keep only this team's events
    pub team: Option<String>,
    /// Keep only events of teams playing against this one
    pub opponent: Option<String>,
    pub match_id: Option<MatchId>,
    pub player_id: Option<i64>,
}

impl EventFilter {
    pub fn team(name: &str) -> Self {
        EventFilter {
            team: Some(name.to_string()),
            ..Default::default()
        }
    }

    pub fn player(player_id: i64) -> Self {
        EventFilter {
            player_id: Some(player_id),
            ..Default::default()
        }
    }

    /// Apply the filter, keeping the relative order of surviving events
    pub fn apply(&self, events: Vec<Event>) -> Vec<Event> {
        let opponent_matches: Option<HashSet<MatchId>> = self.opponent.as_ref().map(|opp| {
            events
                .iter()
                .filter(|e| &e.team_name == opp)
                .map(|e| e.match_id)
                .collect()
        });

        events
            .into_iter()
            .filter(|e| self.match_id.map_or(true, |m| e.match_id == m))
            .filter(|e| self.team.as_ref().map_or(true, |t| &e.team_name == t))
            .filter(|e| self.player_id.map_or(true, |p| e.player_id == Some(p)))
            .filter(|e| match (&self.opponent, &opponent_matches) {
                (Some(opp), Some(matches)) => {
                    &e.team_name != opp && matches.contains(&e.match_id)
                }
                _ => true,
            })
            .collect()
    }
}

/// Count events per type, most frequent first
pub fn event_type_counts(events: &[Event]) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for event in events {
        *counts.entry(event.event_type.as_str()).or_default() += 1;
    }
    let mut out: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(ty, n)| (ty.to_string(), n))
        .collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(sec: u32) -> NaiveTime {
        NaiveTime::from_num_seconds_from_midnight_opt(sec, 0).unwrap()
    }

    #[test]
    fn test_create_database() {
        let db = Database::in_memory().unwrap();
        let stats = db.get_stats().unwrap();
        assert_eq!(stats.event_count, 0);
        assert_eq!(stats.match_count, 0);
    }

    #[test]
    fn test_insert_and_read_back() {
        let db = Database::in_memory().unwrap();
        let mut event = Event::new(3, "Crusaders", "try", t(1234));
        event.x_coord = Some(98.5);
        event.location_zone = Some("in-goal".to_string());
        event.player_id = Some(11);

        let id = db.insert_event(&event).unwrap();
        let events = db.get_all_events().unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, id);
        assert_eq!(events[0].timestamp, t(1234));
        assert_eq!(events[0].x_coord, Some(98.5));
        assert_eq!(events[0].location_zone.as_deref(), Some("in-goal"));
        assert_eq!(events[0].player_id, Some(11));
    }

    #[test]
    fn test_bulk_insert_and_stats() {
        let mut db = Database::in_memory().unwrap();
        let events = vec![
            Event::new(1, "Blues", "pass", t(1)),
            Event::new(1, "Blues", "try", t(2)),
            Event::new(1, "Chiefs", "tackle", t(3)),
            Event::new(2, "Blues", "kick", t(1)),
        ];
        assert_eq!(db.insert_events(&events).unwrap(), 4);

        let stats = db.get_stats().unwrap();
        assert_eq!(stats.event_count, 4);
        assert_eq!(stats.match_count, 2);
        assert_eq!(stats.team_count, 2);
        assert_eq!(stats.try_count, 1);

        let match_one = db
            .get_events(&EventFilter {
                match_id: Some(MatchId(1)),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(match_one.len(), 3);
        let ids: Vec<i64> = match_one.iter().map(|e| e.id).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_team_and_opponent_filters() {
        let events = vec![
            Event::new(1, "Blues", "pass", t(1)),
            Event::new(1, "Chiefs", "tackle", t(2)),
            Event::new(2, "Hurricanes", "kick", t(1)),
            Event::new(2, "Brumbies", "run", t(2)),
        ];

        let blues = EventFilter::team("Blues").apply(events.clone());
        assert_eq!(blues.len(), 1);
        assert_eq!(blues[0].team_name, "Blues");

        let against_blues = EventFilter {
            opponent: Some("Blues".to_string()),
            ..Default::default()
        }
        .apply(events);
        assert_eq!(against_blues.len(), 1);
        assert_eq!(against_blues[0].team_name, "Chiefs");
    }

    #[test]
    fn test_player_filter() {
        let db = Database::in_memory().unwrap();
        let mut tackle = Event::new(1, "Blues", "tackle", t(1));
        tackle.player_id = Some(7);
        db.insert_event(&tackle).unwrap();
        db.insert_event(&Event::new(1, "Blues", "pass", t(2))).unwrap();

        let events = db.get_events(&EventFilter::player(7)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "tackle");
        assert!(db.get_events(&EventFilter::player(8)).unwrap().is_empty());
    }

    #[test]
    fn test_event_type_counts() {
        let events = vec![
            Event::new(1, "A", "pass", t(1)),
            Event::new(1, "A", "try", t(2)),
            Event::new(1, "A", "pass", t(3)),
        ];
        assert_eq!(
            event_type_counts(&events),
            vec![("pass".to_string(), 2), ("try".to_string(), 1)]
        );
    }
}
