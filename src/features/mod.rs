//! Feature extraction and encoding
//!
//! Converts raw match events into model-ready windows and descriptive summaries.

pub mod encoding;
pub mod patterns;
pub mod player_stats;
pub mod team_stats;
pub mod try_stats;
pub mod windows;

pub use encoding::EventVocabulary;
pub use patterns::{PatternCount, PatternCounts, PatternMiner};
pub use player_stats::{MatchSummary, PlayerInvolvement, PlayerStats, TeamBreakdown};
pub use team_stats::{MatchOutcomeFeatures, TeamMatchStats};
pub use try_stats::TryBreakdown;
pub use windows::{encode_window, pad_window, ExtractedWindows, SequenceExtractor};
