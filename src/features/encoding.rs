//! Event vocabulary and symbol encoding
//!
//! Codes are positional: the i-th symbol of the vocabulary encodes to `i + 1`
//! and every other string encodes to [`EventVocabulary::UNKNOWN`]. A model is
//! only meaningful against the exact vocabulary it was trained with, so the
//! vocabulary carries a version tag and a fingerprint of its symbol order.

use std::collections::HashMap;

use crate::{Result, TrylineError};

/// Rugby event types in code order
pub const RUGBY_EVENT_TYPES: [&str; 50] = [
    "try",
    "kick",
    "penalty",
    "kickoff",
    "pass",
    "carry",
    "run",
    "tackle",
    "missed_tackle",
    "ruck",
    "maul",
    "lineout",
    "lineout_win",
    "lineout_loss",
    "scrum",
    "scrum_win",
    "scrum_loss",
    "kick_return",
    "box_kick",
    "grubber_kick",
    "free_kick",
    "drop_goal",
    "conversion",
    "conversion_missed",
    "penalty_goal",
    "penalty_missed",
    "turnover",
    "knock_on",
    "forward_pass",
    "interception",
    "high_tackle",
    "offside",
    "not_releasing",
    "holding_on",
    "in_touch",
    "restart",
    "injury",
    "yellow_card",
    "red_card",
    "sin_bin",
    "substitution",
    "try_assist",
    "line_break",
    "defensive_line_break",
    "advantage",
    "offload",
    "foul_play",
    "referee_call",
    "timeout",
    "restart_22",
];

pub const RUGBY_VOCABULARY_VERSION: &str = "rugby-events-v1";

/// Immutable symbol <-> code mapping
#[derive(Debug, Clone)]
pub struct EventVocabulary {
    version: String,
    symbols: Vec<String>,
    codes: HashMap<String, u32>,
}

impl EventVocabulary {
    /// Code for symbols outside the vocabulary; doubles as the padding value
    pub const UNKNOWN: u32 = 0;

    /// Build a vocabulary from an ordered symbol list
    pub fn new<S: AsRef<str>>(version: &str, symbols: &[S]) -> Result<Self> {
        if symbols.is_empty() {
            return Err(TrylineError::InvalidInput(
                "vocabulary needs at least one symbol".to_string(),
            ));
        }

        let mut codes = HashMap::with_capacity(symbols.len());
        let mut owned = Vec::with_capacity(symbols.len());
        for (i, symbol) in symbols.iter().enumerate() {
            let symbol = symbol.as_ref();
            if symbol.is_empty() {
                return Err(TrylineError::InvalidInput(format!(
                    "vocabulary symbol at position {} is empty",
                    i
                )));
            }
            if codes.insert(symbol.to_string(), i as u32 + 1).is_some() {
                return Err(TrylineError::InvalidInput(format!(
                    "duplicate vocabulary symbol: {}",
                    symbol
                )));
            }
            owned.push(symbol.to_string());
        }

        Ok(EventVocabulary {
            version: version.to_string(),
            symbols: owned,
            codes,
        })
    }

    /// The standard rugby event vocabulary
    pub fn rugby() -> Self {
        let symbols = RUGBY_EVENT_TYPES.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let codes = symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), i as u32 + 1))
            .collect();
        EventVocabulary {
            version: RUGBY_VOCABULARY_VERSION.to_string(),
            symbols,
            codes,
        }
    }

    /// Encode one symbol. Total: never fails, unknown input maps to 0.
    pub fn encode(&self, symbol: &str) -> u32 {
        self.codes.get(symbol).copied().unwrap_or(Self::UNKNOWN)
    }

    /// Encode a sequence element-wise, preserving order and length
    pub fn encode_sequence<S: AsRef<str>>(&self, symbols: &[S]) -> Vec<u32> {
        symbols.iter().map(|s| self.encode(s.as_ref())).collect()
    }

    /// Reverse lookup for reporting; `None` for 0 and out-of-range codes
    pub fn decode(&self, code: u32) -> Option<&str> {
        if code == Self::UNKNOWN {
            return None;
        }
        self.symbols.get(code as usize - 1).map(String::as_str)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.codes.contains_key(symbol)
    }

    /// Number of known symbols
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Number of distinct codes including the unknown/pad code
    pub fn num_codes(&self) -> usize {
        self.symbols.len() + 1
    }

    /// Embedding table size for the sequence model
    pub fn embedding_size(&self) -> usize {
        self.symbols.len() + 2
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Digest of the ordered symbol list; changes on any reorder, rename or extension
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for symbol in &self.symbols {
            hasher.update(symbol.as_bytes());
            hasher.update(b"\n");
        }
        hasher.finalize().to_hex().to_string()
    }

    /// `version@fingerprint-prefix`, used in messages
    pub fn describe(&self) -> String {
        format!("{}@{}", self.version, &self.fingerprint()[..12])
    }
}

impl Default for EventVocabulary {
    fn default() -> Self {
        Self::rugby()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> EventVocabulary {
        EventVocabulary::new("test", &["try", "kick", "pass"]).unwrap()
    }

    #[test]
    fn test_codes_follow_list_order() {
        let vocab = small();
        assert_eq!(vocab.encode("try"), 1);
        assert_eq!(vocab.encode("kick"), 2);
        assert_eq!(vocab.encode("pass"), 3);
    }

    #[test]
    fn test_unknown_symbols_encode_to_zero() {
        let vocab = small();
        assert_eq!(vocab.encode("scrum"), 0);
        assert_eq!(vocab.encode(""), 0);
        assert_eq!(vocab.encode("TRY"), 0);
        assert_eq!(vocab.encode(" try"), 0);
    }

    #[test]
    fn test_encode_sequence_preserves_length() {
        let vocab = small();
        let codes = vocab.encode_sequence(&["pass", "bogus", "try", "pass"]);
        assert_eq!(codes, vec![3, 0, 1, 3]);
    }

    #[test]
    fn test_decode_roundtrip_for_every_known_symbol() {
        let vocab = EventVocabulary::rugby();
        for symbol in RUGBY_EVENT_TYPES {
            let code = vocab.encode(symbol);
            assert_ne!(code, EventVocabulary::UNKNOWN);
            assert_eq!(vocab.decode(code), Some(symbol));
        }
        assert_eq!(vocab.decode(0), None);
        assert_eq!(vocab.decode(51), None);
    }

    #[test]
    fn test_rugby_vocabulary_sizes() {
        let vocab = EventVocabulary::rugby();
        assert_eq!(vocab.len(), 50);
        assert_eq!(vocab.num_codes(), 51);
        assert_eq!(vocab.embedding_size(), 52);
        assert_eq!(vocab.encode("restart_22"), 50);
    }

    #[test]
    fn test_duplicates_rejected() {
        assert!(EventVocabulary::new("dup", &["try", "try"]).is_err());
        assert!(EventVocabulary::new::<&str>("empty", &[]).is_err());
        assert!(EventVocabulary::new("blank", &["try", ""]).is_err());
    }

    #[test]
    fn test_fingerprint_tracks_order() {
        let a = EventVocabulary::new("v", &["try", "kick"]).unwrap();
        let b = EventVocabulary::new("v", &["kick", "try"]).unwrap();
        let c = EventVocabulary::new("other", &["try", "kick"]).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), c.fingerprint());
        assert_eq!(
            EventVocabulary::rugby().fingerprint(),
            EventVocabulary::new(RUGBY_VOCABULARY_VERSION, &RUGBY_EVENT_TYPES)
                .unwrap()
                .fingerprint()
        );
    }
}
