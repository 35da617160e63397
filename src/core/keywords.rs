//! Keyword tables used to classify plays by their type tag and text.
//!
//! Matching is case-insensitive substring matching over the play type and
//! description together (see [`Event::searchable_text`]).

use serde::{Deserialize, Serialize};

use crate::schema::event::Event;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordTables {
    /// Plays that may never trigger a soft boundary on their own.
    pub non_boundary: Vec<String>,
    pub stoppage: Vec<String>,
    /// Subset of stoppages reported as reviews.
    pub review: Vec<String>,
    pub high_impact: Vec<String>,
    pub turnover: Vec<String>,
    pub foul: Vec<String>,
    pub free_throw: Vec<String>,
}

fn table(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

impl Default for KeywordTables {
    fn default() -> Self {
        Self {
            non_boundary: table(&[
                "made shot",
                "missed shot",
                "rebound",
                "free throw",
                "foul",
                "substitution",
            ]),
            stoppage: table(&["timeout", "review", "challenge", "replay", "ejection"]),
            review: table(&["review", "challenge", "replay"]),
            high_impact: table(&["ejection", "ejected", "flagrant", "technical", "injury"]),
            turnover: table(&["turnover", "steal", "bad pass", "lost ball", "traveling"]),
            foul: table(&["foul"]),
            free_throw: table(&["free throw"]),
        }
    }
}

/// Classification of one event against every table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayTraits {
    pub non_boundary: bool,
    pub stoppage: bool,
    pub review: bool,
    pub high_impact: bool,
    pub turnover: bool,
    pub foul: bool,
    pub free_throw: bool,
}

impl KeywordTables {
    pub fn classify(&self, event: &Event) -> PlayTraits {
        let text = event.searchable_text();
        let hit = |words: &[String]| words.iter().any(|w| text.contains(&w.to_lowercase()));
        PlayTraits {
            non_boundary: hit(&self.non_boundary),
            stoppage: hit(&self.stoppage),
            review: hit(&self.review),
            high_impact: hit(&self.high_impact),
            turnover: hit(&self.turnover),
            foul: hit(&self.foul),
            free_throw: hit(&self.free_throw),
        }
    }

    pub fn classify_all(&self, events: &[Event]) -> Vec<PlayTraits> {
        events.iter().map(|e| self.classify(e)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::event::fixtures::*;

    #[test]
    fn matches_type_tag_case_insensitively() {
        let tables = KeywordTables::default();
        let traits = tables.classify(&typed(0, 1, 0, 0, "TIMEOUT"));
        assert!(traits.stoppage);
        assert!(!traits.review);
        assert!(!traits.non_boundary);
    }

    #[test]
    fn matches_description_substring() {
        let tables = KeywordTables::default();
        let mut event = play(0, 1, 0, 0);
        event.description = "Coach's Challenge: call overturned".to_string();
        let traits = tables.classify(&event);
        assert!(traits.stoppage);
        assert!(traits.review);
    }

    #[test]
    fn underscored_tags_match_spaced_keywords() {
        let tables = KeywordTables::default();
        let traits = tables.classify(&typed(0, 1, 2, 0, "made_shot"));
        assert!(traits.non_boundary);
        let traits = tables.classify(&typed(0, 1, 1, 0, "free_throw"));
        assert!(traits.free_throw);
        assert!(traits.non_boundary);
    }

    #[test]
    fn turnover_and_foul() {
        let tables = KeywordTables::default();
        assert!(tables.classify(&typed(0, 1, 0, 0, "turnover")).turnover);
        assert!(tables.classify(&typed(0, 1, 0, 0, "Shooting Foul")).foul);
        assert!(tables.classify(&typed(0, 1, 0, 0, "flagrant_foul")).high_impact);
    }

    #[test]
    fn custom_tables_replace_defaults() {
        let tables = KeywordTables {
            stoppage: vec!["TV break".to_string()],
            ..KeywordTables::default()
        };
        let mut event = play(0, 1, 0, 0);
        event.description = "Official TV Break".to_string();
        assert!(tables.classify(&event).stoppage);
        assert!(!tables.classify(&typed(1, 1, 0, 0, "timeout")).stoppage);
    }
}
