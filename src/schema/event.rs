use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Newtype wrapper for event indices. Unique and dense within one game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventIndex(pub u32);

impl EventIndex {
    pub fn next(self) -> EventIndex {
        EventIndex(self.0 + 1)
    }
}

impl fmt::Display for EventIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side of the scoreboard a team (or a lead) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TeamSide {
    Home,
    Away,
}

/// Coarse record kind. Only `Play` records are real plays; markers
/// (period start/end annotations and the like) ride along in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum EventKind {
    #[default]
    Play,
    Marker,
}

/// Game clock as delivered by the ingestion side: either already in
/// seconds remaining, or the provider's display text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GameClock {
    Seconds(f32),
    Text(String),
}

impl GameClock {
    /// Seconds remaining in the period, if the clock can be read.
    ///
    /// Accepts `"MM:SS"`, `"M:SS.s"` and bare `"SS.s"`.
    pub fn seconds_remaining(&self) -> Option<f32> {
        match self {
            Self::Seconds(s) => Some(*s),
            Self::Text(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return None;
                }
                match text.split_once(':') {
                    Some((minutes, seconds)) => {
                        let minutes: f32 = minutes.trim().parse().ok()?;
                        let seconds: f32 = seconds.trim().parse().ok()?;
                        Some(minutes * 60.0 + seconds)
                    }
                    None => text.parse().ok(),
                }
            }
        }
    }
}

impl Default for GameClock {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

/// A single play in the game timeline. Events are the sole input to the
/// segmentation pipeline and are never mutated by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub index: EventIndex,
    pub period: u8,
    #[serde(default)]
    pub clock: GameClock,
    pub home_score: u32,
    pub away_score: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub play_type: String,
    #[serde(default)]
    pub team: Option<TeamSide>,
    #[serde(default)]
    pub kind: EventKind,
}

impl Event {
    pub fn score(&self) -> Score {
        Score {
            home: self.home_score,
            away: self.away_score,
        }
    }

    /// Lowercased play type and description, with underscores and dashes
    /// folded to spaces, for keyword matching.
    pub fn searchable_text(&self) -> String {
        let mut text = String::with_capacity(self.play_type.len() + self.description.len() + 1);
        text.push_str(&self.play_type);
        text.push(' ');
        text.push_str(&self.description);
        text.to_lowercase().replace(['_', '-'], " ")
    }
}

/// A (home, away) score pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Score {
    pub home: u32,
    pub away: u32,
}

impl Score {
    pub fn new(home: u32, away: u32) -> Self {
        Self { home, away }
    }

    /// Points scored between `earlier` and `self`, per side. Saturates so a
    /// provider correction never underflows.
    pub fn delta_since(&self, earlier: Score) -> ScoreDelta {
        ScoreDelta {
            home: self.home.saturating_sub(earlier.home),
            away: self.away.saturating_sub(earlier.away),
        }
    }

    pub fn margin(&self) -> u32 {
        self.home.abs_diff(self.away)
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.home, self.away)
    }
}

/// Points scored by each side over some stretch of play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ScoreDelta {
    pub home: u32,
    pub away: u32,
}

impl ScoreDelta {
    pub fn total(&self) -> u32 {
        self.home + self.away
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum InputError {
    #[error("event stream is empty")]
    Empty,
    #[error("event stream contains no play events")]
    NoPlays,
    #[error("event index {current} does not follow {previous} (indices must strictly increase)")]
    NotIncreasing {
        previous: EventIndex,
        current: EventIndex,
    },
    #[error("event indices jump from {previous} to {current}; indices {previous}+1..{current} are missing")]
    IndexGap {
        previous: EventIndex,
        current: EventIndex,
    },
    #[error("period goes backwards at event {index}: {previous} -> {current}")]
    PeriodRegression {
        index: EventIndex,
        previous: u8,
        current: u8,
    },
    #[error("score goes backwards at event {index}: {previous} -> {current}")]
    ScoreRegression {
        index: EventIndex,
        previous: Score,
        current: Score,
    },
}

/// Check the ingestion contract before anything is built on top of the
/// stream.
pub fn validate_events(events: &[Event]) -> Result<(), InputError> {
    if events.is_empty() {
        return Err(InputError::Empty);
    }
    if !events.iter().any(|e| e.kind == EventKind::Play) {
        return Err(InputError::NoPlays);
    }

    for pair in events.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        if cur.index <= prev.index {
            return Err(InputError::NotIncreasing {
                previous: prev.index,
                current: cur.index,
            });
        }
        if cur.index != prev.index.next() {
            return Err(InputError::IndexGap {
                previous: prev.index,
                current: cur.index,
            });
        }
        if cur.period < prev.period {
            return Err(InputError::PeriodRegression {
                index: cur.index,
                previous: prev.period,
                current: cur.period,
            });
        }
        if cur.home_score < prev.home_score || cur.away_score < prev.away_score {
            return Err(InputError::ScoreRegression {
                index: cur.index,
                previous: prev.score(),
                current: cur.score(),
            });
        }
    }

    Ok(())
}
