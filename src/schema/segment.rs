use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::event::{Event, EventIndex, Score};

/// Why a boundary fired. A closed set so precedence and coverage checks
/// are matched exhaustively.
///
/// Declaration order is the canonical sort order used in reason sets and
/// fingerprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    PeriodStart,
    OvertimeStart,
    GameEnd,
    Review,
    HighImpact,
    LeadChange,
    TieReached,
    TieBroken,
    TierUp,
    TierDown,
    RunStart,
    CrunchStart,
    AbsoluteMaxReached,
    SoftCapReached,
    ScoringPlay,
    Stoppage,
    PossessionChange,
    /// Extra split so a short game still fills the minimum block count.
    ForcedSplit,
}

/// Reporting precedence of a reason code. Lower level wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Precedence {
    Period = 1,
    Review = 2,
    LeadState = 3,
    Momentum = 4,
    Flow = 5,
}

impl ReasonCode {
    pub fn precedence(&self) -> Precedence {
        match self {
            Self::PeriodStart | Self::OvertimeStart | Self::GameEnd => Precedence::Period,
            Self::Review | Self::HighImpact => Precedence::Review,
            Self::LeadChange
            | Self::TieReached
            | Self::TieBroken
            | Self::TierUp
            | Self::TierDown => Precedence::LeadState,
            Self::RunStart | Self::CrunchStart => Precedence::Momentum,
            Self::AbsoluteMaxReached
            | Self::SoftCapReached
            | Self::ScoringPlay
            | Self::Stoppage
            | Self::PossessionChange
            | Self::ForcedSplit => Precedence::Flow,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PeriodStart => "PERIOD_START",
            Self::OvertimeStart => "OVERTIME_START",
            Self::GameEnd => "GAME_END",
            Self::Review => "REVIEW",
            Self::HighImpact => "HIGH_IMPACT",
            Self::LeadChange => "LEAD_CHANGE",
            Self::TieReached => "TIE_REACHED",
            Self::TieBroken => "TIE_BROKEN",
            Self::TierUp => "TIER_UP",
            Self::TierDown => "TIER_DOWN",
            Self::RunStart => "RUN_START",
            Self::CrunchStart => "CRUNCH_START",
            Self::AbsoluteMaxReached => "ABSOLUTE_MAX_REACHED",
            Self::SoftCapReached => "SOFT_CAP_REACHED",
            Self::ScoringPlay => "SCORING_PLAY",
            Self::Stoppage => "STOPPAGE",
            Self::PossessionChange => "POSSESSION_CHANGE",
            Self::ForcedSplit => "FORCED_SPLIT",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort, dedupe and drop every code below the highest precedence level
/// present.
pub fn resolve_precedence(codes: &[ReasonCode]) -> Vec<ReasonCode> {
    let Some(top) = codes.iter().map(ReasonCode::precedence).min() else {
        return Vec::new();
    };
    let mut kept: Vec<ReasonCode> = codes
        .iter()
        .copied()
        .filter(|c| c.precedence() == top)
        .collect();
    kept.sort();
    kept.dedup();
    kept
}

/// What the segment builder did with a candidate reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BoundaryAction {
    StartNew,
    Ignored,
    Collapsed,
}

/// Why an event was marked must-narrate. Declaration order is priority
/// order: truncation drops from the bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyEventReason {
    ScoringPlay,
    TurnoverToScore,
    FoulToPoints,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyEvent {
    pub index: EventIndex,
    pub reason: KeyEventReason,
}

/// Newtype wrapper for segment ids; ids are positions in the game's
/// segment list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentId(pub u32);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SegmentError {
    #[error("segment {0} has no events")]
    Empty(SegmentId),
    #[error("segment {id}: event {found} at offset {offset} should be {expected}")]
    NotContiguous {
        id: SegmentId,
        offset: usize,
        expected: EventIndex,
        found: EventIndex,
    },
    #[error("segment {0} has no key events")]
    NoKeyEvents(SegmentId),
    #[error("segment {id}: key event {index} is not inside the segment")]
    ForeignKeyEvent { id: SegmentId, index: EventIndex },
    #[error("segment construction invariant violated: {0}")]
    Invariant(String),
}

/// A contiguous run of events that reads as one unit of play.
///
/// Segments borrow the game's event slice; the events must outlive every
/// segment built over them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment<'a> {
    pub id: SegmentId,
    pub start_index: EventIndex,
    pub end_index: EventIndex,
    #[serde(skip)]
    pub events: &'a [Event],
    pub reason_codes: Vec<ReasonCode>,
    pub key_events: Vec<KeyEvent>,
    pub score_before: Score,
}

impl<'a> Segment<'a> {
    /// Validated constructor. Bounds come from the events themselves;
    /// reason codes are sorted and deduplicated, key events sorted by
    /// index.
    pub fn new(
        id: SegmentId,
        events: &'a [Event],
        reason_codes: Vec<ReasonCode>,
        mut key_events: Vec<KeyEvent>,
        score_before: Score,
    ) -> Result<Segment<'a>, SegmentError> {
        let (first, last) = match (events.first(), events.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(SegmentError::Empty(id)),
        };

        for (offset, event) in events.iter().enumerate() {
            let expected = EventIndex(first.index.0 + offset as u32);
            if event.index != expected {
                return Err(SegmentError::NotContiguous {
                    id,
                    offset,
                    expected,
                    found: event.index,
                });
            }
        }

        if key_events.is_empty() {
            return Err(SegmentError::NoKeyEvents(id));
        }
        if let Some(stray) = key_events
            .iter()
            .find(|k| k.index < first.index || k.index > last.index)
        {
            return Err(SegmentError::ForeignKeyEvent {
                id,
                index: stray.index,
            });
        }
        key_events.sort_by_key(|k| (k.index, k.reason));

        let mut reason_codes = reason_codes;
        reason_codes.sort();
        reason_codes.dedup();

        Ok(Segment {
            id,
            start_index: first.index,
            end_index: last.index,
            events,
            reason_codes,
            key_events,
            score_before,
        })
    }

    /// Raw constructor with no checks at all. Exists so validation code can
    /// be exercised against deliberately broken segments.
    pub fn new_unchecked(
        id: SegmentId,
        start_index: EventIndex,
        end_index: EventIndex,
        events: &'a [Event],
        reason_codes: Vec<ReasonCode>,
        key_events: Vec<KeyEvent>,
        score_before: Score,
    ) -> Segment<'a> {
        Segment {
            id,
            start_index,
            end_index,
            events,
            reason_codes,
            key_events,
            score_before,
        }
    }

    /// Declared span length, from the bounds rather than the slice.
    pub fn declared_len(&self) -> i64 {
        self.end_index.0 as i64 - self.start_index.0 as i64 + 1
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn contains(&self, index: EventIndex) -> bool {
        self.start_index <= index && index <= self.end_index
    }

    pub fn score_after(&self) -> Score {
        self.events.last().map(Event::score).unwrap_or(self.score_before)
    }

    pub fn period(&self) -> u8 {
        self.events.first().map(|e| e.period).unwrap_or(0)
    }

    pub fn key_event_ids(&self) -> Vec<EventIndex> {
        let mut ids: Vec<EventIndex> = self.key_events.iter().map(|k| k.index).collect();
        ids.dedup();
        ids
    }

    pub fn has_reason(&self, code: ReasonCode) -> bool {
        self.reason_codes.contains(&code)
    }

    pub fn event(&self, index: EventIndex) -> Option<&'a Event> {
        if !self.contains(index) {
            return None;
        }
        let offset = (index.0 - self.start_index.0) as usize;
        self.events.get(offset).filter(|e| e.index == index)
    }
}
