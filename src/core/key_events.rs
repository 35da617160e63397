//! Key-event selection: which plays in a segment must be narrated.

use thiserror::Error;

use crate::core::keywords::KeywordTables;
use crate::schema::event::{Event, EventIndex, Score};
use crate::schema::segment::{KeyEvent, KeyEventReason};

#[derive(Debug, Error, PartialEq)]
pub enum SelectionError {
    #[error("cannot select key events from an empty segment")]
    Empty,
    #[error("selected event {0} is not part of the segment")]
    ForeignIndex(EventIndex),
}

/// Applies the selection rules in priority order. Each rule only adds.
pub struct KeyEventSelector<'a> {
    keywords: &'a KeywordTables,
}

impl<'a> KeyEventSelector<'a> {
    pub fn new(keywords: &'a KeywordTables) -> Self {
        Self { keywords }
    }

    /// Select key events for one segment. `score_before` is the score
    /// immediately before the segment's first event.
    ///
    /// The result is sorted by event index, holds one entry per event and is
    /// never empty.
    pub fn select(
        &self,
        events: &[Event],
        score_before: Score,
    ) -> Result<Vec<KeyEvent>, SelectionError> {
        let last = events.last().ok_or(SelectionError::Empty)?;
        let traits = self.keywords.classify_all(events);
        let mut reasons: Vec<Option<KeyEventReason>> = vec![None; events.len()];

        // Scoring plays.
        let mut previous = score_before;
        for (i, event) in events.iter().enumerate() {
            if event.score() != previous {
                reasons[i] = Some(KeyEventReason::ScoringPlay);
            }
            previous = event.score();
        }
        let scoring: Vec<bool> = reasons.iter().map(Option::is_some).collect();

        // Turnovers converted on the very next play.
        for i in 0..events.len().saturating_sub(1) {
            if traits[i].turnover && scoring[i + 1] && reasons[i].is_none() {
                reasons[i] = Some(KeyEventReason::TurnoverToScore);
            }
        }

        // Fouls that led to points at the line.
        for i in 0..events.len() {
            if !traits[i].foul || traits[i].free_throw || reasons[i].is_some() {
                continue;
            }
            let converted = (i + 1..events.len())
                .take_while(|&k| traits[k].free_throw)
                .any(|k| scoring[k]);
            if converted {
                reasons[i] = Some(KeyEventReason::FoulToPoints);
            }
        }

        let mut selected: Vec<KeyEvent> = events
            .iter()
            .zip(&reasons)
            .filter_map(|(event, reason)| {
                reason.map(|reason| KeyEvent {
                    index: event.index,
                    reason,
                })
            })
            .collect();

        if selected.is_empty() {
            selected.push(KeyEvent {
                index: last.index,
                reason: KeyEventReason::Fallback,
            });
        }

        let first = events[0].index;
        if let Some(stray) = selected
            .iter()
            .find(|k| k.index < first || k.index > last.index)
        {
            return Err(SelectionError::ForeignIndex(stray.index));
        }

        Ok(selected)
    }
}

/// Keep at most `cap` selections, dropping the lowest-priority ones first
/// (later events first within a priority). The result is re-sorted by
/// index.
pub fn truncate_key_events(selected: &[KeyEvent], cap: usize) -> Vec<KeyEvent> {
    let mut ranked: Vec<KeyEvent> = selected.to_vec();
    ranked.sort_by_key(|k| (k.reason, k.index));
    ranked.truncate(cap);
    ranked.sort_by_key(|k| k.index);
    ranked
}
