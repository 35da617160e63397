//! Segment construction: walks the game once, asks the classifier at every
//! event, and closes segments where boundaries are honored.

use std::cmp::Reverse;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::audit::BoundaryAuditLog;
use crate::core::boundary::{BoundaryClassifier, BoundaryDecision, BoundaryStrength};
use crate::core::config::EngineConfig;
use crate::core::coverage::validate_segments;
use crate::core::key_events::{KeyEventSelector, SelectionError};
use crate::schema::event::{Event, Score};
use crate::schema::segment::{resolve_precedence, ReasonCode, Segment, SegmentError, SegmentId};

#[derive(Debug, Error, PartialEq)]
pub enum BuildError {
    #[error(transparent)]
    Segment(#[from] SegmentError),
    #[error(transparent)]
    Selection(#[from] SelectionError),
}

pub struct SegmentBuilder<'c> {
    config: &'c EngineConfig,
    min_segments: usize,
}

/// A segment start chosen during the walk, before events are attached.
struct OpenBoundary {
    position: usize,
    codes: Vec<ReasonCode>,
}

impl<'c> SegmentBuilder<'c> {
    pub fn new(config: &'c EngineConfig) -> Self {
        Self {
            config,
            min_segments: 1,
        }
    }

    /// Split the longest segments with FORCED_SPLIT until there are at
    /// least `count`, or nothing left is two events long.
    pub fn min_segments(mut self, count: usize) -> Self {
        self.min_segments = count;
        self
    }

    /// Partition `events` into contiguous segments.
    ///
    /// `events` must already satisfy the input contract. A coverage failure
    /// at the end is a construction defect and comes back as
    /// [`SegmentError::Invariant`].
    pub fn build<'e>(
        &self,
        events: &'e [Event],
        audit: Option<&mut BoundaryAuditLog>,
    ) -> Result<Vec<Segment<'e>>, BuildError> {
        if events.is_empty() {
            return Err(SegmentError::Invariant("no events to segment".into()).into());
        }

        let classifier = BoundaryClassifier::new(events, self.config);
        let mut boundaries = vec![OpenBoundary {
            position: 0,
            codes: vec![ReasonCode::PeriodStart],
        }];
        let mut open_start = 0;
        let mut decisions: Vec<(BoundaryDecision, bool)> = Vec::with_capacity(events.len());

        for position in 0..events.len() {
            let mut decision = classifier.classify(position, open_start);
            let mut demoted = false;
            if decision.strength == BoundaryStrength::Preferred
                && self.merges_forward(&classifier, open_start, position)
            {
                decision.demote();
                demoted = true;
            }

            // The classifier only collapses into the open segment's head.
            if decision.collapsed_into.is_some() {
                if let Some(open) = boundaries.last_mut() {
                    open.codes.extend(decision.collapsed_codes());
                }
            }

            if position > 0 && decision.starts_new() {
                boundaries.push(OpenBoundary {
                    position,
                    codes: decision.live_codes(),
                });
                open_start = position;
            }

            decisions.push((decision, demoted));
        }

        self.force_splits(&mut boundaries, &mut decisions);

        if let Some(log) = audit {
            let mut segment = 0;
            for (decision, demoted) in &decisions {
                while boundaries
                    .get(segment + 1)
                    .is_some_and(|b| b.position <= decision.position)
                {
                    segment += 1;
                }
                log.record(decision, SegmentId(segment as u32), *demoted);
            }
        }

        let selector = KeyEventSelector::new(&self.config.keywords);
        let mut segments = Vec::with_capacity(boundaries.len());
        for (k, boundary) in boundaries.iter().enumerate() {
            let end = boundaries
                .get(k + 1)
                .map(|next| next.position)
                .unwrap_or(events.len());
            let slice = &events[boundary.position..end];
            let score_before = if boundary.position == 0 {
                Score::default()
            } else {
                events[boundary.position - 1].score()
            };

            let mut codes = resolve_precedence(&boundary.codes);
            if end == events.len() {
                codes.push(ReasonCode::GameEnd);
            }
            let key_events = selector.select(slice, score_before)?;
            segments.push(Segment::new(
                SegmentId(k as u32),
                slice,
                codes,
                key_events,
                score_before,
            )?);
        }

        let report = validate_segments(&segments, Some(events), false);
        if !report.passed {
            return Err(SegmentError::Invariant(report.errors.join("; ")).into());
        }

        debug!(
            events = events.len(),
            segments = segments.len(),
            "segments built"
        );
        Ok(segments)
    }

    /// Raise the segment count to `min_segments`. Each pass splits the
    /// longest segment (earliest on ties) at the rejected or demoted
    /// candidate nearest its middle, or at the middle itself.
    fn force_splits(
        &self,
        boundaries: &mut Vec<OpenBoundary>,
        decisions: &mut [(BoundaryDecision, bool)],
    ) {
        let total = decisions.len();
        while boundaries.len() < self.min_segments {
            let longest = (0..boundaries.len())
                .map(|k| {
                    let start = boundaries[k].position;
                    let end = boundaries.get(k + 1).map(|b| b.position).unwrap_or(total);
                    (k, start, end)
                })
                .filter(|(_, start, end)| end - start >= 2)
                .max_by_key(|&(k, start, end)| (end - start, Reverse(k)));
            let Some((k, start, end)) = longest else {
                break;
            };

            let middle = start + (end - start) / 2;
            let at = (start + 1..end)
                .filter(|&p| !decisions[p].0.reasons.is_empty())
                .min_by_key(|&p| (p.abs_diff(middle), p))
                .unwrap_or(middle);

            decisions[at].0.force(ReasonCode::ForcedSplit);
            boundaries.insert(
                k + 1,
                OpenBoundary {
                    position: at,
                    codes: vec![ReasonCode::ForcedSplit],
                },
            );
            info!(position = at, segments = boundaries.len(), "forced segment split");
        }
    }

    /// A preferred boundary closing a short segment merges forward unless
    /// the short segment holds significant scoring or the boundary sits on
    /// a period line.
    fn merges_forward(
        &self,
        classifier: &BoundaryClassifier<'_>,
        open_start: usize,
        position: usize,
    ) -> bool {
        let boundary = &self.config.boundary;
        if position - open_start >= boundary.merge_min_events {
            return false;
        }
        let events = classifier.events();
        if events[position].period != events[open_start].period {
            return false;
        }

        let mut scoring_plays = 0;
        let mut points = 0;
        for p in open_start..position {
            if !classifier.is_scoring(p) {
                continue;
            }
            let before = if p == 0 {
                Score::default()
            } else {
                events[p - 1].score()
            };
            scoring_plays += 1;
            points += events[p].score().delta_since(before).total();
        }
        let significant =
            scoring_plays > boundary.merge_keep_scoring_events && points > boundary.merge_keep_points;
        !significant
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::event::fixtures::*;
    use crate::schema::event::EventIndex;

    fn build(events: &[Event]) -> Vec<Segment<'_>> {
        let config = EngineConfig::default();
        SegmentBuilder::new(&config).build(events, None).unwrap()
    }

    fn bounds(segments: &[Segment<'_>]) -> Vec<(u32, u32)> {
        segments
            .iter()
            .map(|s| (s.start_index.0, s.end_index.0))
            .collect()
    }

    #[test]
    fn single_event_game() {
        let events = quiet_run(1, 1);
        let segments = build(&events);
        assert_eq!(bounds(&segments), vec![(0, 0)]);
        assert_eq!(
            segments[0].reason_codes,
            vec![ReasonCode::PeriodStart, ReasonCode::GameEnd]
        );
    }

    #[test]
    fn soft_cap_partitions_quiet_game() {
        let events = quiet_run(120, 1);
        let segments = build(&events);
        assert_eq!(bounds(&segments), vec![(0, 29), (30, 59), (60, 89), (90, 119)]);
        assert_eq!(segments[1].reason_codes, vec![ReasonCode::SoftCapReached]);
    }

    #[test]
    fn absolute_max_at_fiftieth_event() {
        let events: Vec<Event> = (0..60).map(|i| typed(i, 1, 0, 0, "missed_shot")).collect();
        let segments = build(&events);
        assert_eq!(bounds(&segments), vec![(0, 49), (50, 59)]);
        assert_eq!(segments[0].len(), 50);
        assert!(segments[1].has_reason(ReasonCode::AbsoluteMaxReached));
        assert!(segments[1].has_reason(ReasonCode::GameEnd));
    }

    #[test]
    fn fifty_guarded_events_stay_whole() {
        let events: Vec<Event> = (0..50).map(|i| typed(i, 1, 0, 0, "missed_shot")).collect();
        let segments = build(&events);
        assert_eq!(bounds(&segments), vec![(0, 49)]);
        assert!(!segments[0].has_reason(ReasonCode::AbsoluteMaxReached));

        let events: Vec<Event> = (0..51).map(|i| typed(i, 1, 0, 0, "missed_shot")).collect();
        let segments = build(&events);
        assert_eq!(bounds(&segments), vec![(0, 49), (50, 50)]);
        assert!(segments[1].has_reason(ReasonCode::AbsoluteMaxReached));
    }

    #[test]
    fn period_lines_always_split() {
        let mut events = quiet_run(10, 1);
        for e in events.iter_mut().skip(4) {
            e.period = 2;
        }
        let segments = build(&events);
        assert_eq!(bounds(&segments), vec![(0, 3), (4, 9)]);
        assert_eq!(
            segments[1].reason_codes,
            vec![ReasonCode::PeriodStart, ReasonCode::GameEnd]
        );
    }

    #[test]
    fn short_stoppage_segment_merges_forward() {
        let mut events = quiet_run(20, 1);
        events[6] = typed(6, 1, 0, 0, "timeout");
        let config = EngineConfig::default();
        let mut log = BoundaryAuditLog::new();
        let segments = SegmentBuilder::new(&config)
            .build(&events, Some(&mut log))
            .unwrap();
        assert_eq!(bounds(&segments), vec![(0, 19)]);
        let entry = log
            .entries()
            .iter()
            .find(|e| e.index == EventIndex(6))
            .unwrap();
        assert!(entry.demoted);
    }

    #[test]
    fn short_segment_with_real_scoring_keeps_boundary() {
        let points = [(0, 0), (3, 0), (3, 3), (6, 3), (6, 3), (6, 3)];
        let mut events: Vec<Event> = points
            .iter()
            .enumerate()
            .map(|(i, (h, a))| play(i as u32, 1, *h, *a))
            .collect();
        for i in 6..20 {
            let mut e = play(i, 1, 6, 3);
            if i == 6 {
                e = typed(6, 1, 6, 3, "timeout");
            }
            events.push(e);
        }
        let segments = build(&events);
        assert_eq!(segments[1].start_index, EventIndex(6));
        assert_eq!(segments[1].reason_codes, vec![ReasonCode::GameEnd, ReasonCode::Stoppage]);
    }

    #[test]
    fn collapsed_review_folds_into_cluster_head() {
        let mut events = quiet_run(25, 1);
        events[10] = typed(10, 1, 0, 0, "timeout");
        events[12] = typed(12, 1, 0, 0, "review");
        let segments = build(&events);
        assert_eq!(bounds(&segments), vec![(0, 9), (10, 24)]);
        assert_eq!(segments[1].reason_codes, vec![ReasonCode::GameEnd, ReasonCode::Review]);
    }

    #[test]
    fn stoppage_codes_stay_with_their_own_segment() {
        let mut events: Vec<Event> = (0..30)
            .map(|i| if i < 11 { play(i, 1, 2, 0) } else { play(i, 1, 2, 4) })
            .collect();
        events[10] = typed(10, 1, 2, 0, "timeout");
        events[12] = typed(12, 1, 2, 4, "review");
        let segments = build(&events);
        assert_eq!(bounds(&segments), vec![(0, 9), (10, 10), (11, 29)]);
        assert_eq!(segments[1].reason_codes, vec![ReasonCode::Stoppage]);
        assert!(segments[2].has_reason(ReasonCode::LeadChange));
        assert!(!segments[2].has_reason(ReasonCode::Review));
    }

    #[test]
    fn short_game_is_split_to_the_minimum() {
        let events = quiet_run(24, 1);
        let config = EngineConfig::default();
        let segments = SegmentBuilder::new(&config)
            .min_segments(4)
            .build(&events, None)
            .unwrap();
        assert_eq!(bounds(&segments), vec![(0, 5), (6, 11), (12, 17), (18, 23)]);
        assert!(segments[1..]
            .iter()
            .all(|s| s.reason_codes.contains(&ReasonCode::ForcedSplit)));
    }

    #[test]
    fn forced_split_prefers_a_rejected_candidate() {
        let mut events = quiet_run(24, 1);
        events[10] = typed(10, 1, 0, 0, "offensive_foul_turnover");
        let config = EngineConfig::default();
        let mut log = BoundaryAuditLog::new();
        let segments = SegmentBuilder::new(&config)
            .min_segments(2)
            .build(&events, Some(&mut log))
            .unwrap();
        assert_eq!(bounds(&segments), vec![(0, 9), (10, 23)]);

        let entry = log
            .entries()
            .iter()
            .find(|e| e.index == EventIndex(10))
            .unwrap();
        assert_eq!(entry.strength, BoundaryStrength::Forced);
        assert_eq!(entry.segment, SegmentId(1));
        assert!(entry.reasons.iter().any(|r| r.code == ReasonCode::ForcedSplit));
    }

    #[test]
    fn forced_split_stops_when_nothing_can_split() {
        let events = quiet_run(3, 1);
        let config = EngineConfig::default();
        let segments = SegmentBuilder::new(&config)
            .min_segments(4)
            .build(&events, None)
            .unwrap();
        assert_eq!(bounds(&segments), vec![(0, 0), (1, 1), (2, 2)]);
    }

    #[test]
    fn segments_carry_score_context() {
        let mut events = quiet_run(10, 1);
        for e in events.iter_mut().skip(2) {
            e.home_score = 2;
        }
        for e in events.iter_mut().skip(5) {
            e.period = 2;
        }
        let segments = build(&events);
        assert_eq!(segments[1].score_before, Score::new(2, 0));
        assert_eq!(segments[0].key_event_ids(), vec![EventIndex(2)]);
        assert_eq!(segments[1].key_event_ids(), vec![EventIndex(9)]);
    }

    #[test]
    fn audit_log_records_in_event_order() {
        let mut events = quiet_run(70, 1);
        events[40] = typed(40, 1, 0, 0, "timeout");
        let config = EngineConfig::default();
        let mut log = BoundaryAuditLog::new();
        SegmentBuilder::new(&config)
            .build(&events, Some(&mut log))
            .unwrap();
        let indices: Vec<u32> = log.entries().iter().map(|e| e.index.0).collect();
        let mut sorted = indices.clone();
        sorted.sort();
        assert_eq!(indices, sorted);
        assert!(log.entries().iter().enumerate().all(|(i, e)| e.seq == i as u64));
    }

    #[test]
    fn empty_input_is_a_construction_error() {
        let config = EngineConfig::default();
        assert!(matches!(
            SegmentBuilder::new(&config).build(&[], None),
            Err(BuildError::Segment(SegmentError::Invariant(_)))
        ));
    }
}
