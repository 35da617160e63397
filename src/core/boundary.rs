//! Boundary classification: decides, event by event, whether a new
//! segment must start, may start, or must not start here.
//!
//! Rules come in two tiers. Hard rules (absolute cap, period and overtime
//! starts, lead flips) always win. Soft rules (soft cap, scoring plays,
//! stoppages, possession changes, lead-ladder crossings, runs, crunch
//! time) are only looked at when no hard rule fired, and only once the
//! open segment has reached the rule's minimum size.

use serde::{Deserialize, Serialize};

use crate::core::config::EngineConfig;
use crate::core::keywords::PlayTraits;
use crate::schema::event::{Event, EventIndex, Score, TeamSide};
use crate::schema::lead::{Leader, LeadState};
use crate::schema::segment::{resolve_precedence, BoundaryAction, Precedence, ReasonCode};

/// How strongly the classifier wants a boundary at this event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoundaryStrength {
    Forced,
    Preferred,
    NonBoundary,
}

/// One candidate reason and what became of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundaryReason {
    pub code: ReasonCode,
    pub precedence: Precedence,
    pub action: BoundaryAction,
}

impl BoundaryReason {
    fn new(code: ReasonCode, action: BoundaryAction) -> Self {
        Self {
            code,
            precedence: code.precedence(),
            action,
        }
    }
}

/// The classifier's verdict for one event transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryDecision {
    pub position: usize,
    pub index: EventIndex,
    pub strength: BoundaryStrength,
    pub reasons: Vec<BoundaryReason>,
    /// Head of the stoppage cluster this event was folded into.
    pub collapsed_into: Option<EventIndex>,
    /// The event is the last one of the game.
    pub game_end: bool,
}

impl BoundaryDecision {
    pub fn starts_new(&self) -> bool {
        self.reasons
            .iter()
            .any(|r| r.action == BoundaryAction::StartNew)
    }

    /// Precedence-resolved codes of the reasons that open a segment.
    pub fn live_codes(&self) -> Vec<ReasonCode> {
        let codes: Vec<ReasonCode> = self
            .reasons
            .iter()
            .filter(|r| r.action == BoundaryAction::StartNew)
            .map(|r| r.code)
            .collect();
        resolve_precedence(&codes)
    }

    pub fn collapsed_codes(&self) -> Vec<ReasonCode> {
        self.reasons
            .iter()
            .filter(|r| r.action == BoundaryAction::Collapsed)
            .map(|r| r.code)
            .collect()
    }

    /// Turn a preferred boundary into a non-boundary. Forced boundaries are
    /// never demoted.
    pub fn demote(&mut self) {
        if self.strength != BoundaryStrength::Preferred {
            return;
        }
        for reason in &mut self.reasons {
            if reason.action == BoundaryAction::StartNew {
                reason.action = BoundaryAction::Ignored;
            }
        }
        self.strength = BoundaryStrength::NonBoundary;
    }

    /// Open a segment here regardless of what the rules said.
    pub fn force(&mut self, code: ReasonCode) {
        self.reasons
            .push(BoundaryReason::new(code, BoundaryAction::StartNew));
        self.strength = BoundaryStrength::Forced;
    }
}

/// Count of lead changes in the conventional sense: the side in front
/// differs from the last side that was in front. Ties in between do not
/// reset the comparison.
pub fn count_lead_changes(events: &[Event]) -> usize {
    let mut last_leader: Option<TeamSide> = None;
    let mut changes = 0;
    for event in events {
        if let Some(side) = Leader::of(event.score()).side() {
            if last_leader.is_some_and(|prev| prev != side) {
                changes += 1;
            }
            last_leader = Some(side);
        }
    }
    changes
}

/// Scoring positions: events whose score differs from the previous event
/// (or from 0-0 for the first event).
pub fn scoring_flags(events: &[Event]) -> Vec<bool> {
    let mut previous = Score::default();
    events
        .iter()
        .map(|e| {
            let changed = e.score() != previous;
            previous = e.score();
            changed
        })
        .collect()
}

/// Pure classifier over one game. Per-event derived data is computed once
/// up front; `classify` itself only reads.
pub struct BoundaryClassifier<'a> {
    events: &'a [Event],
    config: &'a EngineConfig,
    traits: Vec<PlayTraits>,
    ladder: Vec<Option<ReasonCode>>,
    scoring: Vec<bool>,
    run_crossings: Vec<bool>,
    crunch_entries: Vec<bool>,
}

impl<'a> BoundaryClassifier<'a> {
    pub fn new(events: &'a [Event], config: &'a EngineConfig) -> Self {
        let traits = config.keywords.classify_all(events);
        let ladder = if config.boundary.lead_ladder_enabled {
            ladder_crossings(events, config)
        } else {
            vec![None; events.len()]
        };
        let scoring = scoring_flags(events);
        let run_crossings = run_crossings(events, config.boundary.run_min_points);
        let crunch_entries = crunch_entries(events, config);
        Self {
            events,
            config,
            traits,
            ladder,
            scoring,
            run_crossings,
            crunch_entries,
        }
    }

    pub fn events(&self) -> &'a [Event] {
        self.events
    }

    pub fn is_scoring(&self, position: usize) -> bool {
        self.scoring.get(position).copied().unwrap_or(false)
    }

    /// Classify the transition into `position`, given that the open segment
    /// starts at `open_start`.
    pub fn classify(&self, position: usize, open_start: usize) -> BoundaryDecision {
        let event = &self.events[position];
        let mut decision = BoundaryDecision {
            position,
            index: event.index,
            strength: BoundaryStrength::NonBoundary,
            reasons: Vec::new(),
            collapsed_into: None,
            game_end: position + 1 == self.events.len(),
        };
        if position == 0 {
            return decision;
        }

        let open_len = position.saturating_sub(open_start);
        let hard = self.hard_reasons(position, open_len);
        if !hard.is_empty() {
            decision.reasons = hard
                .into_iter()
                .map(|code| BoundaryReason::new(code, BoundaryAction::StartNew))
                .collect();
            decision.strength = BoundaryStrength::Forced;
            return decision;
        }

        self.soft_reasons(position, open_start, &mut decision);
        if decision.starts_new() {
            decision.strength = BoundaryStrength::Preferred;
        }
        decision
    }

    fn hard_reasons(&self, position: usize, open_len: usize) -> Vec<ReasonCode> {
        let boundary = &self.config.boundary;
        let prev = &self.events[position - 1];
        let cur = &self.events[position];
        let mut codes = Vec::new();

        if open_len >= boundary.absolute_max_events {
            codes.push(ReasonCode::AbsoluteMaxReached);
        }
        if cur.period != prev.period {
            if cur.period > boundary.regulation_periods {
                codes.push(ReasonCode::OvertimeStart);
            } else {
                codes.push(ReasonCode::PeriodStart);
            }
        }
        let before = Leader::of(prev.score());
        let after = Leader::of(cur.score());
        if before != Leader::Tied && after != Leader::Tied && before != after {
            codes.push(ReasonCode::LeadChange);
        }
        codes
    }

    fn soft_reasons(&self, position: usize, open_start: usize, decision: &mut BoundaryDecision) {
        let boundary = &self.config.boundary;
        let open_len = position.saturating_sub(open_start);
        let traits = self.traits[position];
        let guarded = traits.non_boundary;
        let mut push = |code: ReasonCode, live: bool| {
            let action = if live {
                BoundaryAction::StartNew
            } else {
                BoundaryAction::Ignored
            };
            decision.reasons.push(BoundaryReason::new(code, action));
        };

        // Score-state triggers ride on scoring plays, so the non-boundary
        // guard does not apply to them.
        if let Some(code) = self.ladder[position] {
            push(code, open_len >= boundary.stoppage_min_events);
        }
        if self.run_crossings[position] {
            push(ReasonCode::RunStart, open_len >= boundary.min_segment_events);
        }
        if self.crunch_entries[position] {
            push(ReasonCode::CrunchStart, open_len >= boundary.stoppage_min_events);
        }

        // Guarded triggers.
        if self.scoring[position] {
            push(
                ReasonCode::ScoringPlay,
                !guarded && open_len >= boundary.scoring_min_events(),
            );
        }
        if open_len >= boundary.soft_cap_events {
            push(ReasonCode::SoftCapReached, !guarded);
        }
        if traits.turnover {
            push(
                ReasonCode::PossessionChange,
                !guarded && open_len >= boundary.possession_min_events,
            );
        }
        if traits.high_impact {
            push(
                ReasonCode::HighImpact,
                !guarded && open_len >= boundary.stoppage_min_events,
            );
        }
        if traits.stoppage {
            let code = if traits.review {
                ReasonCode::Review
            } else {
                ReasonCode::Stoppage
            };
            if let Some(head) = self.cluster_head(position, open_start) {
                decision.collapsed_into = Some(self.events[head].index);
                for reason in decision.reasons.iter_mut() {
                    if reason.code == ReasonCode::HighImpact {
                        reason.action = BoundaryAction::Collapsed;
                    }
                }
                decision
                    .reasons
                    .push(BoundaryReason::new(code, BoundaryAction::Collapsed));
            } else {
                let live = !guarded && open_len >= boundary.stoppage_min_events;
                decision.reasons.push(BoundaryReason::new(
                    code,
                    if live {
                        BoundaryAction::StartNew
                    } else {
                        BoundaryAction::Ignored
                    },
                ));
            }
        }
    }

    /// The open segment's opening stoppage, if this stoppage chains back to
    /// it through stoppages no more than the cluster window apart. A chain
    /// that ends anywhere else starts a new cluster at `position`.
    fn cluster_head(&self, position: usize, open_start: usize) -> Option<usize> {
        let window = self.config.boundary.cluster_window;
        let mut head = None;
        let mut cursor = position;
        loop {
            let lo = cursor.saturating_sub(window).max(open_start);
            let previous = (lo..cursor).rev().find(|&j| self.traits[j].stoppage);
            match previous {
                Some(j) => {
                    head = Some(j);
                    cursor = j;
                }
                None => break,
            }
        }
        head.filter(|&h| h == open_start)
    }
}

/// Lead-ladder code at each position, measured against the last committed
/// ladder state. A tier move that reverts to the committed state within the
/// hysteresis window is never committed, so neither the move nor its revert
/// reports. Direct flips belong to the hard tier and report nothing here.
fn ladder_crossings(events: &[Event], config: &EngineConfig) -> Vec<Option<ReasonCode>> {
    let ladder = &config.lead_ladder;
    let window = config.boundary.hysteresis_events;
    let lead: Vec<LeadState> = events.iter().map(|e| ladder.state_for(e.score())).collect();
    let mut codes = vec![None; events.len()];
    let Some(&first) = lead.first() else {
        return codes;
    };
    let mut committed = first;

    for position in 1..lead.len() {
        let after = lead[position];
        if committed.same_bucket(&after) {
            continue;
        }
        codes[position] = match (committed.leader, after.leader) {
            (Leader::Tied, _) => Some(ReasonCode::TieBroken),
            (_, Leader::Tied) => Some(ReasonCode::TieReached),
            (b, a) if b != a => None,
            _ => {
                let end = (position + window).min(lead.len() - 1);
                if (position + 1..=end).any(|k| lead[k].same_bucket(&committed)) {
                    continue;
                }
                if after.tier > committed.tier {
                    Some(ReasonCode::TierUp)
                } else {
                    Some(ReasonCode::TierDown)
                }
            }
        };
        committed = after;
    }
    codes
}

/// Positions where one side's unanswered run first reaches `min_points`.
fn run_crossings(events: &[Event], min_points: u32) -> Vec<bool> {
    let mut flags = vec![false; events.len()];
    let mut run: Option<(TeamSide, u32)> = None;
    let mut previous = events.first().map(Event::score).unwrap_or_default();

    for (position, event) in events.iter().enumerate().skip(1) {
        let delta = event.score().delta_since(previous);
        previous = event.score();
        let (side, gained) = match (delta.home > 0, delta.away > 0) {
            (true, false) => (TeamSide::Home, delta.home),
            (false, true) => (TeamSide::Away, delta.away),
            (false, false) => continue,
            (true, true) => {
                run = None;
                continue;
            }
        };
        let before = match run {
            Some((running, points)) if running == side => points,
            _ => 0,
        };
        let after = before + gained;
        run = Some((side, after));
        if before < min_points && after >= min_points {
            flags[position] = true;
        }
    }
    flags
}

/// First event of each late period that falls inside crunch time.
fn crunch_entries(events: &[Event], config: &EngineConfig) -> Vec<bool> {
    let boundary = &config.boundary;
    let mut flags = vec![false; events.len()];
    let mut entered_period: Option<u8> = None;
    for (position, event) in events.iter().enumerate() {
        if event.period < boundary.regulation_periods || entered_period == Some(event.period) {
            continue;
        }
        let late = event
            .clock
            .seconds_remaining()
            .is_some_and(|s| s <= boundary.crunch_seconds);
        if late && event.score().margin() <= boundary.crunch_max_margin {
            flags[position] = true;
            entered_period = Some(event.period);
        }
    }
    flags
}
