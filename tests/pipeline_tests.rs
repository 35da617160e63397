/// Pipeline integration tests: end-to-end event-to-timeline runs.

use std::path::Path;

use timeline_engine::core::config::EngineConfig;
use timeline_engine::core::coverage::{segment_fingerprint, validate_segments};
use timeline_engine::core::guardrails::Checkpoint;
use timeline_engine::core::pipeline::{EngineError, TimelineEngine};
use timeline_engine::schema::attachment::AttachmentCandidate;
use timeline_engine::schema::block::BlockRole;
use timeline_engine::schema::event::{Event, EventIndex, EventKind, GameClock, InputError};
use timeline_engine::schema::segment::{KeyEventReason, ReasonCode, Segment, SegmentId};

fn load_game(path: &str) -> Vec<Event> {
    let contents = std::fs::read_to_string(Path::new(path)).unwrap();
    ron::from_str(&contents).unwrap()
}

fn event(index: u32, period: u8, home: u32, away: u32, play_type: &str) -> Event {
    Event {
        index: EventIndex(index),
        period,
        clock: GameClock::Seconds(600.0 - (index % 60) as f32 * 10.0),
        home_score: home,
        away_score: away,
        description: play_type.replace('_', " "),
        play_type: play_type.to_string(),
        team: None,
        kind: EventKind::Play,
    }
}

/// `total` events over four periods; `score` gives the running score.
fn synthetic_game(total: u32, score: impl Fn(u32) -> (u32, u32)) -> Vec<Event> {
    let per_period = total.div_ceil(4);
    (0..total)
        .map(|i| {
            let (home, away) = score(i);
            let before = if i == 0 { (0, 0) } else { score(i - 1) };
            let kind = if (home, away) != before { "made_shot" } else { "other" };
            event(i, (i / per_period + 1) as u8, home, away, kind)
        })
        .collect()
}

#[test]
fn fixture_game_runs_end_to_end() {
    let events = load_game("tests/fixtures/short_game.ron");
    assert_eq!(events.len(), 48);

    let engine = TimelineEngine::builder().audit(true).build().unwrap();
    let timeline = engine.run(&events, &[]).unwrap();
    assert!(timeline.certified(), "{:?}", timeline.segment_report.errors);
    assert!(timeline.segments.len() >= 4);
    assert!((4..=7).contains(&timeline.blocks.len()));

    let keys: Vec<_> = timeline
        .segments
        .iter()
        .flat_map(|s| s.key_events.iter().copied())
        .collect();
    assert!(keys
        .iter()
        .any(|k| k.index == EventIndex(14) && k.reason == KeyEventReason::TurnoverToScore));
    assert!(keys
        .iter()
        .any(|k| k.index == EventIndex(38) && k.reason == KeyEventReason::FoulToPoints));

    let timeout = timeline
        .segments
        .iter()
        .find(|s| s.start_index == EventIndex(20))
        .expect("timeout opens a segment");
    assert!(timeout.has_reason(ReasonCode::Stoppage));

    let last = timeline.segments.last().unwrap();
    assert!(last.has_reason(ReasonCode::GameEnd));
    assert_eq!(last.score_after().to_string(), "12-14");
    assert!(!timeline.audit.unwrap().is_empty());
}

#[test]
fn every_period_starts_a_segment() {
    let events = load_game("tests/fixtures/short_game.ron");
    let engine = TimelineEngine::builder().build().unwrap();
    let timeline = engine.run(&events, &[]).unwrap();
    for start in [0, 12, 24, 36] {
        let segment = timeline
            .segments
            .iter()
            .find(|s| s.start_index == EventIndex(start))
            .unwrap();
        assert!(segment.has_reason(ReasonCode::PeriodStart), "segment at {}", start);
    }
    for segment in &timeline.segments {
        let first = segment.events.first().unwrap().period;
        assert!(segment.events.iter().all(|e| e.period == first));
    }
}

#[test]
fn config_file_feeds_the_builder() {
    let engine = TimelineEngine::builder()
        .config_file("tests/fixtures/ncaab_config.ron")
        .build()
        .unwrap();
    assert_eq!(engine.config().boundary.regulation_periods, 2);
    assert_eq!(engine.config().lead_ladder.thresholds, vec![3, 6, 10, 15]);

    let events = synthetic_game(200, |i| (i / 9 * 2, i / 11 * 2));
    let timeline = engine.run(&events, &[]).unwrap();
    assert!(timeline.certified());
    let overtime: Vec<&Segment<'_>> = timeline
        .segments
        .iter()
        .filter(|s| s.has_reason(ReasonCode::OvertimeStart))
        .collect();
    assert_eq!(overtime.len(), 2, "periods 3 and 4 are overtime with two halves");
}

#[test]
fn missing_config_file_is_an_error() {
    let result = TimelineEngine::builder()
        .config_file("tests/fixtures/no_such_config.ron")
        .build();
    assert!(matches!(result, Err(EngineError::Config(_))));
}

#[test]
fn back_and_forth_game_gets_more_blocks() {
    // Lead flips directly every 25 events.
    let events = synthetic_game(300, |i| {
        let swing = i / 25;
        (2 + 3 * (swing / 2), 3 * ((swing + 1) / 2))
    });
    let lead_changes = timeline_engine::core::boundary::count_lead_changes(&events);
    assert!(lead_changes >= 6, "only {} lead changes", lead_changes);

    let engine = TimelineEngine::builder().build().unwrap();
    let timeline = engine.run(&events, &[]).unwrap();
    assert!(timeline.certified());
    assert_eq!(timeline.blocks.len(), 6);
}

#[test]
fn long_quiet_game_gets_one_extra_block() {
    let events = synthetic_game(520, |i| (i / 20 * 2, i / 21 * 2));
    let engine = TimelineEngine::builder().build().unwrap();
    let timeline = engine.run(&events, &[]).unwrap();
    assert!(timeline.certified());
    let lead_changes = timeline_engine::core::boundary::count_lead_changes(&events);
    assert!(lead_changes < 3);
    assert_eq!(timeline.blocks.len(), 5);
}

#[test]
fn roles_follow_block_rules() {
    let events = load_game("tests/fixtures/short_game.ron");
    let engine = TimelineEngine::builder().build().unwrap();
    let timeline = engine.run(&events, &[]).unwrap();
    let roles: Vec<BlockRole> = timeline.blocks.iter().map(|b| b.role).collect();
    assert_eq!(roles.first(), Some(&BlockRole::Opening));
    assert_eq!(roles.last(), Some(&BlockRole::Closing));
    for role in BlockRole::ALL {
        assert!(roles.iter().filter(|r| **r == role).count() <= 2);
    }
}

#[test]
fn gaps_in_input_are_rejected() {
    let mut events = synthetic_game(40, |_| (0, 0));
    events.remove(17);
    let engine = TimelineEngine::builder().build().unwrap();
    match engine.run(&events, &[]) {
        Err(EngineError::Input(InputError::IndexGap { previous, current })) => {
            assert_eq!((previous, current), (EventIndex(16), EventIndex(18)));
        }
        other => panic!("expected an index gap, got {:?}", other.map(|t| t.blocks.len())),
    }
}

#[test]
fn markers_only_is_rejected() {
    let mut events = synthetic_game(8, |_| (0, 0));
    for e in events.iter_mut() {
        e.kind = EventKind::Marker;
    }
    let engine = TimelineEngine::builder().build().unwrap();
    assert!(matches!(
        engine.run(&events, &[]),
        Err(EngineError::Input(InputError::NoPlays))
    ));
}

#[test]
fn short_game_is_split_up_to_the_block_minimum() {
    let mut events = synthetic_game(25, |i| (i / 12 * 2, 0));
    for e in events.iter_mut() {
        e.period = 1;
    }
    let engine = TimelineEngine::builder().build().unwrap();
    let timeline = engine.run(&events, &[]).unwrap();
    assert!(timeline.certified(), "{:?}", timeline.segment_report.errors);
    assert_eq!(timeline.blocks.len(), 4);
    assert_eq!(timeline.segments.last().unwrap().end_index, EventIndex(24));
    assert!(timeline
        .segments
        .iter()
        .any(|s| s.has_reason(ReasonCode::ForcedSplit)));
}

#[test]
fn fewer_plays_than_blocks_is_rejected() {
    let mut events = synthetic_game(3, |_| (0, 0));
    for e in events.iter_mut() {
        e.period = 1;
    }
    let engine = TimelineEngine::builder().build().unwrap();
    assert!(matches!(
        engine.run(&events, &[]),
        Err(EngineError::Grouping(_))
    ));
}

#[test]
fn fingerprints_are_stable_and_sensitive() {
    let events = load_game("tests/fixtures/short_game.ron");
    let engine = TimelineEngine::builder().build().unwrap();
    let first = engine.run(&events, &[]).unwrap();
    let second = engine.run(&events, &[]).unwrap();
    assert_eq!(first.segment_report.fingerprint, second.segment_report.fingerprint);
    assert_eq!(first.segment_report.fingerprint.len(), 64);
    assert_eq!(
        segment_fingerprint(&first.segments),
        first.segment_report.fingerprint
    );

    let mut altered = events.clone();
    altered.truncate(47);
    let third = engine.run(&altered, &[]).unwrap();
    assert_ne!(first.segment_report.fingerprint, third.segment_report.fingerprint);
}

#[test]
fn validator_reports_hand_built_gap() {
    let events = synthetic_game(10, |_| (0, 0));
    let segments = vec![
        Segment::new(SegmentId(0), &events[0..5], vec![], vec![key(4)], Default::default()).unwrap(),
        Segment::new(SegmentId(1), &events[7..10], vec![], vec![key(9)], Default::default()).unwrap(),
    ];
    let report = validate_segments(&segments, Some(&events), false);
    assert!(!report.passed);
    assert!(report
        .errors
        .iter()
        .any(|e| e.contains("indices [5, 6] not covered")));
}

fn key(index: u32) -> timeline_engine::schema::segment::KeyEvent {
    timeline_engine::schema::segment::KeyEvent {
        index: EventIndex(index),
        reason: KeyEventReason::Fallback,
    }
}

#[test]
fn attachments_are_scored_and_capped() {
    let events = load_game("tests/fixtures/short_game.ron");
    let candidates: Vec<AttachmentCandidate> = (0..9)
        .map(|i| AttachmentCandidate {
            id: format!("post-{}", i),
            text: "What a finish to the quarter".to_string(),
            has_media: i % 2 == 0,
            is_team_account: i == 3,
            is_verified: true,
            engagement: 10 * i as u64,
            anchor_index: None,
        })
        .collect();
    let engine = TimelineEngine::builder().build().unwrap();
    let timeline = engine.run(&events, &candidates).unwrap();
    assert!(timeline.guardrails.passed);
    let placed: usize = timeline.blocks.iter().map(|b| b.attachments.len()).sum();
    assert_eq!(placed, timeline.blocks.len().min(5));
    assert!(timeline.blocks.iter().all(|b| b.attachments.len() <= 1));
}

#[test]
fn narratives_go_through_the_pre_render_checkpoint() {
    let events = load_game("tests/fixtures/short_game.ron");
    let engine = TimelineEngine::builder().build().unwrap();
    let mut timeline = engine.run(&events, &[]).unwrap();

    let summaries = timeline.summaries_through(1);
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].role, BlockRole::Opening);
    assert!(summaries.iter().all(|s| !s.key_event_descriptions.is_empty()));

    let narratives: Vec<String> = timeline
        .blocks
        .iter()
        .map(|b| format!("{} {}", b.role, vec!["play"; 25].join(" ")))
        .collect();
    timeline.attach_narratives(narratives).unwrap();
    let result = engine.pre_render_check(&timeline);
    assert_eq!(result.checkpoint, Checkpoint::PreRender);
    assert!(result.passed, "{:?}", result.violations);
    assert!(result.violations.is_empty());
}

#[test]
fn timeline_serializes_without_raw_events() {
    let events = load_game("tests/fixtures/short_game.ron");
    let engine = TimelineEngine::builder().build().unwrap();
    let timeline = engine.run(&events, &[]).unwrap();
    let json = serde_json::to_value(&timeline).unwrap();
    assert!(json["segments"][0].get("events").is_none());
    assert_eq!(json["segments"][0]["reason_codes"][0], "PERIOD_START");
    assert_eq!(
        json["blocks"].as_array().unwrap().len(),
        timeline.blocks.len()
    );
    assert!(json.get("audit").is_none());
}

#[test]
fn sport_presets_validate() {
    use timeline_engine::core::config::Sport;
    for sport in [Sport::Nba, Sport::Ncaab, Sport::Nhl, Sport::Nfl] {
        EngineConfig::for_sport(sport).validate().unwrap();
        TimelineEngine::builder().sport(sport).build().unwrap();
    }
}
