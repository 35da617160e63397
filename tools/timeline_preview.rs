/// Timeline preview: run the engine over a game and print what it built.
///
/// Usage: timeline_preview [--events <path.ron>] [--config <path.ron>]
///                         [--sport nba|ncaab|nhl|nfl] [--seed <n>]
///                         [--plays <n>] [--audit] [--json]
///
/// Without `--events` a synthetic game is generated from the seed.
/// Set `RUST_LOG=timeline_engine=debug` to see stage logs.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use tracing_subscriber::EnvFilter;

use timeline_engine::core::config::Sport;
use timeline_engine::core::pipeline::{Timeline, TimelineEngine};
use timeline_engine::schema::event::{Event, EventIndex, EventKind, GameClock, TeamSide};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return;
    }

    let mut events_path = None;
    let mut config_path = None;
    let mut sport = None;
    let mut seed: u64 = 42;
    let mut plays: u32 = 420;
    let mut audit = false;
    let mut json = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--events" if i + 1 < args.len() => {
                i += 1;
                events_path = Some(args[i].clone());
            }
            "--config" if i + 1 < args.len() => {
                i += 1;
                config_path = Some(args[i].clone());
            }
            "--sport" if i + 1 < args.len() => {
                i += 1;
                sport = match parse_sport(&args[i]) {
                    Some(s) => Some(s),
                    None => {
                        eprintln!("Unknown sport: {}", args[i]);
                        std::process::exit(1);
                    }
                };
            }
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = args[i].parse().unwrap_or(42);
            }
            "--plays" if i + 1 < args.len() => {
                i += 1;
                plays = args[i].parse().unwrap_or(420);
            }
            "--audit" => audit = true,
            "--json" => json = true,
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let events = match events_path {
        Some(ref path) => match load_events(Path::new(path)) {
            Ok(events) => events,
            Err(e) => {
                eprintln!("Failed to load {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => synthesize_game(seed, plays),
    };

    let mut builder = TimelineEngine::builder().audit(audit);
    if let Some(sport) = sport {
        builder = builder.sport(sport);
    }
    if let Some(ref path) = config_path {
        builder = builder.config_file(path);
    }
    let engine = match builder.build() {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    let timeline = match engine.run(&events, &[]) {
        Ok(timeline) => timeline,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    if json {
        match serde_json::to_string_pretty(&timeline) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("ERROR: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }
    print_timeline(&timeline, events.len());
}

fn print_usage() {
    println!("Usage: timeline_preview [--events <path.ron>] [--config <path.ron>]");
    println!("                        [--sport nba|ncaab|nhl|nfl] [--seed <n>]");
    println!("                        [--plays <n>] [--audit] [--json]");
}

fn parse_sport(s: &str) -> Option<Sport> {
    match s.to_lowercase().as_str() {
        "nba" => Some(Sport::Nba),
        "ncaab" => Some(Sport::Ncaab),
        "nhl" => Some(Sport::Nhl),
        "nfl" => Some(Sport::Nfl),
        _ => None,
    }
}

fn load_events(path: &Path) -> Result<Vec<Event>, String> {
    let contents = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    ron::from_str(&contents).map_err(|e| e.to_string())
}

/// Four periods of basketball-ish plays with a made basket roughly every
/// third possession.
fn synthesize_game(seed: u64, plays: u32) -> Vec<Event> {
    const FILLER: [&str; 8] = [
        "missed_shot",
        "rebound",
        "turnover",
        "personal_foul",
        "substitution",
        "timeout",
        "steal",
        "jump_ball",
    ];
    let mut rng = StdRng::seed_from_u64(seed);
    let per_period = plays.div_ceil(4).max(1);
    let (mut home, mut away) = (0u32, 0u32);

    (0..plays)
        .map(|i| {
            let slot = i % per_period;
            let seconds = 720.0 * (1.0 - slot as f32 / per_period as f32);
            let side = if rng.gen_bool(0.5) {
                TeamSide::Home
            } else {
                TeamSide::Away
            };
            let (play_type, description) = if rng.gen_ratio(1, 3) {
                let points = if rng.gen_ratio(1, 3) { 3 } else { 2 };
                match side {
                    TeamSide::Home => home += points,
                    TeamSide::Away => away += points,
                }
                ("made_shot", format!("{:?} makes a {}-point shot", side, points))
            } else {
                let filler = FILLER[rng.gen_range(0..FILLER.len())];
                (filler, format!("{:?} {}", side, filler.replace('_', " ")))
            };
            Event {
                index: EventIndex(i),
                period: (i / per_period + 1) as u8,
                clock: GameClock::Seconds(seconds),
                home_score: home,
                away_score: away,
                description,
                play_type: play_type.to_string(),
                team: Some(side),
                kind: EventKind::Play,
            }
        })
        .collect()
}

fn print_timeline(timeline: &Timeline<'_>, event_count: usize) {
    println!("=== Segments ({} over {} events) ===", timeline.segments.len(), event_count);
    for segment in &timeline.segments {
        let reasons: Vec<&str> = segment.reason_codes.iter().map(|r| r.as_str()).collect();
        println!(
            "  #{:<3} {:>4}..={:<4} P{} {:>7} -> {:<7} [{}] keys {:?}",
            segment.id.0,
            segment.start_index.0,
            segment.end_index.0,
            segment.period(),
            segment.score_before.to_string(),
            segment.score_after().to_string(),
            reasons.join(", "),
            segment.key_event_ids().iter().map(|k| k.0).collect::<Vec<_>>()
        );
    }

    println!("\n=== Blocks ({}) ===", timeline.blocks.len());
    for summary in timeline.summaries_through(usize::MAX) {
        let block = &timeline.blocks[summary.index];
        println!(
            "  {} {:<15} segments {:?} score {} -> {} (+{}/+{}){}",
            summary.index,
            summary.role.as_str(),
            block.segment_ids.iter().map(|s| s.0).collect::<Vec<_>>(),
            summary.score_before,
            summary.score_after,
            summary.score_delta.home,
            summary.score_delta.away,
            if block.attachments.is_empty() {
                String::new()
            } else {
                format!(" attachments {:?}", block.attachments)
            }
        );
        for description in &summary.key_event_descriptions {
            println!("      - {}", description);
        }
    }

    println!("\n=== Coverage ===");
    for (name, report) in [("segments", &timeline.segment_report), ("blocks", &timeline.block_report)] {
        println!(
            "  {:<8} {} fingerprint {}",
            name,
            if report.passed { "PASS" } else { "FAIL" },
            report.fingerprint
        );
        for error in &report.errors {
            println!("    ! {}", error);
        }
    }

    println!("\n=== Guardrails ===");
    println!("  {}", if timeline.guardrails.passed { "PASS" } else { "FAIL" });
    for v in &timeline.guardrails.violations {
        println!("    {:?} {}: {}", v.severity, v.invariant_name, v.detail);
    }

    if let Some(ref audit) = timeline.audit {
        println!("\n=== Boundary audit ({} entries) ===", audit.len());
        for entry in audit.entries() {
            let reasons: Vec<String> = entry
                .reasons
                .iter()
                .map(|r| format!("{}:{:?}", r.code, r.action))
                .collect();
            println!(
                "  {:>4} @{:<4} {:?}{} -> segment {} [{}]",
                entry.seq,
                entry.index.0,
                entry.strength,
                if entry.demoted { " (demoted)" } else { "" },
                entry.segment.0,
                reasons.join(", ")
            );
        }
    }
}
