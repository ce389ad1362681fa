use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use gb_api::{
    create_engine_from_xml, resume_engine_from_xml, CreateEngineFromXmlOptions,
    ResumeEngineFromXmlOptions,
};
use gb_core::{FightResult, GamebookError, NodeId, SceneEvent};
use gb_engine::{Activation, GamebookEngine, SkipWinner};

mod source_loader;
mod state_store;

use source_loader::load_section_xml;
use state_store::{read_state, write_state, PlayerState, PLAYER_STATE_SCHEMA};

#[derive(Debug, Parser)]
#[command(name = "gb-cli")]
#[command(about = "Gamebook section player CLI")]
struct Cli {
    #[command(subcommand)]
    command: Mode,
}

#[derive(Debug, Subcommand)]
enum Mode {
    /// Start a book at a section and write the initial save.
    Start(StartArgs),
    /// Activate one of the numbered actions from the last listing.
    Act(ActArgs),
    /// Take back the last roll.
    Undo(UndoArgs),
}

#[derive(Debug, Args)]
struct StartArgs {
    #[arg(long = "book-dir")]
    book_dir: PathBuf,
    #[arg(long = "section")]
    section: String,
    #[arg(long = "seed")]
    seed: Option<u32>,
    #[arg(long = "state-out")]
    state_out: PathBuf,
}

#[derive(Debug, Args)]
struct ActArgs {
    #[arg(long = "book-dir")]
    book_dir: PathBuf,
    #[arg(long = "state-in")]
    state_in: PathBuf,
    /// index into the action list printed by the previous command
    #[arg(long = "action")]
    action: usize,
    /// accept fast-forwarding a fight both sides could still win
    #[arg(long = "confirm")]
    confirm: bool,
    /// winner of a deadlocked fight being skipped
    #[arg(long = "winner")]
    winner: Option<WinnerArg>,
    #[arg(long = "state-out")]
    state_out: PathBuf,
}

#[derive(Debug, Args)]
struct UndoArgs {
    #[arg(long = "book-dir")]
    book_dir: PathBuf,
    #[arg(long = "state-in")]
    state_in: PathBuf,
    #[arg(long = "state-out")]
    state_out: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum WinnerArg {
    Player,
    Enemy,
}

fn main() {
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(()) => 0,
        Err(error) => {
            eprintln!("{error}");
            1
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<(), GamebookError> {
    match cli.command {
        Mode::Start(args) => run_start(args),
        Mode::Act(args) => run_act(args),
        Mode::Undo(args) => run_undo(args),
    }
}

fn run_start(args: StartArgs) -> Result<(), GamebookError> {
    let xml = load_section_xml(&args.book_dir, &args.section)?;
    let mut engine = create_engine_from_xml(CreateEngineFromXmlOptions {
        section_xml: xml,
        random_seed: args.seed,
        ..Default::default()
    })?;
    settle_dice(&mut engine)?;
    report(&mut engine);
    persist(&engine, &args.state_out)
}

fn run_act(args: ActArgs) -> Result<(), GamebookError> {
    let saved = read_state(&args.state_in)?;
    let xml = load_section_xml(&args.book_dir, &saved.section)?;
    let mut engine = resume_engine_from_xml(ResumeEngineFromXmlOptions {
        section_xml: xml,
        snapshot: saved.snapshot,
        instant_rolls: false,
        state: saved.state,
    })?;
    // the re-parse replays the whole section; keep its labels, skip the text
    let labels = collect_labels(&engine.drain_events());

    let actions = engine.enabled_action_nodes();
    let Some(node) = actions.get(args.action).copied() else {
        return Err(GamebookError::new(
            "CLI_ACTION_RANGE",
            format!("no action numbered {}", args.action),
        ));
    };
    match engine.activate(node)? {
        Activation::Done => {}
        Activation::SkipConfirm(fight) => {
            if args.confirm {
                engine.confirm_skip(fight)?;
            } else {
                println!("Both sides could still win this fight.");
                println!("Repeat with --confirm to skip it anyway.");
                return Ok(());
            }
        }
        Activation::SkipPickWinner(fight) => {
            let Some(winner) = args.winner else {
                println!("Neither side can beat the other.");
                println!("Repeat with --winner player or --winner enemy.");
                return Ok(());
            };
            let winner = match winner {
                WinnerArg::Player => SkipWinner::Player,
                WinnerArg::Enemy => SkipWinner::Enemy,
            };
            engine.resolve_skip(fight, winner)?;
        }
    }
    settle_dice(&mut engine)?;

    // a goto moves the book on to a fresh section
    let events = engine.drain_events();
    let target = events.iter().rev().find_map(|event| match event {
        SceneEvent::GotoSection { section, .. } => Some(section.clone()),
        _ => None,
    });
    print_events(&events);
    match target {
        Some(section) => {
            let xml = load_section_xml(&args.book_dir, &section)?;
            let mut engine = create_engine_from_xml(CreateEngineFromXmlOptions {
                section_xml: xml,
                random_seed: None,
                instant_rolls: false,
                state: engine.into_state(),
            })?;
            settle_dice(&mut engine)?;
            report(&mut engine);
            persist(&engine, &args.state_out)
        }
        None => {
            list_actions(&engine, &labels);
            persist(&engine, &args.state_out)
        }
    }
}

fn run_undo(args: UndoArgs) -> Result<(), GamebookError> {
    let saved = read_state(&args.state_in)?;
    let xml = load_section_xml(&args.book_dir, &saved.section)?;
    let mut engine = resume_engine_from_xml(ResumeEngineFromXmlOptions {
        section_xml: xml,
        snapshot: saved.snapshot,
        instant_rolls: false,
        state: saved.state,
    })?;
    let labels = collect_labels(&engine.drain_events());
    if !engine.can_undo() {
        println!("Nothing to take back.");
        return persist(&engine, &args.state_out);
    }
    engine.undo()?;
    print_events(&engine.drain_events());
    list_actions(&engine, &labels);
    persist(&engine, &args.state_out)
}

/// Saved games cannot hold a half-thrown roll, so the CLI throws pending
/// dice as soon as they appear.
fn settle_dice(engine: &mut GamebookEngine) -> Result<(), GamebookError> {
    while let Some(roller) = engine.pending_roller() {
        engine.trigger_roll(roller)?;
    }
    Ok(())
}

fn report(engine: &mut GamebookEngine) {
    let events = engine.drain_events();
    let labels = collect_labels(&events);
    print_events(&events);
    list_actions(engine, &labels);
}

fn collect_labels(events: &[SceneEvent]) -> BTreeMap<NodeId, String> {
    let mut labels = BTreeMap::new();
    for event in events {
        if let SceneEvent::Content { node, text, .. } = event {
            labels.entry(*node).or_insert_with(|| text.clone());
        }
    }
    labels
}

fn print_events(events: &[SceneEvent]) {
    for event in events {
        match event {
            SceneEvent::Content { text, .. } => println!("{text}"),
            SceneEvent::StaminaChanged { stamina, .. } => {
                println!("  (enemy stamina is now {stamina})");
            }
            SceneEvent::FightEnded { result, .. } => match result {
                FightResult::Won => println!("  You have won the fight."),
                FightResult::Lost => println!("  You have been defeated."),
                FightResult::Fled => println!("  You break away from the fight."),
            },
            SceneEvent::RollResolved { result, .. } => {
                println!("  (you rolled {result})");
            }
            SceneEvent::GotoSection { section, .. } => {
                println!("Turning to section {section}...");
            }
            _ => {}
        }
    }
}

fn list_actions(engine: &GamebookEngine, labels: &BTreeMap<NodeId, String>) {
    let actions = engine.enabled_action_nodes();
    if engine.state().adventurer.is_dead() {
        println!("Your adventure ends here.");
        return;
    }
    if actions.is_empty() {
        println!("No actions available.");
        return;
    }
    println!("Actions:");
    for (index, node) in actions.iter().enumerate() {
        match labels.get(node) {
            Some(label) => println!("  {index}) {label}"),
            None => println!(
                "  {index}) <{}>",
                engine.node_tag(*node).unwrap_or("?")
            ),
        }
    }
}

fn persist(engine: &GamebookEngine, path: &std::path::Path) -> Result<(), GamebookError> {
    let state = PlayerState {
        schema_version: PLAYER_STATE_SCHEMA.to_string(),
        section: engine.section().to_string(),
        snapshot: engine.snapshot()?,
        state: engine.state().clone(),
    };
    write_state(path, &state)
}
