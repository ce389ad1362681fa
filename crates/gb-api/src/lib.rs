//! Convenience layer for hosts: build a playing engine straight from
//! section markup, or revive one from a snapshot.

use gb_core::{GamebookError, SceneSnapshot};
use gb_engine::{EngineOptions, GameState, GamebookEngine};
use gb_markup::build_section;

#[derive(Debug, Clone, Default)]
pub struct CreateEngineFromXmlOptions {
    pub section_xml: String,
    pub random_seed: Option<u32>,
    pub instant_rolls: bool,
    pub state: GameState,
}

#[derive(Debug, Clone)]
pub struct ResumeEngineFromXmlOptions {
    pub section_xml: String,
    pub snapshot: SceneSnapshot,
    pub instant_rolls: bool,
    pub state: GameState,
}

/// Parses the section and starts executing it; the returned engine is
/// suspended at the first choice (or already finished).
pub fn create_engine_from_xml(
    options: CreateEngineFromXmlOptions,
) -> Result<GamebookEngine, GamebookError> {
    let mut engine = GamebookEngine::new(EngineOptions {
        random_seed: options.random_seed,
        instant_rolls: options.instant_rolls,
        state: options.state,
    });
    build_section(&mut engine, &options.section_xml)?;
    engine.start_execution()?;
    Ok(engine)
}

/// Parses the section and replays a snapshot onto it instead of running
/// from the top. The snapshot must have been taken in the same section.
pub fn resume_engine_from_xml(
    options: ResumeEngineFromXmlOptions,
) -> Result<GamebookEngine, GamebookError> {
    let mut engine = GamebookEngine::new(EngineOptions {
        random_seed: Some(options.snapshot.rng_state),
        instant_rolls: options.instant_rolls,
        state: options.state,
    });
    build_section(&mut engine, &options.section_xml)?;
    engine.resume(&options.snapshot)?;
    Ok(engine)
}
