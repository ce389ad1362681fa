use std::fs;
use std::path::Path;

use gb_core::{GamebookError, SceneSnapshot};
use gb_engine::GameState;
use serde::{Deserialize, Serialize};

pub const PLAYER_STATE_SCHEMA: &str = "player-state.v1";

/// On-disk save: the scene snapshot plus the game state that outlives it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub schema_version: String,
    pub section: String,
    pub snapshot: SceneSnapshot,
    pub state: GameState,
}

pub fn read_state(path: &Path) -> Result<PlayerState, GamebookError> {
    let raw = fs::read_to_string(path).map_err(|err| {
        GamebookError::new(
            "CLI_STATE_READ",
            format!("cannot read {}: {}", path.display(), err),
        )
    })?;
    let state: PlayerState = serde_json::from_str(&raw).map_err(|err| {
        GamebookError::new(
            "CLI_STATE_PARSE",
            format!("cannot parse {}: {}", path.display(), err),
        )
    })?;
    if state.schema_version != PLAYER_STATE_SCHEMA {
        return Err(GamebookError::new(
            "CLI_STATE_SCHEMA",
            format!(
                "state schema \"{}\" is not \"{}\"",
                state.schema_version, PLAYER_STATE_SCHEMA
            ),
        ));
    }
    Ok(state)
}

pub fn write_state(path: &Path, state: &PlayerState) -> Result<(), GamebookError> {
    let raw = serde_json::to_string_pretty(state).map_err(|err| {
        GamebookError::new("CLI_STATE_ENCODE", err.to_string())
    })?;
    fs::write(path, raw).map_err(|err| {
        GamebookError::new(
            "CLI_STATE_WRITE",
            format!("cannot write {}: {}", path.display(), err),
        )
    })
}
