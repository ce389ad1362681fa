mod attrs;
mod error;
mod types;

pub use attrs::Attributes;
pub use error::GamebookError;
pub use types::{
    CheckpointRecord, FightResult, GrouperId, NodeId, NodeRecord, RollerId, RunOutcome,
    SceneEvent, SceneSnapshot, StepRecord, StyleHint, UndoRecord, SNAPSHOT_SCHEMA,
};
