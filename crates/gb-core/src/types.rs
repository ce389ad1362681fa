use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const SNAPSHOT_SCHEMA: &str = "scene.v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GrouperId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RollerId(pub usize);

/// Result of asking an executable to run one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Complete,
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleHint {
    Plain,
    Action,
    Italic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FightResult {
    Won,
    Lost,
    Fled,
}

/// State and content deltas pushed to the presentation layer.
/// The engine never reads layout back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SceneEvent {
    Content {
        node: NodeId,
        text: String,
        style: StyleHint,
    },
    EnabledChanged {
        node: NodeId,
        enabled: bool,
    },
    StaminaChanged {
        fight: NodeId,
        stamina: i32,
    },
    FightEnded {
        fight: NodeId,
        result: FightResult,
    },
    GotoSection {
        section: String,
        flee: bool,
    },
    RollRequested {
        roller: RollerId,
        dice: u32,
        modifier: i32,
    },
    RollResolved {
        roller: RollerId,
        result: i32,
    },
}

/// Flat key-value property set for one node, with the records of its
/// children nested below it, mirroring the node tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub tag: String,
    #[serde(default)]
    pub props: BTreeMap<String, String>,
    #[serde(default)]
    pub children: Vec<NodeRecord>,
}

/// One recorded step of the rollback log, as saved state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StepRecord {
    Enable { node: NodeId },
    Run { node: NodeId },
}

/// What the open checkpoint rewinds to when undone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CheckpointRecord {
    Reroll { node: NodeId },
    FightCell { cell: NodeId },
}

/// The rollback log as saved state: the checkpoint opener plus every step
/// recorded since it. Node references are arena indices, stable across a
/// re-parse of the same section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoRecord {
    #[serde(default)]
    pub creator: Option<CheckpointRecord>,
    #[serde(default)]
    pub steps: Vec<StepRecord>,
}

/// A scene-level save: section variables plus each node's property set.
/// Loading replays these records against a freshly re-parsed tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneSnapshot {
    pub schema_version: String,
    pub section: String,
    pub rng_state: u32,
    pub variables: BTreeMap<String, i32>,
    pub root: NodeRecord,
    /// absent when nothing undoable has happened yet
    #[serde(default)]
    pub undo: Option<UndoRecord>,
}
