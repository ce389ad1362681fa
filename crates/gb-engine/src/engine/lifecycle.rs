use std::collections::BTreeMap;

use gb_core::{GrouperId, NodeId, RollerId, SceneEvent};

use super::fight::FightState;
use super::grouper::GrouperData;
use super::node::NodeData;
use super::roller::RollerData;
use super::session::GameState;
use super::undo::UndoLog;

#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub random_seed: Option<u32>,
    /// Resolve every roll synchronously at request time instead of waiting
    /// for an explicit trigger.
    pub instant_rolls: bool,
    pub state: GameState,
}

/// Incremental interpreter for one gamebook section.
///
/// Nodes, groupers, rollers and fights live in arenas owned here; all
/// cross-references are index newtypes, never pointers. Execution advances
/// through grouper step lists and suspends whenever a step needs player
/// input, leaving the engine ready to be resumed, undone or snapshotted.
#[derive(Debug)]
pub struct GamebookEngine {
    pub(super) nodes: Vec<NodeData>,
    pub(super) groupers: Vec<GrouperData>,
    pub(super) rollers: Vec<RollerData>,
    pub(super) fights: Vec<FightState>,

    pub(super) section: String,
    pub(super) root: Option<NodeId>,

    pub(super) undo: UndoLog,
    pub(super) events: Vec<SceneEvent>,
    pub(super) state: GameState,

    /// random nodes keyed by the flag whose changes re-run them
    pub(super) flag_listeners: BTreeMap<String, Vec<NodeId>>,
    /// fight nodes keyed by group name; siblings resolve rounds together
    pub(super) fight_groups: BTreeMap<String, Vec<NodeId>>,

    /// hook nodes parsed before any fight claimed them
    pub(super) loose_round_nodes: Vec<NodeId>,
    pub(super) loose_damage_nodes: Vec<NodeId>,
    pub(super) loose_flee_nodes: Vec<NodeId>,
    pub(super) flee_targets: Vec<NodeId>,

    /// one-shot combat bonus handed in by the host, grabbed at next attack
    pub(super) cached_attack_bonus: i32,

    pub(super) instant_rolls: bool,
    pub(super) rng_state: u32,
    pub(super) initial_seed: u32,
}

impl GamebookEngine {
    pub fn new(options: EngineOptions) -> Self {
        let seed = options.random_seed.unwrap_or(0x9e3779b9);
        Self {
            nodes: Vec::new(),
            groupers: Vec::new(),
            rollers: Vec::new(),
            fights: Vec::new(),
            section: String::new(),
            root: None,
            undo: UndoLog::new(),
            events: Vec::new(),
            state: options.state,
            flag_listeners: BTreeMap::new(),
            fight_groups: BTreeMap::new(),
            loose_round_nodes: Vec::new(),
            loose_damage_nodes: Vec::new(),
            loose_flee_nodes: Vec::new(),
            flee_targets: Vec::new(),
            cached_attack_bonus: 0,
            instant_rolls: options.instant_rolls,
            rng_state: seed,
            initial_seed: seed,
        }
    }

    /// Drops every per-section structure while keeping the game state,
    /// seed and host settings. Called before a new section is parsed.
    pub fn clear_scene(&mut self) {
        self.nodes.clear();
        self.groupers.clear();
        self.rollers.clear();
        self.fights.clear();
        self.section.clear();
        self.root = None;
        self.undo = UndoLog::new();
        self.events.clear();
        self.flag_listeners.clear();
        self.fight_groups.clear();
        self.loose_round_nodes.clear();
        self.loose_damage_nodes.clear();
        self.loose_flee_nodes.clear();
        self.flee_targets.clear();
    }

    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut GameState {
        &mut self.state
    }

    pub fn into_state(self) -> GameState {
        self.state
    }

    /// Queues a combat bonus that the next attack roll will consume.
    pub fn set_attack_bonus(&mut self, bonus: i32) {
        self.cached_attack_bonus = bonus;
    }

    pub fn drain_events(&mut self) -> Vec<SceneEvent> {
        std::mem::take(&mut self.events)
    }

    pub(super) fn push_event(&mut self, event: SceneEvent) {
        self.events.push(event);
    }

    pub(super) fn next_roller_id(&self) -> RollerId {
        RollerId(self.rollers.len())
    }

    pub(super) fn next_grouper_id(&self) -> GrouperId {
        GrouperId(self.groupers.len())
    }

    pub(super) fn next_node_id(&self) -> NodeId {
        NodeId(self.nodes.len())
    }
}
