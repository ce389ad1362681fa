use std::collections::BTreeMap;

use gb_core::{
    CheckpointRecord, GamebookError, GrouperId, NodeId, NodeRecord, SceneEvent, SceneSnapshot,
    StepRecord, UndoRecord, SNAPSHOT_SCHEMA,
};

use super::grouper::Step;
use super::lifecycle::GamebookEngine;
use super::node::NodeKind;
use super::undo::UndoCreator;

type Props = BTreeMap<String, String>;

fn put_bool(props: &mut Props, key: &str, value: bool) {
    if value {
        props.insert(key.to_string(), "true".to_string());
    }
}

fn put_i32(props: &mut Props, key: &str, value: i32) {
    props.insert(key.to_string(), value.to_string());
}

fn prop_bool(props: &Props, key: &str) -> bool {
    props.get(key).map(|raw| raw == "true").unwrap_or(false)
}

fn prop_i32(props: &Props, key: &str, default: i32) -> i32 {
    props
        .get(key)
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

impl GamebookEngine {
    /// Captures the scene as a property record per node. Pending dice must
    /// be resolved first; a throw cannot be saved half-way.
    pub fn snapshot(&self) -> Result<SceneSnapshot, GamebookError> {
        if self.pending_roller().is_some() {
            return Err(GamebookError::new(
                "SNAPSHOT_PENDING_ROLL",
                "cannot save while a dice roll is waiting to be thrown",
            ));
        }
        let Some(root) = self.root else {
            return Err(GamebookError::new(
                "SNAPSHOT_NO_SCENE",
                "no section has been built yet",
            ));
        };
        Ok(SceneSnapshot {
            schema_version: SNAPSHOT_SCHEMA.to_string(),
            section: self.section.clone(),
            rng_state: self.rng_state,
            variables: self.state.variables.clone(),
            root: self.node_record(root),
            undo: self.undo_record(),
        })
    }

    /// Replays a snapshot against a freshly parsed copy of the same
    /// section. The tree must match record for record.
    pub fn resume(&mut self, snapshot: &SceneSnapshot) -> Result<(), GamebookError> {
        if snapshot.schema_version != SNAPSHOT_SCHEMA {
            return Err(GamebookError::new(
                "SNAPSHOT_SCHEMA",
                format!(
                    "snapshot schema \"{}\" is not \"{}\"",
                    snapshot.schema_version, SNAPSHOT_SCHEMA
                ),
            ));
        }
        if snapshot.section != self.section {
            return Err(GamebookError::new(
                "SNAPSHOT_SECTION",
                format!(
                    "snapshot was taken in section \"{}\", not \"{}\"",
                    snapshot.section, self.section
                ),
            ));
        }
        let Some(root) = self.root else {
            return Err(GamebookError::new(
                "SNAPSHOT_NO_SCENE",
                "no section has been built yet",
            ));
        };
        self.rng_state = snapshot.rng_state;
        self.state.variables = snapshot.variables.clone();
        self.apply_record(root, &snapshot.root)?;
        if let Some(record) = &snapshot.undo {
            self.load_undo_record(record)?;
        }
        Ok(())
    }

    fn undo_record(&self) -> Option<UndoRecord> {
        if self.undo.is_empty() {
            return None;
        }
        let creator = match self.undo.creator() {
            UndoCreator::Null => None,
            UndoCreator::Reroll(node) => Some(CheckpointRecord::Reroll { node }),
            UndoCreator::FightCell(cell) => Some(CheckpointRecord::FightCell { cell }),
        };
        let steps = self
            .undo
            .entries()
            .iter()
            .map(|step| match *step {
                Step::Enable(node) => StepRecord::Enable { node },
                Step::Run(node) => StepRecord::Run { node },
            })
            .collect();
        Some(UndoRecord { creator, steps })
    }

    /// Re-arms the rollback log from saved state, so the roll taken just
    /// before the save can still be taken back after a resume.
    fn load_undo_record(&mut self, record: &UndoRecord) -> Result<(), GamebookError> {
        let bound = self.nodes.len();
        let check = |node: NodeId| {
            if node.0 < bound {
                Ok(node)
            } else {
                Err(GamebookError::new(
                    "SNAPSHOT_SHAPE",
                    format!("undo record points at node {} outside the parsed tree", node.0),
                ))
            }
        };
        let mut entries = Vec::with_capacity(record.steps.len());
        for step in &record.steps {
            entries.push(match *step {
                StepRecord::Enable { node } => Step::Enable(check(node)?),
                StepRecord::Run { node } => Step::Run(check(node)?),
            });
        }
        let creator = match record.creator {
            None => UndoCreator::Null,
            Some(CheckpointRecord::Reroll { node }) => UndoCreator::Reroll(check(node)?),
            Some(CheckpointRecord::FightCell { cell }) => UndoCreator::FightCell(check(cell)?),
        };
        self.undo.restore(entries, creator);
        Ok(())
    }

    fn node_record(&self, id: NodeId) -> NodeRecord {
        NodeRecord {
            tag: self.nodes[id.0].tag.clone(),
            props: self.save_props(id),
            children: self.nodes[id.0]
                .children
                .iter()
                .map(|child| self.node_record(*child))
                .collect(),
        }
    }

    fn save_grouper(&self, props: &mut Props, grouper: GrouperId) {
        put_i32(props, "cursor", self.groupers[grouper.0].cursor as i32);
        put_bool(props, "done", self.groupers[grouper.0].completed);
    }

    fn load_grouper(&mut self, props: &Props, grouper: GrouperId) {
        self.groupers[grouper.0].cursor = prop_i32(props, "cursor", 0).max(0) as usize;
        self.groupers[grouper.0].completed = prop_bool(props, "done");
    }

    fn save_props(&self, id: NodeId) -> Props {
        let data = &self.nodes[id.0];
        let mut props = Props::new();
        put_bool(&mut props, "enabled", data.enabled);
        put_bool(&mut props, "wasEnabled", data.was_enabled);
        match &data.kind {
            NodeKind::Section { grouper } => self.save_grouper(&mut props, *grouper),
            NodeKind::Random(rs) => {
                if let Some(result) = rs.result {
                    put_i32(&mut props, "result", result);
                }
            }
            NodeKind::Difficulty(ds) => {
                if let Some(result) = ds.result {
                    put_i32(&mut props, "result", result);
                }
            }
            NodeKind::While(ws) => {
                put_bool(&mut props, "reset", ws.do_reset);
                self.save_grouper(&mut props, ws.grouper);
            }
            NodeKind::Item { taken, .. } => put_bool(&mut props, "taken", *taken),
            NodeKind::Goto { executed, .. } => put_bool(&mut props, "executed", *executed),
            NodeKind::FightRound { hook, .. }
            | NodeKind::FightDamage { hook, .. }
            | NodeKind::FleeHook(hook) => {
                put_bool(&mut props, "executed", hook.executed);
                self.save_grouper(&mut props, hook.grouper);
            }
            NodeKind::Fight(idx) => {
                let fight = &self.fights[*idx];
                put_i32(&mut props, "stamina", fight.stamina);
                put_i32(&mut props, "attackNumber", fight.attack_number as i32);
                put_i32(&mut props, "attackDamage", fight.attack_damage_done);
                put_i32(&mut props, "defendDamage", fight.defend_damage_done);
                put_i32(&mut props, "potionBonus", fight.potion_bonus);
                put_i32(&mut props, "defenceBonus", fight.defence_bonus);
                put_i32(&mut props, "attackBonus", fight.attack_bonus);
                put_bool(&mut props, "ended", fight.ended);
                put_bool(&mut props, "fled", fight.fled);
                put_bool(&mut props, "skipping", fight.skipping);
                put_bool(&mut props, "firstAttack", fight.first_attack_done);
                put_bool(&mut props, "prepped", fight.prepped);
                put_bool(&mut props, "hookedUp", fight.hooked_up);
                put_bool(&mut props, "bonusesActive", fight.bonuses_active);
            }
            _ => {}
        }
        props
    }

    fn apply_record(&mut self, id: NodeId, record: &NodeRecord) -> Result<(), GamebookError> {
        if record.tag != self.nodes[id.0].tag {
            return Err(GamebookError::new(
                "SNAPSHOT_SHAPE",
                format!(
                    "snapshot node \"{}\" does not match parsed node \"{}\"",
                    record.tag, self.nodes[id.0].tag
                ),
            ));
        }
        if record.children.len() != self.nodes[id.0].children.len() {
            return Err(GamebookError::new(
                "SNAPSHOT_SHAPE",
                format!(
                    "snapshot node \"{}\" has {} children, parsed node has {}",
                    record.tag,
                    record.children.len(),
                    self.nodes[id.0].children.len()
                ),
            ));
        }
        self.load_props(id, &record.props);
        let children = self.nodes[id.0].children.clone();
        for (child, child_record) in children.into_iter().zip(record.children.iter()) {
            self.apply_record(child, child_record)?;
        }
        Ok(())
    }

    fn load_props(&mut self, id: NodeId, props: &Props) {
        self.set_enabled(id, prop_bool(props, "enabled"));
        self.nodes[id.0].was_enabled = prop_bool(props, "wasEnabled");
        let grouper = match &mut self.nodes[id.0].kind {
            NodeKind::Section { grouper } => Some(*grouper),
            NodeKind::Random(rs) => {
                rs.result = props.get("result").and_then(|raw| raw.parse().ok());
                None
            }
            NodeKind::Difficulty(ds) => {
                ds.result = props.get("result").and_then(|raw| raw.parse().ok());
                None
            }
            NodeKind::While(ws) => {
                ws.do_reset = prop_bool(props, "reset");
                Some(ws.grouper)
            }
            NodeKind::Item { taken, .. } => {
                *taken = prop_bool(props, "taken");
                None
            }
            NodeKind::Goto { executed, .. } => {
                *executed = prop_bool(props, "executed");
                None
            }
            NodeKind::FightRound { hook, .. }
            | NodeKind::FightDamage { hook, .. }
            | NodeKind::FleeHook(hook) => {
                hook.executed = prop_bool(props, "executed");
                Some(hook.grouper)
            }
            NodeKind::Fight(idx) => {
                let idx = *idx;
                self.load_fight_props(idx, props);
                None
            }
            _ => None,
        };
        if let Some(grouper) = grouper {
            self.load_grouper(props, grouper);
        }
    }

    fn load_fight_props(&mut self, idx: usize, props: &Props) {
        let initial = self.fights[idx].initial_stamina;
        let stamina = prop_i32(props, "stamina", initial).clamp(0, initial);
        self.fights[idx].stamina = stamina;
        self.fights[idx].attack_number = prop_i32(props, "attackNumber", 0).max(0) as u32;
        self.fights[idx].attack_damage_done = prop_i32(props, "attackDamage", 0);
        self.fights[idx].defend_damage_done = prop_i32(props, "defendDamage", 0);
        self.fights[idx].potion_bonus = prop_i32(props, "potionBonus", 0);
        self.fights[idx].defence_bonus = prop_i32(props, "defenceBonus", 0);
        self.fights[idx].attack_bonus = prop_i32(props, "attackBonus", 0);
        self.fights[idx].ended = prop_bool(props, "ended");
        self.fights[idx].fled = prop_bool(props, "fled");
        self.fights[idx].skipping = prop_bool(props, "skipping");
        self.fights[idx].first_attack_done = prop_bool(props, "firstAttack");
        self.fights[idx].prepped = prop_bool(props, "prepped");
        self.fights[idx].bonuses_active = prop_bool(props, "bonusesActive");
        let fight = self.fights[idx].node;
        self.push_event(SceneEvent::StaminaChanged { fight, stamina });
        // re-claim hooks and flee targets from the fresh parse
        if prop_bool(props, "hookedUp") {
            self.fights[idx].hooked_up = false;
            self.hookup_nodes(idx);
        }
    }
}
