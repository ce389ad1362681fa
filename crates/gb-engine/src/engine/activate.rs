use gb_core::{GamebookError, NodeId, SceneEvent};

use super::lifecycle::GamebookEngine;
use super::node::NodeKind;
use super::roller::RollTarget;
use super::session::Item;

/// Outcome of activating a node. Skip cells may need a follow-up call
/// before anything happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Done,
    /// both sides could still win; ask before fast-forwarding the fight
    SkipConfirm(NodeId),
    /// neither side can hurt the other; the host must pick the winner
    SkipPickWinner(NodeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipWinner {
    Player,
    Enemy,
}

impl GamebookEngine {
    /// Acts on an enabled node on the player's behalf.
    pub fn activate(&mut self, node: NodeId) -> Result<Activation, GamebookError> {
        if node.0 >= self.nodes.len() {
            return Err(GamebookError::new(
                "ENGINE_NODE_RANGE",
                format!("node {} does not exist", node.0),
            ));
        }
        if !self.nodes[node.0].enabled {
            return Err(GamebookError::new(
                "ENGINE_NODE_DISABLED",
                format!("node {} is not currently enabled", node.0),
            ));
        }
        match &self.nodes[node.0].kind {
            NodeKind::Random(_) => {
                self.activate_random(node)?;
                Ok(Activation::Done)
            }
            NodeKind::Difficulty(_) => {
                self.activate_difficulty(node)?;
                Ok(Activation::Done)
            }
            NodeKind::Reroll => {
                self.set_enabled(node, false);
                self.undo()?;
                Ok(Activation::Done)
            }
            NodeKind::Item { .. } => {
                self.take_item(node);
                Ok(Activation::Done)
            }
            NodeKind::Goto { .. } => self.goto_activated(node),
            NodeKind::AttackCell { fight } => {
                let idx = *fight;
                self.activate_attack(idx)?;
                Ok(Activation::Done)
            }
            NodeKind::DefendCell { fight } => {
                let idx = *fight;
                self.activate_defend(idx)?;
                Ok(Activation::Done)
            }
            NodeKind::SkipCell { fight } => {
                let idx = *fight;
                self.activate_skip(idx)
            }
            _ => Err(GamebookError::new(
                "ENGINE_NOT_ACTIONABLE",
                format!(
                    "node {} (\"{}\") cannot be activated",
                    node.0, self.nodes[node.0].tag
                ),
            )),
        }
    }

    fn activate_random(&mut self, node: NodeId) -> Result<(), GamebookError> {
        let dice = match &self.nodes[node.0].kind {
            NodeKind::Random(rs) => rs.dice,
            _ => return Ok(()),
        };
        let modifier = self.adjustment_total(node);
        self.set_enabled(node, false);
        self.start_roller(dice, modifier, RollTarget::Random(node))?;
        Ok(())
    }

    fn activate_difficulty(&mut self, node: NodeId) -> Result<(), GamebookError> {
        let ability = match &self.nodes[node.0].kind {
            NodeKind::Difficulty(ds) => ds.ability.clone(),
            _ => return Ok(()),
        };
        let modifier = self.state.adventurer.ability(&ability) + self.adjustment_total(node);
        self.set_enabled(node, false);
        self.start_roller(2, modifier, RollTarget::Difficulty(node))?;
        Ok(())
    }

    fn take_item(&mut self, node: NodeId) {
        let taken = match &mut self.nodes[node.0].kind {
            NodeKind::Item {
                name,
                combat_bonus,
                defence_bonus,
                taken,
            } if !*taken => {
                *taken = true;
                Some(Item {
                    name: name.clone(),
                    combat_bonus: *combat_bonus,
                    defence_bonus: *defence_bonus,
                })
            }
            _ => None,
        };
        if let Some(item) = taken {
            self.state.possessions.add(item);
            self.set_enabled(node, false);
        }
    }

    fn goto_activated(&mut self, node: NodeId) -> Result<Activation, GamebookError> {
        // A flee target claimed by a live fight ends that fight instead of
        // navigating; the section change is emitted all the same.
        let fleeing_fight = self.fights.iter().position(|fight| {
            !fight.ended && fight.hooked_up && fight.flee_targets.contains(&node)
        });
        let (section, flee) = match &mut self.nodes[node.0].kind {
            NodeKind::Goto {
                section,
                flee,
                executed,
            } => {
                *executed = true;
                (section.clone(), *flee)
            }
            _ => return Ok(Activation::Done),
        };
        self.set_enabled(node, false);
        if let Some(idx) = fleeing_fight {
            self.flee_target_activated(idx)?;
        }
        self.push_event(SceneEvent::GotoSection { section, flee });
        Ok(Activation::Done)
    }
}
