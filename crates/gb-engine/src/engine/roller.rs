use gb_core::{GamebookError, NodeId, RollerId, SceneEvent};

use super::grouper::Step;
use super::lifecycle::GamebookEngine;
use super::node::NodeKind;
use super::rng::roll_dice;
use super::undo::UndoCreator;

/// What a resolved roll feeds into.
#[derive(Debug, Clone, Copy)]
pub(super) enum RollTarget {
    Random(NodeId),
    Difficulty(NodeId),
    /// player attack for the given fight node
    Attack(NodeId),
    /// enemy attack against the player for the given fight node
    Defend(NodeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum RollState {
    Pending,
    Resolved(i32),
}

/// Single-use dice request. Created pending, resolved exactly once.
#[derive(Debug)]
pub(super) struct RollerData {
    pub(super) dice: u32,
    pub(super) modifier: i32,
    pub(super) state: RollState,
    pub(super) target: RollTarget,
}

impl GamebookEngine {
    /// Issues a dice request and emits it to the host. Under instant mode,
    /// or while a fight is being skipped, it resolves on the spot.
    pub(super) fn start_roller(
        &mut self,
        dice: u32,
        modifier: i32,
        target: RollTarget,
    ) -> Result<RollerId, GamebookError> {
        if dice == 0 {
            return Err(GamebookError::new(
                "ROLLER_DICE_COUNT",
                "a roll needs at least one die",
            ));
        }
        let id = self.next_roller_id();
        self.rollers.push(RollerData {
            dice,
            modifier,
            state: RollState::Pending,
            target,
        });
        self.push_event(SceneEvent::RollRequested {
            roller: id,
            dice,
            modifier,
        });
        let instant = self.instant_rolls
            || match target {
                RollTarget::Attack(node) | RollTarget::Defend(node) => self
                    .fight_index(node)
                    .map(|idx| self.fights[idx].skipping)
                    .unwrap_or(false),
                _ => false,
            };
        if instant {
            self.trigger_roll(id)?;
        }
        Ok(id)
    }

    /// The newest unresolved roll, if any.
    pub fn pending_roller(&self) -> Option<RollerId> {
        self.rollers
            .iter()
            .rposition(|roller| roller.state == RollState::Pending)
            .map(RollerId)
    }

    pub fn roller_result(&self, roller: RollerId) -> Result<i32, GamebookError> {
        match self.rollers.get(roller.0).map(|r| r.state) {
            Some(RollState::Resolved(total)) => Ok(total),
            Some(RollState::Pending) => Err(GamebookError::new(
                "ROLLER_NOT_RESOLVED",
                format!("roller {} has not been thrown yet", roller.0),
            )),
            None => Err(GamebookError::new(
                "ROLLER_UNKNOWN",
                format!("roller {} does not exist", roller.0),
            )),
        }
    }

    /// Throws the dice for a pending roller and dispatches the total to
    /// the waiting target in the same call.
    pub fn trigger_roll(&mut self, roller: RollerId) -> Result<(), GamebookError> {
        let Some(data) = self.rollers.get(roller.0) else {
            return Err(GamebookError::new(
                "ROLLER_UNKNOWN",
                format!("roller {} does not exist", roller.0),
            ));
        };
        if data.state != RollState::Pending {
            return Err(GamebookError::new(
                "ROLLER_RESOLVED_TWICE",
                format!("roller {} has already been thrown", roller.0),
            ));
        }
        let dice = data.dice;
        let modifier = data.modifier;
        let target = data.target;
        let total = roll_dice(&mut self.rng_state, dice) + modifier;
        self.rollers[roller.0].state = RollState::Resolved(total);
        self.push_event(SceneEvent::RollResolved {
            roller,
            result: total,
        });
        match target {
            RollTarget::Random(node) => self.random_roll_finished(node, total),
            RollTarget::Difficulty(node) => self.difficulty_roll_finished(node, total),
            RollTarget::Attack(node) => self.attack_roll_finished(node, total),
            RollTarget::Defend(node) => self.defend_roll_finished(node, total),
        }
    }

    fn random_roll_finished(&mut self, node: NodeId, total: i32) -> Result<(), GamebookError> {
        let var = match &mut self.nodes[node.0].kind {
            NodeKind::Random(rs) => {
                rs.result = Some(total);
                rs.var.clone()
            }
            _ => None,
        };
        if let Some(var) = var {
            self.state.variables.insert(var, total);
        }
        self.roll_checkpoint_and_continue(node)
    }

    fn difficulty_roll_finished(&mut self, node: NodeId, total: i32) -> Result<(), GamebookError> {
        let var = match &mut self.nodes[node.0].kind {
            NodeKind::Difficulty(ds) => {
                ds.result = Some(total);
                ds.var.clone()
            }
            _ => None,
        };
        if let Some(var) = var {
            self.state.variables.insert(var, total);
        }
        self.roll_checkpoint_and_continue(node)
    }

    /// A resolved roll opens the next undo checkpoint and resumes the
    /// suspended chain right after the roll node's step.
    fn roll_checkpoint_and_continue(&mut self, node: NodeId) -> Result<(), GamebookError> {
        self.undo.checkpoint(UndoCreator::Reroll(node));
        self.undo.record(Step::Run(node));
        let grouper = self.find_enclosing_grouper(node)?;
        self.continue_grouper_from(grouper, Some(Step::Run(node)), true)
    }
}
