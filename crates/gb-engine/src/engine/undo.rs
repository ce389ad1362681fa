use gb_core::{GamebookError, NodeId};

use super::grouper::Step;
use super::lifecycle::GamebookEngine;
use super::node::NodeKind;

/// What re-opening the log should put back in front of the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum UndoCreator {
    Null,
    /// a resolved roll node that undo re-enables for another throw
    Reroll(NodeId),
    /// a fight cell whose damage undo takes back
    FightCell(NodeId),
}

/// Single-level rollback log. Records the steps run since the last
/// checkpoint; nested groupers raise the ignore counter so only the
/// outermost chain is recorded.
#[derive(Debug)]
pub(super) struct UndoLog {
    entries: Vec<Step>,
    ignore_calls: u32,
    creator: UndoCreator,
}

impl UndoLog {
    pub(super) fn new() -> Self {
        Self {
            entries: Vec::new(),
            ignore_calls: 0,
            creator: UndoCreator::Null,
        }
    }

    /// Opens a fresh checkpoint, discarding anything recorded so far.
    pub(super) fn checkpoint(&mut self, creator: UndoCreator) {
        self.entries.clear();
        self.ignore_calls = 0;
        self.creator = creator;
    }

    pub(super) fn record(&mut self, step: Step) {
        if self.ignore_calls == 0 {
            self.entries.push(step);
        }
    }

    pub(super) fn ignore_more(&mut self) {
        self.ignore_calls += 1;
    }

    pub(super) fn ignore_less(&mut self) {
        if self.ignore_calls == 0 {
            log::debug!("undo ignore counter released more times than raised");
        } else {
            self.ignore_calls -= 1;
        }
    }

    pub(super) fn take(&mut self) -> (Vec<Step>, UndoCreator) {
        let creator = self.creator;
        self.creator = UndoCreator::Null;
        (std::mem::take(&mut self.entries), creator)
    }

    pub(super) fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.creator == UndoCreator::Null
    }

    pub(super) fn entries(&self) -> &[Step] {
        &self.entries
    }

    pub(super) fn creator(&self) -> UndoCreator {
        self.creator
    }

    /// Rebuilds the log from saved state. The counter restarts at zero;
    /// the next checkpoint resets it anyway.
    pub(super) fn restore(&mut self, entries: Vec<Step>, creator: UndoCreator) {
        self.entries = entries;
        self.ignore_calls = 0;
        self.creator = creator;
    }
}

impl GamebookEngine {
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    /// Rolls the scene back to the last checkpoint: every recorded step is
    /// reset most-recent-first, then the checkpoint's own action is put
    /// back in front of the player.
    pub fn undo(&mut self) -> Result<(), GamebookError> {
        let (entries, creator) = self.undo.take();
        for step in entries.iter().rev() {
            self.reset_step(*step);
        }
        match creator {
            UndoCreator::Null => Ok(()),
            UndoCreator::Reroll(node) => {
                self.reopen_roll(node);
                Ok(())
            }
            UndoCreator::FightCell(cell) => self.undo_fight_cell(cell),
        }
    }

    /// Clears a resolved roll so the same node can be thrown again.
    fn reopen_roll(&mut self, node: NodeId) {
        let var = match &mut self.nodes[node.0].kind {
            NodeKind::Random(rs) => {
                rs.result = None;
                rs.var.clone()
            }
            NodeKind::Difficulty(ds) => {
                ds.result = None;
                ds.var.clone()
            }
            _ => None,
        };
        if let Some(var) = var {
            self.state.variables.remove(&var);
        }
        self.set_enabled(node, true);
    }

    /// Puts one step back to its pre-run state.
    pub(super) fn reset_step(&mut self, step: Step) {
        match step {
            Step::Enable(node) => {
                if !self.nodes[node.0].was_enabled {
                    self.set_enabled(node, false);
                }
            }
            Step::Run(node) => self.reset_node(node),
        }
    }

    fn reset_node(&mut self, node: NodeId) {
        enum After {
            Nothing,
            Disable,
            RemoveVar(Option<String>),
            DropItem(Option<String>),
            ResetGrouper(gb_core::GrouperId),
            ResetFight(usize),
        }
        let after = match &mut self.nodes[node.0].kind {
            NodeKind::Random(rs) => {
                rs.result = None;
                After::RemoveVar(rs.var.clone())
            }
            NodeKind::Difficulty(ds) => {
                ds.result = None;
                After::RemoveVar(ds.var.clone())
            }
            NodeKind::Reroll => After::Disable,
            NodeKind::While(ws) => {
                ws.do_reset = false;
                After::ResetGrouper(ws.grouper)
            }
            NodeKind::Item { name, taken, .. } => {
                let dropped = if *taken { Some(name.clone()) } else { None };
                *taken = false;
                After::DropItem(dropped)
            }
            NodeKind::Goto { executed, .. } => {
                *executed = false;
                After::Disable
            }
            NodeKind::Fight(idx) => After::ResetFight(*idx),
            NodeKind::FightRound { hook, .. }
            | NodeKind::FightDamage { hook, .. }
            | NodeKind::FleeHook(hook) => {
                hook.executed = false;
                After::ResetGrouper(hook.grouper)
            }
            _ => After::Nothing,
        };
        match after {
            After::Nothing => return,
            After::Disable => {}
            After::RemoveVar(var) => {
                if let Some(var) = var {
                    self.state.variables.remove(&var);
                }
            }
            After::DropItem(name) => {
                if let Some(name) = name {
                    self.state.possessions.remove_named(&name);
                }
            }
            After::ResetGrouper(grouper) => self.reset_grouper(grouper),
            After::ResetFight(idx) => {
                self.reset_fight(idx);
                return;
            }
        }
        self.set_enabled(node, false);
    }
}
