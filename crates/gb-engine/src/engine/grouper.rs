use gb_core::{GamebookError, GrouperId, NodeId, RunOutcome};

use super::lifecycle::GamebookEngine;

/// One schedulable unit of a step list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Step {
    /// Make the node visible and move on.
    Enable(NodeId),
    /// Run the node's own logic; it may suspend the chain.
    Run(NodeId),
}

/// Where a grouper reports when its last step completes.
#[derive(Debug, Clone, Copy)]
pub(super) enum CompletionTarget {
    /// Bubble to the parent grouper, resuming after the owner step.
    Parent,
    While(NodeId),
    Round(NodeId),
    Damage(NodeId),
    Flee(NodeId),
}

#[derive(Debug)]
pub(super) struct GrouperData {
    pub(super) steps: Vec<Step>,
    pub(super) cursor: usize,
    pub(super) completed: bool,
    pub(super) parent: Option<GrouperId>,
    /// the step in the parent list this grouper runs under
    pub(super) owner: Option<Step>,
    pub(super) on_complete: CompletionTarget,
}

impl GamebookEngine {
    pub(super) fn new_grouper(
        &mut self,
        parent: Option<GrouperId>,
        owner: Option<Step>,
        on_complete: CompletionTarget,
    ) -> GrouperId {
        let id = self.next_grouper_id();
        self.groupers.push(GrouperData {
            steps: Vec::new(),
            cursor: 0,
            completed: false,
            parent,
            owner,
            on_complete,
        });
        id
    }

    pub(super) fn add_step(&mut self, grouper: GrouperId, step: Step) {
        self.groupers[grouper.0].steps.push(step);
    }

    /// Runs steps from the cursor until one suspends or the list ends.
    /// Already-completed groupers return Complete without re-running.
    pub(super) fn execute_grouper(
        &mut self,
        grouper: GrouperId,
    ) -> Result<RunOutcome, GamebookError> {
        if self.groupers[grouper.0].completed {
            return Ok(RunOutcome::Complete);
        }
        loop {
            let cursor = self.groupers[grouper.0].cursor;
            let Some(step) = self.groupers[grouper.0].steps.get(cursor).copied() else {
                self.groupers[grouper.0].completed = true;
                return Ok(RunOutcome::Complete);
            };
            self.undo.record(step);
            match self.run_step(step)? {
                RunOutcome::Complete => {
                    self.groupers[grouper.0].cursor = cursor + 1;
                }
                RunOutcome::Suspended => return Ok(RunOutcome::Suspended),
            }
        }
    }

    /// Resumes a suspended grouper after the given step (or from the top)
    /// and routes its completion upward when the list finishes.
    pub(super) fn continue_grouper_from(
        &mut self,
        grouper: GrouperId,
        after: Option<Step>,
        background: bool,
    ) -> Result<(), GamebookError> {
        let start = match after {
            None => 0,
            Some(step) => {
                match self.groupers[grouper.0]
                    .steps
                    .iter()
                    .position(|candidate| *candidate == step)
                {
                    Some(index) => index + 1,
                    None => {
                        log::warn!("continued grouper from a step it does not hold");
                        self.groupers[grouper.0].cursor
                    }
                }
            }
        };
        self.groupers[grouper.0].cursor = start;
        match self.execute_grouper(grouper)? {
            RunOutcome::Suspended => Ok(()),
            RunOutcome::Complete => {
                self.undo.ignore_less();
                let parent = self.groupers[grouper.0].parent;
                let owner = self.groupers[grouper.0].owner;
                match self.groupers[grouper.0].on_complete {
                    CompletionTarget::Parent => match parent {
                        Some(parent) => self.continue_grouper_from(parent, owner, background),
                        None => Ok(()),
                    },
                    CompletionTarget::While(node) => self.while_chain_done(node, background),
                    CompletionTarget::Round(node) => self.fight_round_done(node),
                    CompletionTarget::Damage(node) => self.fight_damage_done(node),
                    CompletionTarget::Flee(node) => self.fight_flee_done(node),
                }
            }
        }
    }

    /// Puts a grouper back to its pristine state, resetting every step in
    /// list order so a fresh pass re-runs them.
    pub(super) fn reset_grouper(&mut self, grouper: GrouperId) {
        let steps: Vec<Step> = self.groupers[grouper.0].steps.clone();
        for step in steps {
            self.reset_step(step);
        }
        self.groupers[grouper.0].cursor = 0;
        self.groupers[grouper.0].completed = false;
    }

    fn run_step(&mut self, step: Step) -> Result<RunOutcome, GamebookError> {
        match step {
            Step::Enable(node) => {
                self.nodes[node.0].was_enabled = self.nodes[node.0].enabled;
                self.set_enabled(node, true);
                Ok(RunOutcome::Complete)
            }
            Step::Run(node) => self.run_node(node),
        }
    }

    /// Kicks off the scene from its root grouper. Steps that run during
    /// this first chain are not undoable; the log opens at the first roll.
    pub fn start_execution(&mut self) -> Result<RunOutcome, GamebookError> {
        let Some(root) = self.root else {
            return Err(GamebookError::new(
                "ENGINE_NO_SCENE",
                "no section has been built yet",
            ));
        };
        let grouper = match &self.nodes[root.0].kind {
            super::node::NodeKind::Section { grouper } => *grouper,
            _ => {
                return Err(GamebookError::new(
                    "ENGINE_NO_SCENE",
                    "scene root is not a section node",
                ))
            }
        };
        self.undo.ignore_more();
        let outcome = self.execute_grouper(grouper)?;
        if outcome == RunOutcome::Complete {
            self.undo.ignore_less();
        }
        Ok(outcome)
    }
}
