use gb_core::{Attributes, GamebookError, GrouperId, NodeId, RunOutcome, SceneEvent, StyleHint};

use super::grouper::{CompletionTarget, Step};
use super::lifecycle::GamebookEngine;

#[derive(Debug)]
pub(super) struct NodeData {
    pub(super) tag: String,
    pub(super) kind: NodeKind,
    pub(super) parent: Option<NodeId>,
    pub(super) children: Vec<NodeId>,
    pub(super) enabled: bool,
    /// enabled state just before the last Enable step touched this node
    pub(super) was_enabled: bool,
    pub(super) had_content: bool,
}

impl NodeData {
    pub(super) fn new(tag: &str, kind: NodeKind, parent: Option<NodeId>) -> Self {
        Self {
            tag: tag.to_string(),
            kind,
            parent,
            children: Vec::new(),
            enabled: false,
            was_enabled: false,
            had_content: false,
        }
    }
}

#[derive(Debug)]
pub(super) enum NodeKind {
    Section { grouper: GrouperId },
    Paragraph,
    Adjust { amount: i32, var: Option<String> },
    Random(RandomState),
    Difficulty(DifficultyState),
    Reroll,
    While(WhileState),
    Item {
        name: String,
        combat_bonus: i32,
        defence_bonus: i32,
        taken: bool,
    },
    Goto { section: String, flee: bool, executed: bool },
    Fight(usize),
    AttackCell { fight: usize },
    DefendCell { fight: usize },
    SkipCell { fight: usize },
    FightRound { hook: HookState, pre: bool },
    FightDamage { hook: HookState, replace: bool },
    FleeHook(HookState),
    Unknown,
}

#[derive(Debug)]
pub(super) struct RandomState {
    pub(super) dice: u32,
    pub(super) var: Option<String>,
    pub(super) flag: Option<String>,
    pub(super) force: bool,
    pub(super) result: Option<i32>,
}

#[derive(Debug)]
pub(super) struct DifficultyState {
    pub(super) ability: String,
    pub(super) level: i32,
    pub(super) var: Option<String>,
    pub(super) force: bool,
    pub(super) result: Option<i32>,
}

#[derive(Debug)]
pub(super) struct WhileState {
    pub(super) var: String,
    pub(super) grouper: GrouperId,
    pub(super) do_reset: bool,
}

/// Body shared by the fight hook elements. The owner is filled in when a
/// fight claims the hook during its own execution.
#[derive(Debug)]
pub(super) struct HookState {
    pub(super) grouper: GrouperId,
    pub(super) owner: Option<usize>,
    pub(super) executed: bool,
}

impl GamebookEngine {
    /// Opens a fresh scene rooted at a section node and returns it.
    pub fn begin_section(&mut self, name: &str) -> NodeId {
        self.clear_scene();
        self.section = name.to_string();
        let id = self.next_node_id();
        let grouper = self.new_grouper(None, None, CompletionTarget::Parent);
        self.nodes
            .push(NodeData::new("section", NodeKind::Section { grouper }, None));
        self.root = Some(id);
        id
    }

    pub fn create_node(
        &mut self,
        parent: NodeId,
        tag: &str,
        attrs: Attributes,
    ) -> Result<NodeId, GamebookError> {
        if parent.0 >= self.nodes.len() {
            return Err(GamebookError::new(
                "ENGINE_NODE_RANGE",
                format!("parent node {} does not exist", parent.0),
            ));
        }
        let id = self.next_node_id();
        let kind = match tag {
            "p" => NodeKind::Paragraph,
            "adjust" => NodeKind::Adjust {
                amount: attrs.get_int("amount", 0),
                var: attrs.get_string("var"),
            },
            "random" => {
                let flag = attrs.get_string("flag");
                if let Some(name) = &flag {
                    self.flag_listeners.entry(name.clone()).or_default().push(id);
                }
                NodeKind::Random(RandomState {
                    dice: attrs.get_uint("dice", 2),
                    var: attrs.get_string("var"),
                    flag,
                    force: attrs.get_bool("force", true),
                    result: None,
                })
            }
            "difficulty" => {
                let level = attrs.get_int("level", -1);
                if level < 0 {
                    log::warn!("difficulty element without a usable level attribute");
                }
                NodeKind::Difficulty(DifficultyState {
                    ability: attrs.get_string("ability").unwrap_or_else(|| {
                        log::warn!("difficulty element without an ability attribute");
                        "combat".to_string()
                    }),
                    level,
                    var: attrs.get_string("var"),
                    force: attrs.get_bool("force", true),
                    result: None,
                })
            }
            "reroll" => NodeKind::Reroll,
            "while" => {
                let grouper =
                    self.new_grouper(None, None, CompletionTarget::While(id));
                NodeKind::While(WhileState {
                    var: attrs.get_string("var").unwrap_or_else(|| {
                        log::warn!("while element without a var attribute never loops");
                        String::new()
                    }),
                    grouper,
                    do_reset: false,
                })
            }
            "item" => NodeKind::Item {
                name: attrs.get_string("name").unwrap_or_else(|| {
                    log::warn!("item element without a name attribute");
                    String::new()
                }),
                combat_bonus: attrs.get_int("combat", 0),
                defence_bonus: attrs.get_int("defence", 0),
                taken: false,
            },
            "goto" | "choice" => {
                let flee = attrs.get_bool("flee", false);
                if flee {
                    self.flee_targets.push(id);
                }
                NodeKind::Goto {
                    section: attrs.get_string("section").unwrap_or_default(),
                    flee,
                    executed: false,
                }
            }
            "fightround" => {
                let grouper =
                    self.new_grouper(None, None, CompletionTarget::Round(id));
                self.loose_round_nodes.push(id);
                NodeKind::FightRound {
                    hook: HookState {
                        grouper,
                        owner: None,
                        executed: false,
                    },
                    pre: attrs.get_bool("pre", false),
                }
            }
            "fightdamage" => {
                let grouper =
                    self.new_grouper(None, None, CompletionTarget::Damage(id));
                self.loose_damage_nodes.push(id);
                NodeKind::FightDamage {
                    hook: HookState {
                        grouper,
                        owner: None,
                        executed: false,
                    },
                    replace: attrs
                        .get("type")
                        .map(|t| t.starts_with("repl"))
                        .unwrap_or(false),
                }
            }
            "flee" => {
                let grouper = self.new_grouper(None, None, CompletionTarget::Flee(id));
                self.loose_flee_nodes.push(id);
                NodeKind::FleeHook(HookState {
                    grouper,
                    owner: None,
                    executed: false,
                })
            }
            "fight" => NodeKind::Fight(self.fights.len()),
            other => {
                log::warn!("unknown element \"{}\" treated as plain container", other);
                NodeKind::Unknown
            }
        };
        let is_fight = matches!(kind, NodeKind::Fight(_));
        self.nodes.push(NodeData::new(tag, kind, Some(parent)));
        self.nodes[parent.0].children.push(id);
        if is_fight {
            self.create_fight(id, &attrs);
        }
        Ok(id)
    }

    /// Text content inside an element; actionable elements use it as their
    /// label in place of the built-in one.
    pub fn handle_content(&mut self, node: NodeId, text: &str) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }
        let style = match &self.nodes[node.0].kind {
            NodeKind::Random(_)
            | NodeKind::Difficulty(_)
            | NodeKind::Reroll
            | NodeKind::Item { .. }
            | NodeKind::Goto { .. }
            | NodeKind::AttackCell { .. }
            | NodeKind::DefendCell { .. }
            | NodeKind::SkipCell { .. } => StyleHint::Action,
            _ => StyleHint::Plain,
        };
        self.nodes[node.0].had_content = true;
        let text = trimmed.to_string();
        self.push_event(SceneEvent::Content { node, text, style });
    }

    /// Closes an element: emits the default label when no content was given
    /// and registers the node as a step with its enclosing grouper.
    pub fn handle_end_tag(&mut self, node: NodeId) -> Result<(), GamebookError> {
        let had_content = self.nodes[node.0].had_content;
        let default_label = if had_content {
            None
        } else {
            match &self.nodes[node.0].kind {
                NodeKind::Random(rs) => Some(if rs.dice == 1 {
                    "Roll one die".to_string()
                } else {
                    format!("Roll {} dice", rs.dice)
                }),
                NodeKind::Difficulty(ds) => Some(format!(
                    "Make a {} roll at Difficulty {}",
                    ds.ability.to_uppercase(),
                    ds.level
                )),
                NodeKind::Reroll => Some("Roll again".to_string()),
                NodeKind::Item { name, .. } => Some(format!("Take the {}", name)),
                NodeKind::Goto { flee: true, .. } => Some("Flee".to_string()),
                NodeKind::Goto { section, .. } => Some(format!("Turn to {}", section)),
                _ => None,
            }
        };
        if let Some(label) = default_label {
            self.handle_content(node, &label);
        }
        let step = match &self.nodes[node.0].kind {
            NodeKind::Paragraph | NodeKind::Unknown => Some(Step::Enable(node)),
            NodeKind::Random(_)
            | NodeKind::Difficulty(_)
            | NodeKind::Reroll
            | NodeKind::While(_)
            | NodeKind::Item { .. }
            | NodeKind::Goto { .. }
            | NodeKind::Fight(_) => Some(Step::Run(node)),
            _ => None,
        };
        if let Some(step) = step {
            let grouper = self.find_enclosing_grouper(node)?;
            self.add_step(grouper, step);
        }
        Ok(())
    }

    /// Walks up the tree to the nearest ancestor that owns a step list.
    pub(super) fn find_enclosing_grouper(
        &self,
        node: NodeId,
    ) -> Result<GrouperId, GamebookError> {
        let mut cursor = self.nodes[node.0].parent;
        while let Some(id) = cursor {
            match &self.nodes[id.0].kind {
                NodeKind::Section { grouper } => return Ok(*grouper),
                NodeKind::While(ws) => return Ok(ws.grouper),
                NodeKind::FightRound { hook, .. }
                | NodeKind::FightDamage { hook, .. }
                | NodeKind::FleeHook(hook) => return Ok(hook.grouper),
                _ => cursor = self.nodes[id.0].parent,
            }
        }
        Err(GamebookError::new(
            "ENGINE_NO_GROUPER",
            format!("node {} has no enclosing grouper", node.0),
        ))
    }

    pub(super) fn set_enabled(&mut self, node: NodeId, enabled: bool) {
        if self.nodes[node.0].enabled != enabled {
            self.nodes[node.0].enabled = enabled;
            self.push_event(SceneEvent::EnabledChanged { node, enabled });
        }
    }

    /// Sum of the adjustments declared as direct children of a roll node.
    pub(super) fn adjustment_total(&self, node: NodeId) -> i32 {
        let mut total = 0;
        for child in &self.nodes[node.0].children {
            if let NodeKind::Adjust { amount, var } = &self.nodes[child.0].kind {
                total += amount;
                if let Some(name) = var {
                    total += self.state.variables.get(name).copied().unwrap_or(0);
                }
            }
        }
        total
    }

    pub(super) fn run_node(&mut self, node: NodeId) -> Result<RunOutcome, GamebookError> {
        match &self.nodes[node.0].kind {
            NodeKind::Random(rs) => {
                if rs.result.is_some() {
                    return Ok(RunOutcome::Complete);
                }
                if let Some(flag) = rs.flag.clone() {
                    if !self.state.flag(&flag) {
                        return Ok(RunOutcome::Complete);
                    }
                }
                let force = rs.force;
                self.set_enabled(node, true);
                Ok(if force {
                    RunOutcome::Suspended
                } else {
                    RunOutcome::Complete
                })
            }
            NodeKind::Difficulty(ds) => {
                if ds.result.is_some() {
                    return Ok(RunOutcome::Complete);
                }
                let force = ds.force;
                self.set_enabled(node, true);
                Ok(if force {
                    RunOutcome::Suspended
                } else {
                    RunOutcome::Complete
                })
            }
            NodeKind::Reroll => {
                // Blocks on purpose: activating it backtracks via undo, so
                // nothing past this point should have run yet.
                self.set_enabled(node, true);
                Ok(RunOutcome::Suspended)
            }
            NodeKind::While(_) => self.run_while_loop(node),
            NodeKind::Item { taken, .. } => {
                if !taken {
                    self.set_enabled(node, true);
                }
                Ok(RunOutcome::Complete)
            }
            NodeKind::Goto { executed, .. } => {
                if !executed {
                    self.set_enabled(node, true);
                }
                Ok(RunOutcome::Complete)
            }
            NodeKind::Fight(idx) => {
                let idx = *idx;
                self.execute_fight(idx)
            }
            _ => Ok(RunOutcome::Complete),
        }
    }

    pub(super) fn run_while_loop(&mut self, node: NodeId) -> Result<RunOutcome, GamebookError> {
        for _ in 0..10_000 {
            let (var, grouper, do_reset) = match &self.nodes[node.0].kind {
                NodeKind::While(ws) => (ws.var.clone(), ws.grouper, ws.do_reset),
                _ => return Ok(RunOutcome::Complete),
            };
            if self.state.variables.contains_key(&var) {
                return Ok(RunOutcome::Complete);
            }
            if do_reset {
                self.reset_grouper(grouper);
            }
            if let NodeKind::While(ws) = &mut self.nodes[node.0].kind {
                ws.do_reset = true;
            }
            self.undo.ignore_more();
            match self.execute_grouper(grouper)? {
                RunOutcome::Complete => self.undo.ignore_less(),
                RunOutcome::Suspended => return Ok(RunOutcome::Suspended),
            }
        }
        Err(GamebookError::new(
            "ENGINE_WHILE_LIMIT",
            "while loop ran 10000 passes without its variable being set",
        ))
    }

    /// Completion callback for a while body that finished asynchronously.
    pub(super) fn while_chain_done(
        &mut self,
        node: NodeId,
        background: bool,
    ) -> Result<(), GamebookError> {
        match self.run_while_loop(node)? {
            RunOutcome::Suspended => Ok(()),
            RunOutcome::Complete => {
                let grouper = self.find_enclosing_grouper(node)?;
                self.continue_grouper_from(grouper, Some(Step::Run(node)), background)
            }
        }
    }

    pub fn node_tag(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(node.0).map(|n| n.tag.as_str())
    }

    pub fn is_enabled(&self, node: NodeId) -> bool {
        self.nodes.get(node.0).map(|n| n.enabled).unwrap_or(false)
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(node.0)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// Enabled nodes the player can act on right now, in document order.
    pub fn enabled_action_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, data)| {
                data.enabled
                    && matches!(
                        data.kind,
                        NodeKind::Random(_)
                            | NodeKind::Difficulty(_)
                            | NodeKind::Reroll
                            | NodeKind::Item { .. }
                            | NodeKind::Goto { .. }
                            | NodeKind::AttackCell { .. }
                            | NodeKind::DefendCell { .. }
                            | NodeKind::SkipCell { .. }
                    )
            })
            .map(|(index, _)| NodeId(index))
            .collect()
    }
}
