use gb_core::{Attributes, FightResult, GamebookError, NodeId, RunOutcome, SceneEvent, StyleHint};

use super::activate::{Activation, SkipWinner};
use super::grouper::Step;
use super::lifecycle::GamebookEngine;
use super::node::{NodeData, NodeKind};
use super::roller::RollTarget;
use super::undo::UndoCreator;

/// Per-fight record. Rounds alternate an attack roll against the enemy's
/// defence with `attacks` defend rolls against the player's; grouped
/// fights share their round boundaries.
#[derive(Debug)]
pub(super) struct FightState {
    pub(super) node: NodeId,
    pub(super) name: String,
    pub(super) combat: i32,
    pub(super) defence: i32,
    pub(super) stamina: i32,
    pub(super) initial_stamina: i32,
    /// the enemy gives up once stamina falls to this
    pub(super) flee_at: i32,
    pub(super) player_first: bool,
    pub(super) group: Option<String>,
    pub(super) attack_dice: u32,
    /// enemy attacks per round
    pub(super) attacks: u32,
    /// variable that replaces the player's defence score when set
    pub(super) player_defence_var: Option<String>,
    /// ability that soaks enemy damage instead of stamina
    pub(super) ability_damaged: Option<String>,
    /// codeword or variable dealing opening damage to the enemy
    pub(super) pre_damage: Option<String>,
    /// codeword accumulating the stamina this enemy has lost
    pub(super) stamina_lost: Option<String>,

    pub(super) broken: bool,
    pub(super) ended: bool,
    pub(super) fled: bool,
    pub(super) skipping: bool,
    pub(super) first_attack_done: bool,
    pub(super) prepped: bool,
    pub(super) hooked_up: bool,

    pub(super) potion_bonus: i32,
    pub(super) defence_bonus: i32,
    pub(super) attack_bonus: i32,
    pub(super) bonuses_active: bool,

    pub(super) attack_number: u32,
    pub(super) attack_damage_done: i32,
    pub(super) defend_damage_done: i32,

    pub(super) attack_cell: NodeId,
    pub(super) defend_cell: NodeId,
    pub(super) skip_cell: Option<NodeId>,
    pub(super) round_node: Option<NodeId>,
    pub(super) damage_node: Option<NodeId>,
    pub(super) flee_node: Option<NodeId>,
    pub(super) flee_targets: Vec<NodeId>,
}

impl GamebookEngine {
    pub(super) fn create_fight(&mut self, node: NodeId, attrs: &Attributes) {
        let name = attrs.get_string("name");
        let combat = attrs.get_int("combat", -1);
        let defence = attrs.get_int("defence", -1);
        let stamina = attrs.get_int("stamina", -1);
        let broken = name.is_none() || combat < 0 || defence < 0 || stamina <= 0;
        if broken {
            log::warn!("fight element is missing name, combat, defence or stamina");
        }
        let name = name.unwrap_or_default();
        let group = attrs.get_string("group");
        if let Some(group_name) = &group {
            self.fight_groups
                .entry(group_name.clone())
                .or_default()
                .push(node);
        }
        let attack_cell = self.push_cell(
            node,
            "attack",
            NodeKind::AttackCell {
                fight: self.fights.len(),
            },
            "Attack",
        );
        let defend_cell = self.push_cell(
            node,
            "defend",
            NodeKind::DefendCell {
                fight: self.fights.len(),
            },
            "Defend",
        );
        let skip_cell = self.push_cell(
            node,
            "skip",
            NodeKind::SkipCell {
                fight: self.fights.len(),
            },
            "Skip to the end",
        );
        if !broken {
            self.push_event(SceneEvent::Content {
                node,
                text: format!(
                    "{}, COMBAT {}, Defence {}, Stamina {}",
                    name, combat, defence, stamina
                ),
                style: StyleHint::Italic,
            });
            self.push_event(SceneEvent::StaminaChanged {
                fight: node,
                stamina,
            });
        }
        self.fights.push(FightState {
            node,
            name,
            combat,
            defence,
            stamina,
            initial_stamina: stamina,
            flee_at: attrs.get_int("fleeAt", 0),
            player_first: attrs.get_bool("playerFirst", true),
            group,
            attack_dice: attrs.get_uint("attackDice", 2),
            attacks: attrs.get_uint("attacks", 1).max(1),
            player_defence_var: attrs.get_string("playerDefence"),
            ability_damaged: attrs.get_string("abilityDamaged"),
            pre_damage: attrs.get_string("preDamage"),
            stamina_lost: attrs.get_string("staminaLost"),
            broken,
            ended: false,
            fled: false,
            skipping: false,
            first_attack_done: false,
            prepped: false,
            hooked_up: false,
            potion_bonus: 0,
            defence_bonus: 0,
            attack_bonus: 0,
            bonuses_active: false,
            attack_number: 0,
            attack_damage_done: 0,
            defend_damage_done: 0,
            attack_cell,
            defend_cell,
            skip_cell: Some(skip_cell),
            round_node: None,
            damage_node: None,
            flee_node: None,
            flee_targets: Vec::new(),
        });
    }

    fn push_cell(&mut self, fight_node: NodeId, tag: &str, kind: NodeKind, label: &str) -> NodeId {
        let id = self.next_node_id();
        self.nodes.push(NodeData::new(tag, kind, Some(fight_node)));
        self.nodes[fight_node.0].children.push(id);
        self.handle_content(id, label);
        id
    }

    pub(super) fn fight_index(&self, node: NodeId) -> Option<usize> {
        self.fights.iter().position(|fight| fight.node == node)
    }

    /// All fights sharing this fight's group, itself included.
    fn group_members(&self, idx: usize) -> Vec<usize> {
        match &self.fights[idx].group {
            None => vec![idx],
            Some(group) => self
                .fight_groups
                .get(group)
                .map(|nodes| {
                    nodes
                        .iter()
                        .filter_map(|node| self.fight_index(*node))
                        .collect()
                })
                .unwrap_or_else(|| vec![idx]),
        }
    }

    fn other_members_alive(&self, idx: usize) -> bool {
        self.group_members(idx)
            .into_iter()
            .any(|member| member != idx && !self.fights[member].ended)
    }

    pub(super) fn execute_fight(&mut self, idx: usize) -> Result<RunOutcome, GamebookError> {
        if self.fights[idx].broken {
            log::warn!(
                "fight \"{}\" cannot start with incomplete stats",
                self.fights[idx].name
            );
            return Ok(RunOutcome::Suspended);
        }
        if self.fights[idx].ended || self.state.adventurer.is_dead() {
            return Ok(RunOutcome::Complete);
        }
        self.hookup_nodes(idx);
        if let Some(word) = self.fights[idx].stamina_lost.clone() {
            self.state.codewords.insert(word, 0);
        }
        if let Some(source) = self.fights[idx].pre_damage.clone() {
            let amount = self
                .state
                .codeword(&source)
                .or_else(|| self.state.variable(&source))
                .unwrap_or(0);
            if amount > 0 {
                self.apply_enemy_damage(idx, amount);
                if self.enemy_beaten(idx) {
                    if self.other_members_alive(idx) {
                        self.fights[idx].ended = true;
                        self.push_event(SceneEvent::FightEnded {
                            fight: self.fights[idx].node,
                            result: FightResult::Won,
                        });
                    } else {
                        self.disable_flee(idx);
                        self.end_fight(idx, false)?;
                    }
                    return Ok(RunOutcome::Complete);
                }
            }
        }
        let pre_round = self.fights[idx].round_node.filter(|node| {
            matches!(self.nodes[node.0].kind, NodeKind::FightRound { pre: true, .. })
        });
        if let Some(round) = pre_round {
            if self.hook_execute(round)? == RunOutcome::Suspended {
                return Ok(RunOutcome::Suspended);
            }
        }
        self.final_fight_prep(idx)?;
        Ok(RunOutcome::Suspended)
    }

    /// Claims the free-standing hook nodes parsed ahead of this fight.
    pub(super) fn hookup_nodes(&mut self, idx: usize) {
        if self.fights[idx].hooked_up {
            return;
        }
        self.fights[idx].hooked_up = true;
        if !self.loose_round_nodes.is_empty() {
            let node = self.loose_round_nodes.remove(0);
            self.claim_hook(node, idx);
            self.fights[idx].round_node = Some(node);
        }
        if !self.loose_damage_nodes.is_empty() {
            let node = self.loose_damage_nodes.remove(0);
            self.claim_hook(node, idx);
            self.fights[idx].damage_node = Some(node);
        }
        if !self.loose_flee_nodes.is_empty() {
            let node = self.loose_flee_nodes.remove(0);
            self.claim_hook(node, idx);
            self.fights[idx].flee_node = Some(node);
        }
        self.fights[idx].flee_targets = self.flee_targets.clone();
    }

    fn claim_hook(&mut self, node: NodeId, idx: usize) {
        if let NodeKind::FightRound { hook, .. }
        | NodeKind::FightDamage { hook, .. }
        | NodeKind::FleeHook(hook) = &mut self.nodes[node.0].kind
        {
            hook.owner = Some(idx);
        }
    }

    /// Enables the opening cells for this fight and its group siblings.
    fn final_fight_prep(&mut self, idx: usize) -> Result<(), GamebookError> {
        if self.fights[idx].prepped {
            return Ok(());
        }
        let mut to_prep = vec![idx];
        for member in self.group_members(idx) {
            if member != idx && !self.fights[member].ended && !self.fights[member].prepped {
                to_prep.push(member);
            }
        }
        for member in to_prep {
            self.fights[member].prepped = true;
            if member == idx {
                if let Some(flee) = self.fights[idx].flee_node {
                    self.hook_execute(flee)?;
                } else {
                    self.enable_flee(idx);
                }
            }
            if self.fights[member].player_first {
                let cell = self.fights[member].attack_cell;
                self.set_enabled(cell, true);
            } else {
                self.begin_defend(member)?;
            }
            let no_hooks = self.fights[member].round_node.is_none()
                && self.fights[member].damage_node.is_none();
            if no_hooks {
                if let Some(skip) = self.fights[member].skip_cell {
                    self.set_enabled(skip, true);
                }
            }
        }
        Ok(())
    }

    /// Runs a hook node's body under a raised ignore counter so only the
    /// outer chain stays undoable.
    fn hook_execute(&mut self, node: NodeId) -> Result<RunOutcome, GamebookError> {
        let grouper = match &mut self.nodes[node.0].kind {
            NodeKind::FightRound { hook, .. }
            | NodeKind::FightDamage { hook, .. }
            | NodeKind::FleeHook(hook) => {
                hook.executed = true;
                hook.grouper
            }
            _ => return Ok(RunOutcome::Complete),
        };
        self.set_enabled(node, true);
        self.undo.record(Step::Run(node));
        self.undo.ignore_more();
        match self.execute_grouper(grouper)? {
            RunOutcome::Complete => {
                self.undo.ignore_less();
                Ok(RunOutcome::Complete)
            }
            RunOutcome::Suspended => Ok(RunOutcome::Suspended),
        }
    }

    fn player_combat(&mut self, idx: usize) -> i32 {
        if self.cached_attack_bonus != 0 {
            self.fights[idx].attack_bonus = self.cached_attack_bonus;
            self.cached_attack_bonus = 0;
        }
        let items: i32 = self
            .state
            .possessions
            .iter()
            .map(|item| item.combat_bonus)
            .sum();
        self.state.adventurer.combat
            + self.state.adventurer.combat_potion_bonus
            + items
            + self.fights[idx].attack_bonus
    }

    fn player_defence(&self, idx: usize) -> i32 {
        if let Some(var) = &self.fights[idx].player_defence_var {
            return match self.state.variable(var) {
                Some(value) => value,
                None => {
                    log::warn!("playerDefence variable \"{}\" is not set", var);
                    0
                }
            };
        }
        let items: i32 = self
            .state
            .possessions
            .iter()
            .map(|item| item.defence_bonus)
            .sum();
        self.state.adventurer.defence + self.state.adventurer.active_defence_bonus + items
    }

    pub(super) fn activate_attack(&mut self, idx: usize) -> Result<(), GamebookError> {
        if !self.fights[idx].first_attack_done {
            self.fights[idx].first_attack_done = true;
            let potion = self.state.adventurer.combat_potion_bonus;
            if potion > 0 {
                self.fights[idx].potion_bonus = potion;
            }
            if self.fights[idx].player_defence_var.is_none() {
                if let Some(blessing) = self.state.adventurer.defence_blessing.take() {
                    self.fights[idx].defence_bonus = blessing;
                    self.state.adventurer.active_defence_bonus += blessing;
                }
            }
            self.fights[idx].bonuses_active = true;
        }
        // one attack per round across the whole group
        for member in self.group_members(idx) {
            if !self.fights[member].ended {
                let cell = self.fights[member].attack_cell;
                self.set_enabled(cell, false);
            }
        }
        let modifier = self.player_combat(idx);
        let dice = self.fights[idx].attack_dice;
        let node = self.fights[idx].node;
        self.start_roller(dice, modifier, RollTarget::Attack(node))?;
        Ok(())
    }

    pub(super) fn attack_roll_finished(
        &mut self,
        fight_node: NodeId,
        total: i32,
    ) -> Result<(), GamebookError> {
        let Some(idx) = self.fight_index(fight_node) else {
            return Err(GamebookError::new(
                "ENGINE_FIGHT_UNKNOWN",
                "attack roll resolved for a node that is not a fight",
            ));
        };
        let damage = total - self.fights[idx].defence;
        let cell = self.fights[idx].attack_cell;
        self.set_enabled(cell, false);
        self.undo.checkpoint(UndoCreator::FightCell(cell));
        self.damage_enemy(idx, damage)
    }

    fn enemy_beaten(&self, idx: usize) -> bool {
        let fight = &self.fights[idx];
        fight.stamina == 0 || (fight.flee_at > 0 && fight.stamina <= fight.flee_at)
    }

    /// Clamped stamina loss plus bookkeeping. Returns the amount applied.
    fn apply_enemy_damage(&mut self, idx: usize, damage: i32) -> i32 {
        let applied = damage.clamp(0, self.fights[idx].stamina);
        if applied == 0 {
            return 0;
        }
        self.fights[idx].stamina -= applied;
        let fight = self.fights[idx].node;
        let stamina = self.fights[idx].stamina;
        self.push_event(SceneEvent::StaminaChanged { fight, stamina });
        if let Some(word) = self.fights[idx].stamina_lost.clone() {
            self.state.adjust_codeword(&word, applied);
        }
        applied
    }

    fn damage_enemy(&mut self, idx: usize, damage: i32) -> Result<(), GamebookError> {
        self.fights[idx].attack_damage_done = self.apply_enemy_damage(idx, damage);
        if self.enemy_beaten(idx) {
            if !self.other_members_alive(idx) {
                self.disable_flee(idx);
                return self.end_fight(idx, true);
            }
            // group still running; finalize once the last sibling ends
            self.fights[idx].ended = true;
            let node = self.fights[idx].node;
            self.push_event(SceneEvent::FightEnded {
                fight: node,
                result: FightResult::Won,
            });
            let defend = self.fights[idx].defend_cell;
            self.set_enabled(defend, false);
            if let Some(skip) = self.fights[idx].skip_cell {
                self.set_enabled(skip, false);
            }
        }
        // the enemies strike back
        if !self.fights[idx].ended {
            self.begin_defend(idx)?;
        }
        for member in self.group_members(idx) {
            if member != idx && !self.fights[member].ended && self.fights[member].prepped {
                self.begin_defend(member)?;
            }
        }
        Ok(())
    }

    fn begin_defend(&mut self, idx: usize) -> Result<(), GamebookError> {
        if self.fights[idx].ended {
            return Ok(());
        }
        self.fights[idx].attack_number = 0;
        self.fights[idx].defend_damage_done = 0;
        let cell = self.fights[idx].defend_cell;
        self.set_enabled(cell, true);
        if self.fights[idx].skipping {
            self.activate_defend(idx)?;
        }
        Ok(())
    }

    pub(super) fn activate_defend(&mut self, idx: usize) -> Result<(), GamebookError> {
        let cell = self.fights[idx].defend_cell;
        self.set_enabled(cell, false);
        let modifier = self.fights[idx].combat;
        let node = self.fights[idx].node;
        self.start_roller(2, modifier, RollTarget::Defend(node))?;
        Ok(())
    }

    pub(super) fn defend_roll_finished(
        &mut self,
        fight_node: NodeId,
        total: i32,
    ) -> Result<(), GamebookError> {
        let Some(idx) = self.fight_index(fight_node) else {
            return Err(GamebookError::new(
                "ENGINE_FIGHT_UNKNOWN",
                "defend roll resolved for a node that is not a fight",
            ));
        };
        let damage = total - self.player_defence(idx);
        let cell = self.fights[idx].defend_cell;
        self.set_enabled(cell, false);
        self.undo.checkpoint(UndoCreator::FightCell(cell));
        self.fights[idx].attack_number += 1;
        let last = self.fights[idx].attack_number >= self.fights[idx].attacks;
        let alive = self.damage_player(idx, damage, last)?;
        if alive && !last && !self.fights[idx].ended {
            // remaining enemy attacks of the same round
            let modifier = self.fights[idx].combat;
            self.start_roller(2, modifier, RollTarget::Defend(fight_node))?;
        }
        Ok(())
    }

    /// Applies one enemy hit. Returns false when the player is dead and
    /// the fight has been closed out.
    fn damage_player(
        &mut self,
        idx: usize,
        damage: i32,
        last: bool,
    ) -> Result<bool, GamebookError> {
        let mut dead = false;
        if damage > 0 {
            let replace = self.fights[idx]
                .damage_node
                .map(|node| {
                    matches!(
                        self.nodes[node.0].kind,
                        NodeKind::FightDamage { replace: true, .. }
                    )
                })
                .unwrap_or(false);
            if replace {
                self.fights[idx].defend_damage_done = 0;
            } else {
                match self.fights[idx].ability_damaged.clone() {
                    None => {
                        let current = self.state.adventurer.stamina.current;
                        self.fights[idx].defend_damage_done = damage.min(current);
                        dead = self.state.adventurer.stamina.damage(damage);
                    }
                    Some(ability) => {
                        let current = self.state.adventurer.ability(&ability);
                        let applied = damage.min(current.max(0));
                        self.fights[idx].defend_damage_done = applied;
                        self.state
                            .adventurer
                            .abilities
                            .insert(ability, current - applied);
                    }
                }
            }
        } else {
            self.fights[idx].defend_damage_done = 0;
        }
        if self.state.adventurer.is_dead() {
            dead = true;
        }
        if dead {
            self.disable_flee(idx);
            self.end_fight(idx, true)?;
            return Ok(false);
        }
        if damage > 0 {
            if let Some(hook) = self.fights[idx].damage_node {
                if self.hook_execute(hook)? == RunOutcome::Suspended {
                    return Ok(true);
                }
            }
        }
        self.fight_after_damage(idx, last)?;
        Ok(true)
    }

    /// Round progression once any damage hook is out of the way.
    fn fight_after_damage(&mut self, idx: usize, last: bool) -> Result<(), GamebookError> {
        if !last {
            return Ok(());
        }
        let post_round = self.fights[idx].round_node.filter(|node| {
            matches!(
                self.nodes[node.0].kind,
                NodeKind::FightRound { pre: false, .. }
            )
        });
        if let Some(round) = post_round {
            if self.hook_execute(round)? == RunOutcome::Suspended {
                return Ok(());
            }
        }
        self.defend_done(idx)
    }

    /// Re-opens the attack once every live group member's defends are in.
    fn defend_done(&mut self, idx: usize) -> Result<(), GamebookError> {
        for member in self.group_members(idx) {
            if !self.fights[member].ended && self.is_enabled(self.fights[member].defend_cell) {
                return Ok(());
            }
        }
        for member in self.group_members(idx) {
            if !self.fights[member].ended {
                let cell = self.fights[member].attack_cell;
                self.set_enabled(cell, true);
            }
        }
        if self.fights[idx].skipping && !self.fights[idx].ended {
            self.activate_attack(idx)?;
        }
        Ok(())
    }

    /// Async completion of a round hook body.
    pub(super) fn fight_round_done(&mut self, node: NodeId) -> Result<(), GamebookError> {
        let Some(idx) = self.hook_owner(node) else {
            return Ok(());
        };
        if self.state.adventurer.is_dead() {
            self.disable_flee(idx);
            return self.end_fight(idx, true);
        }
        if !self.fights[idx].prepped {
            // this was the pre-fight round; open the fight proper
            return self.final_fight_prep(idx);
        }
        self.defend_done(idx)
    }

    /// Async completion of a damage hook body.
    pub(super) fn fight_damage_done(&mut self, node: NodeId) -> Result<(), GamebookError> {
        let Some(idx) = self.hook_owner(node) else {
            return Ok(());
        };
        if self.state.adventurer.is_dead() {
            self.disable_flee(idx);
            return self.end_fight(idx, true);
        }
        let last = self.fights[idx].attack_number >= self.fights[idx].attacks;
        self.fight_after_damage(idx, last)
    }

    /// Async completion of a flee hook body: the player has fled.
    pub(super) fn fight_flee_done(&mut self, node: NodeId) -> Result<(), GamebookError> {
        let Some(idx) = self.hook_owner(node) else {
            return Ok(());
        };
        if self.fights[idx].ended {
            return Ok(());
        }
        self.flee_target_activated(idx)
    }

    fn hook_owner(&self, node: NodeId) -> Option<usize> {
        match &self.nodes[node.0].kind {
            NodeKind::FightRound { hook, .. }
            | NodeKind::FightDamage { hook, .. }
            | NodeKind::FleeHook(hook) => hook.owner,
            _ => None,
        }
    }

    /// The player fled through a flee target or a completed flee hook.
    pub(super) fn flee_target_activated(&mut self, idx: usize) -> Result<(), GamebookError> {
        for member in self.group_members(idx) {
            let fight = &self.fights[member];
            let cells = [Some(fight.attack_cell), Some(fight.defend_cell), fight.skip_cell];
            for cell in cells.into_iter().flatten() {
                self.set_enabled(cell, false);
            }
            self.fights[member].fled = true;
        }
        self.disable_flee(idx);
        self.end_fight(idx, true)
    }

    fn enable_flee(&mut self, idx: usize) {
        for target in self.fights[idx].flee_targets.clone() {
            self.set_enabled(target, true);
        }
    }

    fn disable_flee(&mut self, idx: usize) {
        for target in self.fights[idx].flee_targets.clone() {
            self.set_enabled(target, false);
        }
    }

    /// Closes the fight, settles one-shot bonuses for the whole group and
    /// optionally resumes the suspended section chain after this node.
    fn end_fight(&mut self, idx: usize, continue_execution: bool) -> Result<(), GamebookError> {
        self.fights[idx].ended = true;
        let result = if self.state.adventurer.is_dead() {
            FightResult::Lost
        } else if self.fights[idx].fled {
            FightResult::Fled
        } else {
            FightResult::Won
        };
        let node = self.fights[idx].node;
        let cells = [
            Some(self.fights[idx].attack_cell),
            Some(self.fights[idx].defend_cell),
            self.fights[idx].skip_cell,
        ];
        for cell in cells.into_iter().flatten() {
            self.set_enabled(cell, false);
        }
        for member in self.group_members(idx) {
            if !self.fights[member].bonuses_active {
                continue;
            }
            self.fights[member].bonuses_active = false;
            let potion = self.fights[member].potion_bonus;
            if potion > 0 {
                let left = self.state.adventurer.combat_potion_bonus;
                self.state.adventurer.combat_potion_bonus = (left - potion).max(0);
            }
            let blessing = self.fights[member].defence_bonus;
            if blessing > 0 {
                self.state.adventurer.active_defence_bonus -= blessing;
            }
        }
        self.push_event(SceneEvent::FightEnded {
            fight: node,
            result,
        });
        if continue_execution {
            let grouper = self.find_enclosing_grouper(node)?;
            self.continue_grouper_from(grouper, Some(Step::Run(node)), true)?;
        }
        Ok(())
    }

    /// Whether the player could still win, and still lose, against what
    /// is left of the group. Recomputed at every skip request.
    fn skip_odds(&mut self, idx: usize) -> (bool, bool) {
        let combat = self.player_combat(idx);
        let defence = self.player_defence(idx);
        let mut can_win = true;
        let mut can_lose = false;
        for member in self.group_members(idx) {
            let fight = &self.fights[member];
            if fight.ended {
                continue;
            }
            if combat + 6 * fight.attack_dice as i32 <= fight.defence {
                can_win = false;
            }
            if fight.combat + 12 > defence {
                can_lose = true;
            }
        }
        (can_win, can_lose)
    }

    pub(super) fn activate_skip(&mut self, idx: usize) -> Result<Activation, GamebookError> {
        let node = self.fights[idx].node;
        match self.skip_odds(idx) {
            (true, true) => Ok(Activation::SkipConfirm(node)),
            (true, false) => {
                self.run_skip(idx, Some(SkipWinner::Player))?;
                Ok(Activation::Done)
            }
            (false, true) => {
                self.run_skip(idx, Some(SkipWinner::Enemy))?;
                Ok(Activation::Done)
            }
            (false, false) => Ok(Activation::SkipPickWinner(node)),
        }
    }

    /// Host accepted fast-forwarding a fight both sides could still win.
    pub fn confirm_skip(&mut self, fight_node: NodeId) -> Result<(), GamebookError> {
        let Some(idx) = self.fight_index(fight_node) else {
            return Err(GamebookError::new(
                "ENGINE_FIGHT_UNKNOWN",
                "skip confirmed for a node that is not a fight",
            ));
        };
        self.run_skip(idx, None)
    }

    /// Host picked the winner of a deadlocked fight.
    pub fn resolve_skip(
        &mut self,
        fight_node: NodeId,
        winner: SkipWinner,
    ) -> Result<(), GamebookError> {
        let Some(idx) = self.fight_index(fight_node) else {
            return Err(GamebookError::new(
                "ENGINE_FIGHT_UNKNOWN",
                "skip resolved for a node that is not a fight",
            ));
        };
        self.run_skip(idx, Some(winner))
    }

    fn run_skip(&mut self, idx: usize, forced: Option<SkipWinner>) -> Result<(), GamebookError> {
        for member in self.group_members(idx) {
            if !self.fights[member].ended {
                self.fights[member].skipping = true;
                if let Some(skip) = self.fights[member].skip_cell {
                    self.set_enabled(skip, false);
                }
            }
        }
        match forced {
            Some(SkipWinner::Player) => {
                let members: Vec<usize> = self
                    .group_members(idx)
                    .into_iter()
                    .filter(|member| !self.fights[*member].ended)
                    .collect();
                let last = *members.last().unwrap_or(&idx);
                for member in members {
                    let stamina = self.fights[member].stamina;
                    self.apply_enemy_damage(member, stamina);
                    if member != last {
                        self.fights[member].ended = true;
                        let node = self.fights[member].node;
                        self.push_event(SceneEvent::FightEnded {
                            fight: node,
                            result: FightResult::Won,
                        });
                    }
                }
                self.disable_flee(idx);
                self.end_fight(last, true)
            }
            Some(SkipWinner::Enemy) => {
                let current = self.state.adventurer.stamina.current;
                self.state.adventurer.stamina.damage(current);
                self.disable_flee(idx);
                self.end_fight(idx, true)
            }
            None => {
                // real dice, resolved instantly, until someone goes down
                if self.is_enabled(self.fights[idx].attack_cell) {
                    self.activate_attack(idx)
                } else {
                    self.activate_defend(idx)
                }
            }
        }
    }

    /// Undo for the fight node's own Run step: back to the pre-fight look.
    pub(super) fn reset_fight(&mut self, idx: usize) {
        let cells = [
            Some(self.fights[idx].attack_cell),
            Some(self.fights[idx].defend_cell),
            self.fights[idx].skip_cell,
        ];
        for cell in cells.into_iter().flatten() {
            self.set_enabled(cell, false);
        }
        self.disable_flee(idx);
        self.fights[idx].prepped = false;
    }

    /// Undo back into an unresolved attack or defend cell.
    pub(super) fn undo_fight_cell(&mut self, cell: NodeId) -> Result<(), GamebookError> {
        match self.nodes[cell.0].kind {
            NodeKind::AttackCell { fight: idx } => {
                let healed = self.fights[idx].attack_damage_done;
                if healed > 0 {
                    self.fights[idx].stamina += healed;
                    let fight = self.fights[idx].node;
                    let stamina = self.fights[idx].stamina;
                    self.push_event(SceneEvent::StaminaChanged { fight, stamina });
                    if let Some(word) = self.fights[idx].stamina_lost.clone() {
                        self.state.adjust_codeword(&word, -healed);
                    }
                }
                self.fights[idx].attack_damage_done = 0;
                self.un_end(idx);
                for member in self.group_members(idx) {
                    if !self.fights[member].ended {
                        let defend = self.fights[member].defend_cell;
                        self.set_enabled(defend, false);
                        let attack = self.fights[member].attack_cell;
                        self.set_enabled(attack, true);
                    }
                }
                Ok(())
            }
            NodeKind::DefendCell { fight: idx } => {
                let healed = self.fights[idx].defend_damage_done;
                if healed > 0 {
                    match self.fights[idx].ability_damaged.clone() {
                        None => self.state.adventurer.stamina.heal(healed),
                        Some(ability) => {
                            let current = self.state.adventurer.ability(&ability);
                            self.state
                                .adventurer
                                .abilities
                                .insert(ability, current + healed);
                        }
                    }
                }
                self.fights[idx].defend_damage_done = 0;
                self.un_end(idx);
                self.fights[idx].attack_number =
                    self.fights[idx].attack_number.saturating_sub(1);
                for member in self.group_members(idx) {
                    let attack = self.fights[member].attack_cell;
                    self.set_enabled(attack, false);
                }
                let defend = self.fights[idx].defend_cell;
                self.set_enabled(defend, true);
                Ok(())
            }
            _ => Err(GamebookError::new(
                "ENGINE_UNDO_TARGET",
                "undo checkpoint does not point at a fight cell",
            )),
        }
    }

    /// Reverses an end-of-fight that the undone roll had caused.
    fn un_end(&mut self, idx: usize) {
        if !self.fights[idx].ended {
            return;
        }
        self.fights[idx].ended = false;
        self.fights[idx].fled = false;
        if self.fights[idx].first_attack_done && !self.fights[idx].bonuses_active {
            let potion = self.fights[idx].potion_bonus;
            if potion > 0 {
                self.state.adventurer.combat_potion_bonus += potion;
            }
            let blessing = self.fights[idx].defence_bonus;
            if blessing > 0 {
                self.state.adventurer.active_defence_bonus += blessing;
            }
            self.fights[idx].bonuses_active = true;
        }
        if self.fights[idx].flee_node.is_none() {
            self.enable_flee(idx);
        }
    }
}
