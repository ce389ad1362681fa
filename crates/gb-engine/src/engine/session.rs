use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::lifecycle::GamebookEngine;
use super::node::NodeKind;

/// Current and ceiling value of a stamina-like stat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaminaStat {
    pub current: i32,
    pub max: i32,
}

impl StaminaStat {
    pub fn full(max: i32) -> Self {
        Self { current: max, max }
    }

    /// Applies damage, clamped at zero. Returns true on death.
    pub fn damage(&mut self, amount: i32) -> bool {
        self.current = (self.current - amount.max(0)).max(0);
        self.current == 0
    }

    pub fn heal(&mut self, amount: i32) {
        self.current = (self.current + amount.max(0)).min(self.max);
    }
}

impl Default for StaminaStat {
    fn default() -> Self {
        Self::full(12)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Adventurer {
    pub combat: i32,
    pub defence: i32,
    pub stamina: StaminaStat,
    /// named ability scores, for difficulty rolls and abilityDamaged fights
    #[serde(default)]
    pub abilities: BTreeMap<String, i32>,
    /// combat bonus from a drunk potion; a fight consumes it when it ends
    #[serde(default)]
    pub combat_potion_bonus: i32,
    /// a held blessing the next fight may spend on extra defence
    #[serde(default)]
    pub defence_blessing: Option<i32>,
    /// blessing bonus currently applied to defence by a running fight
    #[serde(default)]
    pub active_defence_bonus: i32,
}

impl Adventurer {
    pub fn new(combat: i32, defence: i32, stamina: i32) -> Self {
        Self {
            combat,
            defence,
            stamina: StaminaStat::full(stamina),
            abilities: BTreeMap::new(),
            combat_potion_bonus: 0,
            defence_blessing: None,
            active_defence_bonus: 0,
        }
    }

    pub fn is_dead(&self) -> bool {
        self.stamina.current == 0
    }

    pub fn ability(&self, name: &str) -> i32 {
        match self.abilities.get(name) {
            Some(score) => *score,
            None => {
                log::warn!("unknown ability \"{}\" scored as zero", name);
                0
            }
        }
    }
}

impl Default for Adventurer {
    fn default() -> Self {
        Self::new(6, 5, 12)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub name: String,
    #[serde(default)]
    pub combat_bonus: i32,
    #[serde(default)]
    pub defence_bonus: i32,
}

impl Item {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            combat_bonus: 0,
            defence_bonus: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemList(Vec<Item>);

impl ItemList {
    pub fn add(&mut self, item: Item) {
        self.0.push(item);
    }

    /// Removes the first item with this name. Returns whether one existed.
    pub fn remove_named(&mut self, name: &str) -> bool {
        match self.0.iter().position(|item| item.name == name) {
            Some(index) => {
                self.0.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|item| item.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything that outlives a section: the character sheet, possessions,
/// codewords and the variable/flag scratch space sections write into.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub adventurer: Adventurer,
    #[serde(default)]
    pub possessions: ItemList,
    #[serde(default)]
    pub variables: BTreeMap<String, i32>,
    #[serde(default)]
    pub flags: BTreeMap<String, bool>,
    #[serde(default)]
    pub codewords: BTreeMap<String, i32>,
}

impl GameState {
    pub fn flag(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }

    pub fn variable(&self, name: &str) -> Option<i32> {
        self.variables.get(name).copied()
    }

    pub fn codeword(&self, name: &str) -> Option<i32> {
        self.codewords.get(name).copied()
    }

    pub fn adjust_codeword(&mut self, name: &str, delta: i32) {
        *self.codewords.entry(name.to_string()).or_insert(0) += delta;
    }
}

impl GamebookEngine {
    pub fn set_variable(&mut self, name: &str, value: i32) {
        self.state.variables.insert(name.to_string(), value);
    }

    /// Flips a flag and re-runs the roll nodes listening on it: a raised
    /// flag re-enables an unrolled listener, a cleared flag hides it.
    pub fn set_flag(&mut self, name: &str, value: bool) {
        if self.state.flag(name) == value {
            return;
        }
        self.state.flags.insert(name.to_string(), value);
        let listeners = self
            .flag_listeners
            .get(name)
            .cloned()
            .unwrap_or_default();
        for node in listeners {
            let unrolled = matches!(
                &self.nodes[node.0].kind,
                NodeKind::Random(rs) if rs.result.is_none()
            );
            if value && unrolled {
                self.set_enabled(node, true);
            } else if !value {
                self.set_enabled(node, false);
            }
        }
    }
}
