mod activate;
mod fight;
mod grouper;
mod lifecycle;
mod node;
mod roller;
mod session;
mod snapshot;
mod undo;

mod rng;

pub use activate::{Activation, SkipWinner};
pub use lifecycle::{EngineOptions, GamebookEngine};
pub use session::{Adventurer, GameState, Item, ItemList, StaminaStat};

#[cfg(test)]
pub(crate) mod engine_test_support {
    use super::*;
    use gb_core::{Attributes, NodeId};
    use std::collections::BTreeMap;

    pub(crate) fn attrs(entries: &[(&str, &str)]) -> Attributes {
        let mut map = BTreeMap::new();
        for (key, value) in entries {
            map.insert((*key).to_string(), (*value).to_string());
        }
        Attributes::from_map(map)
    }

    pub(crate) fn seeded_engine(seed: u32) -> GamebookEngine {
        GamebookEngine::new(EngineOptions {
            random_seed: Some(seed),
            instant_rolls: false,
            state: GameState::default(),
        })
    }

    /// Builds a node with children described as (tag, attrs, content) triples
    /// and closes it, the way the markup layer drives the engine.
    pub(crate) fn child_node(
        engine: &mut GamebookEngine,
        parent: NodeId,
        tag: &str,
        entries: &[(&str, &str)],
        content: Option<&str>,
    ) -> NodeId {
        let id = engine
            .create_node(parent, tag, attrs(entries))
            .unwrap_or_else(|err| panic!("create_node {tag} failed: {err}"));
        if let Some(text) = content {
            engine.handle_content(id, text);
        }
        engine
            .handle_end_tag(id)
            .unwrap_or_else(|err| panic!("handle_end_tag {tag} failed: {err}"));
        id
    }
}

#[cfg(test)]
mod tests;
