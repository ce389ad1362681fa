mod engine;

pub use engine::{
    Activation, Adventurer, EngineOptions, GameState, GamebookEngine, Item, ItemList, SkipWinner,
    StaminaStat,
};
