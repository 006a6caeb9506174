pub mod chain;
pub mod scorer;
pub mod weights;

pub use chain::{ChainBuilder, MAX_CHAIN_LEN, build_fallback_chain, build_fallback_chain_with};
pub use scorer::StrategyScorer;
pub use weights::{WeightError, WeightTable};
