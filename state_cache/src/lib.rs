pub use crate::{
    cached_state::{CachedState, EpochContext},
    state_cache::StateCaches,
};

mod cached_state;
mod state_cache;
