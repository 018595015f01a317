pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod population;
pub mod remote;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use crate::config::AppConfig;
pub use crate::core::{EngineConfig, MirrorEngine, SyncPlan, SyncReport};
pub use crate::error::MirrorError;

impl From<&AppConfig> for EngineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            index_url: config.source.index_url.clone(),
            prefix: config.storage.prefix.clone(),
            max_concurrent: config.sync.max_concurrent,
        }
    }
}
