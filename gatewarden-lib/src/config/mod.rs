mod cache;
mod loader;
mod settings;

pub use cache::ConfigCache;
pub use loader::load_from_path;
pub use settings::{CacheConfig, LimitsConfig, LoggingConfig, Settings};
