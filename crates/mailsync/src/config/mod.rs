pub mod loader;
pub mod provider;
pub mod schema;

pub use loader::{load_config, load_config_from_str};
pub use provider::{FileSettingsProvider, SettingsError, SettingsProvider};
pub use schema::{AccountSettings, AttachmentLimits, EngineConfig, TimeCheckConfig};
