//! Persisted configuration: the global config file and the settings store built on it.

mod global;
mod settings;

pub use global::{CONFIG_PATH_ENV, GlobalConfig};
pub use settings::{FileSettings, SettingsStore};
