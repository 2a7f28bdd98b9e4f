pub mod state;

pub use state::{AppSettings, SettingsError, SettingsResult, SettingsStore};
