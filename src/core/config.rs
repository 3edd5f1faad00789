mod parsing;
mod settings;
mod types;

pub use types::{
    ApiSettings, ConfigError, Environment, RuntimeSettings, SessionSettings, Settings,
    StorageSettings, TelemetrySettings,
};
