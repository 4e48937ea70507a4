//! User-visible connection status indicator.

use std::fmt;

/// The single status shown to the user, with a message and severity color.
/// Everything more detailed is logged only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkStatus {
    #[default]
    Initializing,
    Connecting,
    Online,
    Offline,
    Disconnecting,
    ConfigError,
}

impl LinkStatus {
    pub fn message(&self) -> &'static str {
        match self {
            LinkStatus::Initializing => "Initializing",
            LinkStatus::Connecting => "Connecting",
            LinkStatus::Online => "Online",
            LinkStatus::Offline => "Offline",
            LinkStatus::Disconnecting => "Disconnecting",
            LinkStatus::ConfigError => "ERROR",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            LinkStatus::Initializing => "grey",
            LinkStatus::Connecting | LinkStatus::Disconnecting => "steel blue",
            LinkStatus::Online => "dark green",
            LinkStatus::Offline => "orange red",
            LinkStatus::ConfigError => "red",
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}
