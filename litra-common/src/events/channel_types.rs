//! Realtime channel status as shown to the user

use serde::{Deserialize, Serialize};

/// Connection badge state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    /// No channel URL configured, or the realtime feature flag is off
    Disabled,
    Connected,
    /// Disconnected with at least one failed attempt; a retry is scheduled
    Reconnecting,
    Offline,
}

impl ChannelStatus {
    /// Derive the badge from the three facts that determine it
    pub fn derive(enabled: bool, connected: bool, reconnect_attempts: u32) -> Self {
        if !enabled {
            ChannelStatus::Disabled
        } else if connected {
            ChannelStatus::Connected
        } else if reconnect_attempts > 0 {
            ChannelStatus::Reconnecting
        } else {
            ChannelStatus::Offline
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelStatus::Disabled => "disabled",
            ChannelStatus::Connected => "connected",
            ChannelStatus::Reconnecting => "reconnecting",
            ChannelStatus::Offline => "offline",
        }
    }
}

impl std::fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
