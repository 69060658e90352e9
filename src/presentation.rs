//! Presentation state derived from the connection state
//!
//! Front ends never track "connected" themselves: they re-project on every
//! [`CoreEvent::StateChanged`](crate::core::CoreEvent::StateChanged).

use serde::Serialize;

use crate::ssh::{ConnectionState, SessionInfo};

/// What a front end should enable and show for a connection state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresentationState {
    pub connect_enabled: bool,
    pub disconnect_enabled: bool,
    /// Browse, transfer and remote mutation controls
    pub file_ops_enabled: bool,
    pub status: String,
}

/// Project a connection state (and the open session, if any) to UI state
pub fn project(state: ConnectionState, info: Option<&SessionInfo>) -> PresentationState {
    match state {
        ConnectionState::Disconnected => PresentationState {
            connect_enabled: true,
            disconnect_enabled: false,
            file_ops_enabled: false,
            status: "Disconnected".to_string(),
        },
        ConnectionState::Connecting => PresentationState {
            connect_enabled: false,
            disconnect_enabled: false,
            file_ops_enabled: false,
            status: "Connecting...".to_string(),
        },
        ConnectionState::Connected => PresentationState {
            connect_enabled: false,
            disconnect_enabled: true,
            file_ops_enabled: true,
            status: match info {
                Some(info) => format!("Connected to {}@{}", info.username, info.address()),
                None => "Connected".to_string(),
            },
        },
    }
}
