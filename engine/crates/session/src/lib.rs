pub mod router;

pub use registry::ConnectionId;
pub use router::{InboundLine, InputRouter, PrivateInput, RouterError};

/// One frame on its way to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFrame {
    Text(String),
    /// Toggle remote echo (off while a password is typed).
    Echo(bool),
    /// Flush pending text and close the connection.
    Disconnect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutput {
    pub conn: ConnectionId,
    pub frame: OutputFrame,
}

impl SessionOutput {
    pub fn new(conn: ConnectionId, text: impl Into<String>) -> Self {
        Self {
            conn,
            frame: OutputFrame::Text(text.into()),
        }
    }

    pub fn echo(conn: ConnectionId, enabled: bool) -> Self {
        Self {
            conn,
            frame: OutputFrame::Echo(enabled),
        }
    }

    pub fn disconnect(conn: ConnectionId) -> Self {
        Self {
            conn,
            frame: OutputFrame::Disconnect,
        }
    }
}

/// Outbound half of a connection, as seen by the game.
///
/// Inbound text does not go through this trait: the network layer pushes
/// each received line into the [`InputRouter`].
pub trait Transport: Send + Sync {
    /// Queue text for a connection. Returns false if the connection is gone.
    fn send(&self, conn: ConnectionId, text: &str) -> bool;
    fn disconnect(&self, conn: ConnectionId);
    fn set_echo(&self, conn: ConnectionId, enabled: bool);
}

/// Account privilege, stored as an integer by the account store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(i32)]
pub enum PermissionLevel {
    #[default]
    Player = 0,
    Builder = 1,
    Admin = 2,
    Owner = 3,
}

impl PermissionLevel {
    pub fn from_i32(v: i32) -> Self {
        match v {
            1 => Self::Builder,
            2 => Self::Admin,
            3 => Self::Owner,
            _ => Self::Player,
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_admin(self) -> bool {
        self >= Self::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_constructors() {
        let conn = ConnectionId(4);
        assert_eq!(SessionOutput::new(conn, "hi").frame, OutputFrame::Text("hi".into()));
        assert_eq!(SessionOutput::echo(conn, false).frame, OutputFrame::Echo(false));
        assert_eq!(SessionOutput::disconnect(conn).frame, OutputFrame::Disconnect);
    }

    #[test]
    fn permission_level_ordering() {
        assert!(PermissionLevel::Player < PermissionLevel::Builder);
        assert!(PermissionLevel::Builder < PermissionLevel::Admin);
        assert!(PermissionLevel::Admin < PermissionLevel::Owner);
        assert!(PermissionLevel::Owner.is_admin());
        assert!(!PermissionLevel::Builder.is_admin());
    }

    #[test]
    fn permission_level_roundtrip() {
        for level in [
            PermissionLevel::Player,
            PermissionLevel::Builder,
            PermissionLevel::Admin,
            PermissionLevel::Owner,
        ] {
            assert_eq!(PermissionLevel::from_i32(level.as_i32()), level);
        }
        assert_eq!(PermissionLevel::from_i32(99), PermissionLevel::Player);
    }
}
