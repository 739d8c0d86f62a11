//! Daemon lifecycle phases and the status line shown to the controller

use std::fmt;

/// Phase of the daemon state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DaemonPhase {
    Starting,
    Connecting,
    Running,
    Reconnecting,
    Stopping,
    Stopped,
    /// Startup never reached `Running`
    Failed,
}

impl DaemonPhase {
    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(self, next: DaemonPhase) -> bool {
        use DaemonPhase::*;
        matches!(
            (self, next),
            (Starting, Connecting)
                | (Starting, Stopping)
                | (Connecting, Running)
                | (Connecting, Reconnecting)
                | (Connecting, Failed)
                | (Connecting, Stopping)
                | (Running, Running)
                | (Running, Reconnecting)
                | (Running, Stopping)
                | (Reconnecting, Reconnecting)
                | (Reconnecting, Running)
                | (Reconnecting, Failed)
                | (Reconnecting, Stopping)
                | (Stopping, Stopped)
        )
    }

    /// No further transitions are possible
    pub fn is_terminal(self) -> bool {
        matches!(self, DaemonPhase::Stopped | DaemonPhase::Failed)
    }
}

impl fmt::Display for DaemonPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DaemonPhase::Starting => "starting",
            DaemonPhase::Connecting => "connecting",
            DaemonPhase::Running => "running",
            DaemonPhase::Reconnecting => "reconnecting",
            DaemonPhase::Stopping => "stopping",
            DaemonPhase::Stopped => "stopped",
            DaemonPhase::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Status written to the status sink on every phase change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonStatus {
    Starting,
    Connecting {
        server: String,
    },
    Connected {
        server: String,
        nick: String,
        channel: String,
    },
    Reconnecting {
        attempt: u32,
        reason: String,
    },
    Error(String),
    Stopped,
}

impl fmt::Display for DaemonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaemonStatus::Starting => write!(f, "STARTING"),
            DaemonStatus::Connecting { server } => write!(f, "CONNECTING: {}", server),
            DaemonStatus::Connected { server, nick, channel } => {
                write!(f, "CONNECTED: {} as {} in {}", server, nick, channel)
            }
            DaemonStatus::Reconnecting { attempt, reason } => {
                write!(f, "RECONNECTING (attempt {}): {}", attempt, reason)
            }
            DaemonStatus::Error(reason) => write!(f, "ERROR: {}", reason),
            DaemonStatus::Stopped => write!(f, "STOPPED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_lines() {
        assert_eq!(DaemonStatus::Starting.to_string(), "STARTING");
        assert_eq!(
            DaemonStatus::Connected {
                server: "localhost:6667".to_string(),
                nick: "bot".to_string(),
                channel: "#agents".to_string(),
            }
            .to_string(),
            "CONNECTED: localhost:6667 as bot in #agents"
        );
        assert_eq!(
            DaemonStatus::Reconnecting { attempt: 2, reason: "Connection closed by remote".to_string() }.to_string(),
            "RECONNECTING (attempt 2): Connection closed by remote"
        );
        assert_eq!(DaemonStatus::Error("boom".to_string()).to_string(), "ERROR: boom");
        assert_eq!(DaemonStatus::Stopped.to_string(), "STOPPED");
    }

    #[test]
    fn test_phase_transitions() {
        use DaemonPhase::*;

        assert!(Starting.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Failed));
        assert!(Running.can_transition_to(Reconnecting));
        assert!(Reconnecting.can_transition_to(Reconnecting));
        assert!(Stopping.can_transition_to(Stopped));

        // Once running, failures never end in Failed
        assert!(!Running.can_transition_to(Failed));
        assert!(!Stopped.can_transition_to(Connecting));
        assert!(!Failed.can_transition_to(Reconnecting));

        assert!(Stopped.is_terminal());
        assert!(Failed.is_terminal());
        assert!(!Running.is_terminal());
    }
}
