/// Reachability snapshot of the host machine and the game server on it.
///
/// Always derived fresh from the network; never cached. `process_reachable`
/// implies `host_reachable`: a prober that cannot reach the host must not
/// report the process as up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ServerState {
    pub host_reachable: bool,
    pub process_reachable: bool,
}

impl ServerState {
    /// State reported when the host itself cannot be reached.
    pub fn offline() -> Self {
        Self {
            host_reachable: false,
            process_reachable: false,
        }
    }
}

/// One unit of visible progress emitted while a lifecycle operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ProgressTick {
    /// One step of the operation completed; advance the progress display.
    Advance,
    /// The wake step is being retried. Informational, not a bar step.
    WakeRetry,
}

/// A launchable world configuration. Owned by the profile store; the
/// orchestrator only reads the selected profile when issuing a start command.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WorldProfile {
    pub name: String,
    pub start_command: String,
    #[serde(default)]
    pub requires_elevated_start: bool,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_state_is_fully_unreachable() {
        let s = ServerState::offline();
        assert!(!s.host_reachable);
        assert!(!s.process_reachable);
    }

    #[test]
    fn world_profile_defaults_on_deserialize() {
        let p: WorldProfile =
            serde_json::from_str(r#"{"name":"Main","start_command":"./start.sh"}"#).unwrap();
        assert!(!p.requires_elevated_start);
        assert!(p.visible);
    }

    #[test]
    fn progress_tick_roundtrips() {
        let json = serde_json::to_string(&ProgressTick::WakeRetry).unwrap();
        let back: ProgressTick = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ProgressTick::WakeRetry);
    }
}
