use std::fmt;
use std::time::Duration;

use crate::support::{env_bool, env_string, env_u64};

/// Connection details for the host machine. Immutable; passed by reference
/// into every operation and never mutated.
#[derive(Clone)]
pub struct HostCredentials {
    pub host: String,
    pub ssh_port: u16,
    pub user: String,
    pub password: String,
    /// Hardware address for wake-on-LAN. `None` disables the wake step.
    pub wake_mac: Option<String>,
    /// `host:port` the game server itself listens on, for status queries.
    pub server_address: String,
}

impl HostCredentials {
    /// Read credentials from `WARDEN_*` environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let host = require_env("WARDEN_SSH_HOST")?;
        let server_address = env_string("WARDEN_SERVER_ADDRESS")
            .unwrap_or_else(|| format!("{host}:25565"));

        Ok(Self {
            host,
            ssh_port: env_u64("WARDEN_SSH_PORT")
                .map(|v| v.clamp(1, u16::MAX as u64) as u16)
                .unwrap_or(22),
            user: require_env("WARDEN_SSH_USER")?,
            password: require_env("WARDEN_SSH_PASSWORD")?,
            wake_mac: env_string("WARDEN_WAKE_MAC"),
            server_address,
        })
    }
}

fn require_env(name: &str) -> anyhow::Result<String> {
    env_string(name).ok_or_else(|| anyhow::anyhow!("missing environment variable: {name}"))
}

impl fmt::Debug for HostCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostCredentials")
            .field("host", &self.host)
            .field("ssh_port", &self.ssh_port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("wake_mac", &self.wake_mac)
            .field("server_address", &self.server_address)
            .finish()
    }
}

/// Every retry bound and timeout in one place. All bounds are finite; the
/// debug profile trades realism for fast iteration.
#[derive(Debug, Clone)]
pub struct Timings {
    /// Wake-on-LAN burst: packet count and gap between packets.
    pub wake_packets: u32,
    pub wake_packet_gap: Duration,

    /// Host boot: probe attempts and the total sleep budget they share.
    pub boot_attempts: u32,
    pub boot_budget: Duration,

    /// SSH login: attempts, gap between attempts, and per-attempt timeout.
    pub login_attempts: u32,
    pub login_retry_gap: Duration,
    pub login_timeout: Duration,

    /// Waiting for the shell prompt after a command.
    pub prompt_timeout: Duration,

    /// Per-phase wait while the game server boots.
    pub phase_timeout: Duration,
    /// Single long wait for the whole world-save shutdown sequence.
    pub shutdown_timeout: Duration,

    /// Reachability probe timeouts.
    pub ping_timeout: Duration,
    pub status_timeout: Duration,

    /// Bar-pacing ticks emitted when the stop path has no session to drive.
    pub stop_filler_ticks: u32,
}

impl Timings {
    pub fn production() -> Self {
        Self {
            wake_packets: 10,
            wake_packet_gap: Duration::from_secs(5),
            boot_attempts: 15,
            boot_budget: Duration::from_secs(300),
            login_attempts: 10,
            login_retry_gap: Duration::from_secs(5),
            login_timeout: Duration::from_secs(5),
            prompt_timeout: Duration::from_secs(10),
            phase_timeout: Duration::from_secs(150),
            shutdown_timeout: Duration::from_secs(600),
            ping_timeout: Duration::from_secs(2),
            status_timeout: Duration::from_secs(3),
            stop_filler_ticks: 5,
        }
    }

    pub fn debug() -> Self {
        Self {
            wake_packets: 2,
            wake_packet_gap: Duration::from_millis(100),
            boot_attempts: 2,
            boot_budget: Duration::from_secs(5),
            login_attempts: 2,
            login_retry_gap: Duration::from_secs(1),
            login_timeout: Duration::from_secs(5),
            prompt_timeout: Duration::from_secs(2),
            phase_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(10),
            ping_timeout: Duration::from_millis(500),
            status_timeout: Duration::from_secs(1),
            stop_filler_ticks: 5,
        }
    }

    /// Profile selected by `WARDEN_DEBUG`, with per-field env overrides.
    pub fn from_env() -> Self {
        let mut t = if env_bool("WARDEN_DEBUG").unwrap_or(false) {
            Self::debug()
        } else {
            Self::production()
        };

        if let Some(v) = env_u64("WARDEN_WAKE_PACKETS") {
            t.wake_packets = v.clamp(1, 100) as u32;
        }
        if let Some(v) = env_u64("WARDEN_BOOT_ATTEMPTS") {
            t.boot_attempts = v.clamp(1, 1000) as u32;
        }
        if let Some(v) = env_u64("WARDEN_BOOT_BUDGET_SECS") {
            t.boot_budget = Duration::from_secs(v.clamp(1, 3600));
        }
        if let Some(v) = env_u64("WARDEN_LOGIN_ATTEMPTS") {
            t.login_attempts = v.clamp(1, 100) as u32;
        }
        if let Some(v) = env_u64("WARDEN_PHASE_TIMEOUT_SECS") {
            t.phase_timeout = Duration::from_secs(v.clamp(1, 3600));
        }
        if let Some(v) = env_u64("WARDEN_SHUTDOWN_TIMEOUT_SECS") {
            t.shutdown_timeout = Duration::from_secs(v.clamp(1, 7200));
        }
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_profile_is_faster_than_production() {
        let p = Timings::production();
        let d = Timings::debug();
        assert!(d.boot_attempts < p.boot_attempts);
        assert!(d.boot_budget < p.boot_budget);
        assert!(d.login_attempts < p.login_attempts);
        assert!(d.wake_packet_gap < p.wake_packet_gap);
    }

    #[test]
    fn debug_output_redacts_password() {
        let creds = HostCredentials {
            host: "mc.example.net".into(),
            ssh_port: 22,
            user: "admin".into(),
            password: "hunter2".into(),
            wake_mac: Some("AA:BB:CC:DD:EE:FF".into()),
            server_address: "mc.example.net:25565".into(),
        };
        let printed = format!("{creds:?}");
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("<redacted>"));
    }
}
