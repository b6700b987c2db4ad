//! The persistent terminal session that keeps the game server alive after
//! logout, and the driver that walks its console output through an ordered
//! milestone table.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::LifecycleError;
use crate::milestones::MilestoneTable;
use crate::progress::Progress;
use crate::shell::{ExpectTimeout, RemoteShell};
use crate::support::env_string;

/// Name of the multiplexer session the managed process runs in.
pub(crate) fn session_name() -> String {
    env_string("WARDEN_SESSION_NAME").unwrap_or_else(|| "mc-server-control".to_string())
}

pub(crate) async fn create<S: AsyncRead + AsyncWrite + Send + Unpin>(
    shell: &mut RemoteShell<S>,
    name: &str,
    elevated: bool,
    secret: &str,
    timeout: Duration,
) -> anyhow::Result<()> {
    tracing::debug!(session = %name, "creating persistent session");
    shell
        .maybe_sudo_command(&format!("screen -S {name}"), elevated, secret, timeout)
        .await
}

pub(crate) async fn attach<S: AsyncRead + AsyncWrite + Send + Unpin>(
    shell: &mut RemoteShell<S>,
    name: &str,
    elevated: bool,
    secret: &str,
    timeout: Duration,
) -> anyhow::Result<()> {
    tracing::debug!(session = %name, "attaching to persistent session");
    shell
        .maybe_sudo_command(&format!("screen -r {name}"), elevated, secret, timeout)
        .await
}

/// Detach from the session, leaving it (and the process inside) running.
pub(crate) async fn detach<S: AsyncRead + AsyncWrite + Send + Unpin>(
    shell: &mut RemoteShell<S>,
) -> anyhow::Result<()> {
    tracing::debug!("detaching persistent session");
    // ctrl-a, short gap, then 'd': the multiplexer needs the keys separately.
    shell.send_raw(&[0x01]).await?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    shell.send_raw(b"d").await?;
    Ok(())
}

pub(crate) async fn kill<S: AsyncRead + AsyncWrite + Send + Unpin>(
    shell: &mut RemoteShell<S>,
    name: &str,
    elevated: bool,
    secret: &str,
    timeout: Duration,
) -> anyhow::Result<()> {
    tracing::debug!(session = %name, "killing persistent session");
    shell
        .maybe_sudo_command(&format!("screen -X -S {name} quit"), elevated, secret, timeout)
        .await
}

/// Walk the console output through the table, emitting one tick per phase.
///
/// The terminal pattern ends the walk wherever it lands: the remaining
/// phases' ticks are emitted immediately so the caller's progress display
/// still reaches its maximum, and nothing more is consumed. A phase that
/// times out is fatal and reports which phase stalled.
pub async fn drive<S: AsyncRead + AsyncWrite + Send + Unpin>(
    shell: &mut RemoteShell<S>,
    table: &MilestoneTable,
    progress: &Progress,
) -> Result<(), LifecycleError> {
    let total = table.len();
    for (phase, expected) in table.phases().iter().enumerate() {
        let mut patterns: Vec<&str> = Vec::with_capacity(expected.len() + 1);
        patterns.push(table.terminal());
        patterns.extend(expected.iter().map(String::as_str));

        match shell.expect(&patterns, table.phase_timeout()).await {
            Ok(0) => {
                tracing::debug!(phase, total, "terminal milestone arrived early");
                for _ in phase..total {
                    progress.tick();
                }
                return Ok(());
            }
            Ok(_) => {
                tracing::debug!(phase, total, "milestone reached");
                progress.tick();
            }
            Err(e) => {
                return Err(match e.downcast::<ExpectTimeout>() {
                    Ok(t) => LifecycleError::MilestoneStall {
                        phase,
                        phases: total,
                        expected: t.patterns,
                        timeout_secs: t.timeout_secs,
                    },
                    Err(other) => LifecycleError::Failed {
                        stage: "milestone wait",
                        cause: other,
                    },
                });
            }
        }
    }
    Ok(())
}
