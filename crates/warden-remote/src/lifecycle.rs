//! Start/stop sequencing over all the lower pieces: probe, wake, boot, shell,
//! persistent session, milestone driver. One operation runs at a time; every
//! exit path tears down what it opened and releases the busy flag.

use tokio_util::sync::CancellationToken;

use warden_core::{ServerState, WorldProfile};

use crate::boot;
use crate::busy::BusyFlag;
use crate::config::{HostCredentials, Timings};
use crate::error::LifecycleError;
use crate::milestones::MilestoneTable;
use crate::net::HostNetwork;
use crate::probe;
use crate::profiles::ProfileSource;
use crate::progress::Progress;
use crate::session;
use crate::shell::{self, RemoteShell};
use crate::support::cancellable;

/// Console command that asks the game server to shut itself down.
const STOP_COMMAND: &str = "stop";
const HOST_SHUTDOWN_COMMAND: &str = "shutdown -h now";

pub struct Orchestrator<N, P> {
    net: N,
    profiles: P,
    credentials: HostCredentials,
    timings: Timings,
    busy: BusyFlag,
}

impl<N: HostNetwork, P: ProfileSource> Orchestrator<N, P> {
    pub fn new(net: N, profiles: P, credentials: HostCredentials, timings: Timings) -> Self {
        Self {
            net,
            profiles,
            credentials,
            timings,
            busy: BusyFlag::new(),
        }
    }

    /// Handle to the single-flight guard, e.g. for a frontend busy indicator.
    pub fn busy_flag(&self) -> BusyFlag {
        self.busy.clone()
    }

    pub fn timings(&self) -> &Timings {
        &self.timings
    }

    /// Fresh reachability snapshot; never cached.
    pub async fn query_state(&self) -> ServerState {
        probe::probe(&self.net, &self.credentials, &self.timings).await
    }

    /// Wake the host if needed, then launch the selected world inside a
    /// persistent session and follow its console through the boot milestones.
    pub async fn start(
        &self,
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<(), LifecycleError> {
        let state = probe::probe(&self.net, &self.credentials, &self.timings).await;
        tracing::info!(
            host = state.host_reachable,
            server = state.process_reachable,
            "server state before start"
        );
        if state.host_reachable && state.process_reachable {
            // Invalid request; the busy flag is deliberately left untouched.
            return Err(LifecycleError::user_input("the server is already running"));
        }

        let _permit = self.busy.try_acquire()?;
        progress.tick();

        if state.host_reachable {
            // Same number of bar steps as a real boot, so pacing matches.
            for _ in 0..self.timings.boot_attempts {
                progress.tick();
            }
        } else {
            match boot::boot_host(&self.net, &self.credentials, &self.timings, progress, cancel)
                .await
            {
                Ok(()) => {}
                Err(LifecycleError::HostBootTimeout { .. }) => {
                    // One documented second pass before giving up for real.
                    tracing::warn!("host boot timed out, retrying the wake cycle once");
                    boot::boot_host(&self.net, &self.credentials, &self.timings, progress, cancel)
                        .await?;
                }
                Err(e) => return Err(e),
            }
        }
        progress.tick();

        self.start_managed(progress, cancel).await
    }

    /// Stop the game server, optionally powering the host down afterwards.
    pub async fn stop(
        &self,
        shutdown_host: bool,
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<(), LifecycleError> {
        let _permit = self.busy.try_acquire()?;

        // The shell is needed on every path, including plain host shutdown.
        let mut shell = shell::connect(&self.net, &self.credentials, &self.timings, cancel).await?;

        let state = probe::probe(&self.net, &self.credentials, &self.timings).await;
        tracing::info!(
            host = state.host_reachable,
            server = state.process_reachable,
            "server state before stop"
        );

        if !state.host_reachable && !state.process_reachable {
            shell.logout().await;
            return Err(LifecycleError::user_input("the server is already stopped"));
        }
        if !shutdown_host && !state.process_reachable {
            shell.logout().await;
            return Err(LifecycleError::user_input(
                "the game server is already stopped; the host is still up",
            ));
        }
        progress.tick();

        let result = self
            .run_stop_sequence(&mut shell, state, shutdown_host, progress, cancel)
            .await;

        // Last step on every branch: leave the login shell cleanly.
        shell.logout().await;
        result?;
        progress.tick();
        Ok(())
    }

    async fn start_managed(
        &self,
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<(), LifecycleError> {
        let mut shell = shell::connect(&self.net, &self.credentials, &self.timings, cancel).await?;

        let profile = match self.profiles.selected_profile().await {
            Ok(p) => p,
            Err(e) => {
                shell.logout().await;
                return Err(LifecycleError::Failed {
                    stage: "load selected world profile",
                    cause: e,
                });
            }
        };

        if let Err(e) = session::create(
            &mut shell,
            &session::session_name(),
            profile.requires_elevated_start,
            &self.credentials.password,
            self.timings.prompt_timeout,
        )
        .await
        {
            shell.logout().await;
            return Err(LifecycleError::Failed {
                stage: "create persistent session",
                cause: e,
            });
        }
        progress.tick();

        let result = match cancellable(
            cancel,
            self.run_boot_sequence(&mut shell, &profile, progress),
        )
        .await
        {
            Ok(inner) => inner,
            Err(cancelled) => Err(cancelled),
        };

        match result {
            Ok(()) => {
                shell.logout().await;
                progress.tick();
                Ok(())
            }
            Err(original) => {
                tracing::warn!(error = %original, "start failed, tearing down persistent session");
                let cleanup = self
                    .teardown_session(&mut shell, profile.requires_elevated_start)
                    .await;
                Err(original.with_cleanup(cleanup))
            }
        }
    }

    async fn run_boot_sequence(
        &self,
        shell: &mut RemoteShell<N::Stream>,
        profile: &WorldProfile,
        progress: &Progress,
    ) -> Result<(), LifecycleError> {
        tracing::debug!(world = %profile.name, "issuing start command");
        shell
            .send_line(&profile.start_command)
            .await
            .map_err(|e| LifecycleError::Failed {
                stage: "issue start command",
                cause: e,
            })?;
        progress.tick();

        session::drive(shell, &MilestoneTable::boot(&self.timings), progress).await?;

        // The server is up; leave the session running and return to the
        // login shell.
        session::detach(shell).await.map_err(|e| LifecycleError::Failed {
            stage: "detach persistent session",
            cause: e,
        })?;
        shell
            .prompt(self.timings.prompt_timeout)
            .await
            .map_err(|e| LifecycleError::Failed {
                stage: "detach persistent session",
                cause: e,
            })?;
        Ok(())
    }

    async fn run_stop_sequence(
        &self,
        shell: &mut RemoteShell<N::Stream>,
        state: ServerState,
        shutdown_host: bool,
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<(), LifecycleError> {
        if state.process_reachable {
            let profile = self
                .profiles
                .selected_profile()
                .await
                .map_err(|e| LifecycleError::Failed {
                    stage: "load selected world profile",
                    cause: e,
                })?;
            let elevated = profile.requires_elevated_start;

            session::attach(
                shell,
                &session::session_name(),
                elevated,
                &self.credentials.password,
                self.timings.prompt_timeout,
            )
            .await
            .map_err(|e| LifecycleError::Failed {
                stage: "attach persistent session",
                cause: e,
            })?;
            progress.tick();

            let drove = match cancellable(cancel, async {
                shell
                    .send_line(STOP_COMMAND)
                    .await
                    .map_err(|e| LifecycleError::Failed {
                        stage: "issue stop command",
                        cause: e,
                    })?;
                session::drive(shell, &MilestoneTable::shutdown(&self.timings), progress).await
            })
            .await
            {
                Ok(inner) => inner,
                Err(cancelled) => Err(cancelled),
            };

            // The session is done either way: leave it and kill it.
            let cleanup: anyhow::Result<()> = async {
                session::detach(shell).await?;
                let _ = shell.prompt(self.timings.prompt_timeout).await;
                session::kill(
                    shell,
                    &session::session_name(),
                    elevated,
                    &self.credentials.password,
                    self.timings.prompt_timeout,
                )
                .await?;
                let _ = shell.prompt(self.timings.prompt_timeout).await;
                Ok(())
            }
            .await;

            match (drove, cleanup) {
                (Ok(()), Ok(())) => {}
                (Ok(()), Err(cleanup)) => {
                    return Err(LifecycleError::Failed {
                        stage: "tear down persistent session",
                        cause: cleanup,
                    });
                }
                (Err(original), cleanup) => return Err(original.with_cleanup(cleanup)),
            }
        } else {
            // No session to drive; keep the bar pacing of the real path.
            for _ in 0..self.timings.stop_filler_ticks {
                progress.tick();
            }
        }
        progress.tick();

        if shutdown_host && state.host_reachable && !is_local_host(&self.credentials.host) {
            tracing::debug!("shutting down host");
            shell
                .sudo_command(
                    HOST_SHUTDOWN_COMMAND,
                    &self.credentials.password,
                    self.timings.prompt_timeout,
                )
                .await
                .map_err(|e| LifecycleError::Failed {
                    stage: "host shutdown",
                    cause: e,
                })?;
        }
        progress.tick();
        Ok(())
    }

    /// Orderly unwinding after a failure: leave the session, kill it, log
    /// out. Prompt waits in here are best-effort; the session may be gone.
    async fn teardown_session(
        &self,
        shell: &mut RemoteShell<N::Stream>,
        elevated: bool,
    ) -> anyhow::Result<()> {
        session::detach(shell).await?;
        let _ = shell.prompt(self.timings.prompt_timeout).await;
        session::kill(
            shell,
            &session::session_name(),
            elevated,
            &self.credentials.password,
            self.timings.prompt_timeout,
        )
        .await?;
        let _ = shell.prompt(self.timings.prompt_timeout).await;
        shell.logout().await;
        Ok(())
    }
}

/// Host shutdown is refused for loopback targets; powering off the machine
/// the controller runs on would strand it.
fn is_local_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}
