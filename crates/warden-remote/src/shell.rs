//! Interactive remote shell: pattern-waits over accumulated output, in the
//! style of an expect loop. The transport is anything `AsyncRead + AsyncWrite`;
//! production uses the spawned ssh client from [`crate::net`].

use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::config::{HostCredentials, Timings};
use crate::error::LifecycleError;
use crate::net::HostNetwork;
use crate::support::{cancellable, find_subslice, format_error_chain, sleep_cancellable};

/// Prompt marker installed on every shell right after login. Pattern waits
/// anchor on it instead of guessing at the host's own prompt.
pub(crate) const PROMPT: &str = "@warden# ";

const READ_CHUNK_BYTES: usize = 4096;

/// None of the awaited patterns showed up in time. Carried inside anyhow so
/// the session driver can turn it into a stall error with phase context.
#[derive(Debug, thiserror::Error)]
#[error("none of {patterns:?} appeared within {timeout_secs}s")]
pub struct ExpectTimeout {
    pub patterns: Vec<String>,
    pub timeout_secs: u64,
}

#[derive(Debug)]
pub struct RemoteShell<S> {
    stream: S,
    buffer: Vec<u8>,
}

impl<S: AsyncRead + AsyncWrite + Send + Unpin> RemoteShell<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: Vec::new(),
        }
    }

    pub async fn send_line(&mut self, line: &str) -> anyhow::Result<()> {
        self.stream
            .write_all(line.as_bytes())
            .await
            .context("write to remote shell")?;
        self.stream
            .write_all(b"\n")
            .await
            .context("write to remote shell")?;
        self.stream.flush().await.context("flush remote shell")?;
        Ok(())
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        self.stream
            .write_all(bytes)
            .await
            .context("write to remote shell")?;
        self.stream.flush().await.context("flush remote shell")?;
        Ok(())
    }

    /// Block until one of `patterns` appears in the remote output, returning
    /// the index of the pattern that matched. Output up to and including the
    /// match is consumed. When several patterns are present the earliest
    /// occurrence wins, ties resolved by pattern order.
    pub async fn expect(&mut self, patterns: &[&str], timeout: Duration) -> anyhow::Result<usize> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some((idx, end)) = earliest_match(&self.buffer, patterns) {
                self.buffer.drain(..end);
                return Ok(idx);
            }

            let mut chunk = [0u8; READ_CHUNK_BYTES];
            let read = tokio::time::timeout_at(deadline, self.stream.read(&mut chunk)).await;
            match read {
                Err(_) => {
                    return Err(ExpectTimeout {
                        patterns: patterns.iter().map(|p| p.to_string()).collect(),
                        timeout_secs: timeout.as_secs(),
                    }
                    .into());
                }
                Ok(Ok(0)) => anyhow::bail!("remote shell closed while waiting for {patterns:?}"),
                Ok(Ok(n)) => self.buffer.extend_from_slice(&chunk[..n]),
                Ok(Err(e)) => return Err(e).context("read from remote shell"),
            }
        }
    }

    /// Wait for the synchronized prompt.
    pub async fn prompt(&mut self, timeout: Duration) -> anyhow::Result<()> {
        self.expect(&[PROMPT], timeout).await.map(|_| ())
    }

    /// Install the prompt marker and turn off terminal echo. The marker is
    /// split across two quoted chunks so the command's own echo can never
    /// match a later pattern wait.
    pub(crate) async fn sync_prompt(&mut self, timeout: Duration) -> anyhow::Result<()> {
        self.send_line("stty -echo").await?;
        self.send_line("unset PROMPT_COMMAND; export PS1='@war'\"den# \"")
            .await?;
        self.prompt(timeout).await.context("synchronize prompt")
    }

    /// `sudo <command>`, answering the password prompt if one shows up. The
    /// two outcomes are raced: either the literal `sudo` reappears (password
    /// prompt) or an ordinary shell prompt does. The secret is only sent for
    /// the first.
    pub async fn sudo_command(
        &mut self,
        command: &str,
        secret: &str,
        timeout: Duration,
    ) -> anyhow::Result<()> {
        self.send_line(&format!("sudo {command}")).await?;
        let matched = self
            .expect(&["sudo", "@"], timeout)
            .await
            .context("wait for sudo outcome")?;
        if matched == 0 {
            self.send_line(secret).await?;
        }
        Ok(())
    }

    pub async fn maybe_sudo_command(
        &mut self,
        command: &str,
        elevated: bool,
        secret: &str,
        timeout: Duration,
    ) -> anyhow::Result<()> {
        if elevated {
            self.sudo_command(command, secret, timeout).await
        } else {
            self.send_line(command).await
        }
    }

    /// Best-effort orderly logout; the remote side may already be gone.
    pub async fn logout(&mut self) {
        let _ = self.send_line("exit").await;
        let _ = self.stream.shutdown().await;
    }
}

fn earliest_match(buffer: &[u8], patterns: &[&str]) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None; // (start, pattern index)
    for (idx, pattern) in patterns.iter().enumerate() {
        if let Some(start) = find_subslice(buffer, pattern.as_bytes())
            && best.is_none_or(|(s, _)| start < s)
        {
            best = Some((start, idx));
        }
    }
    best.map(|(start, idx)| (idx, start + patterns[idx].len()))
}

/// Open an authenticated shell with bounded retry. Each failed attempt is
/// logged and retried after a fixed gap; only after the last attempt does the
/// timeout-class error surface.
pub async fn connect<N: HostNetwork>(
    net: &N,
    credentials: &HostCredentials,
    timings: &Timings,
    cancel: &CancellationToken,
) -> Result<RemoteShell<N::Stream>, LifecycleError> {
    let attempts = timings.login_attempts.max(1);
    for attempt in 1..=attempts {
        let result = cancellable(cancel, async {
            let stream =
                tokio::time::timeout(timings.login_timeout, net.open_shell(credentials, timings.login_timeout))
                    .await
                    .context("ssh connect timed out")??;
            let mut shell = RemoteShell::new(stream);
            shell.sync_prompt(timings.prompt_timeout).await?;
            anyhow::Ok(shell)
        })
        .await?;

        match result {
            Ok(shell) => {
                tracing::debug!(attempt, "ssh connection established");
                return Ok(shell);
            }
            Err(e) => {
                tracing::warn!(
                    attempt,
                    attempts,
                    error = %format_error_chain(&e),
                    "could not connect to host"
                );
                if attempt == attempts {
                    return Err(LifecycleError::ConnectTimeout { attempts });
                }
                sleep_cancellable(timings.login_retry_gap, cancel).await?;
            }
        }
    }
    Err(LifecycleError::ConnectTimeout { attempts })
}
