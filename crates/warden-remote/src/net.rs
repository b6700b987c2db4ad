//! Outbound networking primitives, behind one seam so tests can script them.

use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpStream, UdpSocket};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::config::HostCredentials;
use crate::status::{self, StatusPing};

/// The four primitives every lifecycle component reaches the host through:
/// reachability ping, game-server status query, wake broadcast, and an
/// interactive shell.
pub trait HostNetwork: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin;

    /// TCP-level reachability of the host. Never errors; any failure within
    /// the timeout means "not reachable".
    fn ping(&self, host: &str, port: u16, timeout: Duration) -> impl Future<Output = bool> + Send;

    /// Status query against the game server's own protocol.
    fn query_status(
        &self,
        address: &str,
        timeout: Duration,
    ) -> impl Future<Output = anyhow::Result<StatusPing>> + Send;

    /// One wake-on-LAN magic packet.
    fn send_magic_packet(&self, mac: &str) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// One authenticated interactive shell attempt.
    fn open_shell(
        &self,
        credentials: &HostCredentials,
        timeout: Duration,
    ) -> impl Future<Output = anyhow::Result<Self::Stream>> + Send;
}

/// Production implementation over the tokio networking stack. The shell is
/// the system `ssh` client driven through its stdio, spawned under `sshpass`
/// so password auth works without a local tty.
#[derive(Debug, Clone, Default)]
pub struct TokioHostNetwork;

impl HostNetwork for TokioHostNetwork {
    type Stream = SshStream;

    async fn ping(&self, host: &str, port: u16, timeout: Duration) -> bool {
        matches!(
            tokio::time::timeout(timeout, TcpStream::connect((host, port))).await,
            Ok(Ok(_))
        )
    }

    async fn query_status(&self, address: &str, timeout: Duration) -> anyhow::Result<StatusPing> {
        status::query(address, timeout).await
    }

    async fn send_magic_packet(&self, mac: &str) -> anyhow::Result<()> {
        let packet = magic_packet(mac)?;
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .context("bind wake socket")?;
        socket.set_broadcast(true).context("enable broadcast")?;
        socket
            .send_to(&packet, ("255.255.255.255", 9))
            .await
            .context("send wake packet")?;
        Ok(())
    }

    async fn open_shell(
        &self,
        credentials: &HostCredentials,
        timeout: Duration,
    ) -> anyhow::Result<SshStream> {
        let mut cmd = Command::new("sshpass");
        cmd.arg("-e")
            .arg("ssh")
            .arg("-tt")
            .arg("-p")
            .arg(credentials.ssh_port.to_string())
            .arg("-o")
            .arg("StrictHostKeyChecking=accept-new")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", timeout.as_secs().max(1)))
            .arg(format!("{}@{}", credentials.user, credentials.host))
            .env("SSHPASS", &credentials.password)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .context("spawn ssh client (sshpass and ssh must be installed)")?;
        let stdin = child.stdin.take().context("ssh stdin unavailable")?;
        let stdout = child.stdout.take().context("ssh stdout unavailable")?;

        Ok(SshStream {
            _child: child,
            stdin,
            stdout,
        })
    }
}

/// A spawned ssh client's stdio as one duplex stream. Dropping it kills the
/// ssh process, which ends the remote login.
#[derive(Debug)]
pub struct SshStream {
    _child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
}

impl AsyncRead for SshStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stdout).poll_read(cx, buf)
    }
}

impl AsyncWrite for SshStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.stdin).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stdin).poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stdin).poll_shutdown(cx)
    }
}

/// Wake-on-LAN frame: six 0xFF bytes followed by the hardware address
/// repeated sixteen times.
pub(crate) fn magic_packet(mac: &str) -> anyhow::Result<[u8; 102]> {
    let mac = parse_mac(mac)?;
    let mut packet = [0xFFu8; 102];
    for rep in 0..16 {
        packet[6 + rep * 6..12 + rep * 6].copy_from_slice(&mac);
    }
    Ok(packet)
}

fn parse_mac(raw: &str) -> anyhow::Result<[u8; 6]> {
    let parts: Vec<&str> = raw.split([':', '-']).collect();
    if parts.len() != 6 {
        anyhow::bail!("invalid hardware address: {raw}");
    }
    let mut mac = [0u8; 6];
    for (i, part) in parts.iter().enumerate() {
        mac[i] = u8::from_str_radix(part, 16)
            .map_err(|_| anyhow::anyhow!("invalid hardware address: {raw}"))?;
    }
    Ok(mac)
}
