use tokio_util::sync::CancellationToken;

use crate::config::{HostCredentials, Timings};
use crate::net::HostNetwork;
use crate::support::{format_error_chain, sleep_cancellable};

/// Fire-and-forget wake burst: a fixed number of magic packets spaced by a
/// fixed gap. No configured hardware address means there is nothing to do;
/// send failures are logged and swallowed.
pub async fn wake<N: HostNetwork>(
    net: &N,
    credentials: &HostCredentials,
    timings: &Timings,
    cancel: &CancellationToken,
) {
    let Some(mac) = credentials.wake_mac.as_deref() else {
        return;
    };

    tracing::debug!(packets = timings.wake_packets, "sending wake burst");
    for sent in 0..timings.wake_packets {
        if cancel.is_cancelled() {
            return;
        }
        if let Err(e) = net.send_magic_packet(mac).await {
            tracing::warn!(error = %format_error_chain(&e), "failed to send wake packet");
        }
        if sent + 1 < timings.wake_packets
            && sleep_cancellable(timings.wake_packet_gap, cancel).await.is_err()
        {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::io::DuplexStream;

    use crate::status::StatusPing;

    struct CountingNet {
        packets: Arc<AtomicU32>,
    }

    impl HostNetwork for CountingNet {
        type Stream = DuplexStream;

        async fn ping(&self, _host: &str, _port: u16, _timeout: Duration) -> bool {
            false
        }

        async fn query_status(
            &self,
            _address: &str,
            _timeout: Duration,
        ) -> anyhow::Result<StatusPing> {
            anyhow::bail!("not used")
        }

        async fn send_magic_packet(&self, _mac: &str) -> anyhow::Result<()> {
            self.packets.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn open_shell(
            &self,
            _credentials: &HostCredentials,
            _timeout: Duration,
        ) -> anyhow::Result<DuplexStream> {
            anyhow::bail!("not used")
        }
    }

    fn creds(mac: Option<&str>) -> HostCredentials {
        HostCredentials {
            host: "mc-host".into(),
            ssh_port: 22,
            user: "admin".into(),
            password: "secret".into(),
            wake_mac: mac.map(str::to_string),
            server_address: "mc-host:25565".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sends_the_configured_burst() {
        let packets = Arc::new(AtomicU32::new(0));
        let net = CountingNet {
            packets: packets.clone(),
        };
        let mut timings = Timings::production();
        timings.wake_packets = 10;

        wake(&net, &creds(Some("AA:BB:CC:DD:EE:FF")), &timings, &CancellationToken::new()).await;
        assert_eq!(packets.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn missing_mac_is_a_silent_no_op() {
        let packets = Arc::new(AtomicU32::new(0));
        let net = CountingNet {
            packets: packets.clone(),
        };
        wake(&net, &creds(None), &Timings::debug(), &CancellationToken::new()).await;
        assert_eq!(packets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancellation_cuts_the_burst_short() {
        let packets = Arc::new(AtomicU32::new(0));
        let net = CountingNet {
            packets: packets.clone(),
        };
        let mut timings = Timings::debug();
        timings.wake_packets = 50;
        timings.wake_packet_gap = Duration::from_secs(60);

        let cancel = CancellationToken::new();
        cancel.cancel();
        wake(&net, &creds(Some("AA:BB:CC:DD:EE:FF")), &timings, &cancel).await;
        assert_eq!(packets.load(Ordering::SeqCst), 0);
    }
}
