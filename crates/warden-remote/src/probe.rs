use warden_core::ServerState;

use crate::config::{HostCredentials, Timings};
use crate::net::HostNetwork;
use crate::support::format_error_chain;

/// Fresh reachability snapshot. An unreachable host short-circuits the
/// process check, so `process_reachable` can never hold without
/// `host_reachable`.
pub async fn probe<N: HostNetwork>(
    net: &N,
    credentials: &HostCredentials,
    timings: &Timings,
) -> ServerState {
    if !net
        .ping(&credentials.host, credentials.ssh_port, timings.ping_timeout)
        .await
    {
        return ServerState::offline();
    }

    let process_reachable = match net
        .query_status(&credentials.server_address, timings.status_timeout)
        .await
    {
        Ok(_) => true,
        Err(e) => {
            // Plain connectivity failures just mean "not running".
            if !is_connectivity_error(&e) {
                tracing::warn!(error = %format_error_chain(&e), "status query failed unexpectedly");
            }
            false
        }
    };

    ServerState {
        host_reachable: true,
        process_reachable,
    }
}

fn is_connectivity_error(e: &anyhow::Error) -> bool {
    e.chain()
        .any(|c| c.is::<std::io::Error>() || c.is::<tokio::time::error::Elapsed>())
}
