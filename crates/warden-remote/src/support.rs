use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::LifecycleError;

pub(crate) fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse::<u64>().ok())
}

pub(crate) fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn env_bool(name: &str) -> Option<bool> {
    match std::env::var(name).ok()?.trim().to_ascii_lowercase().as_str() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

pub(crate) fn format_error_chain(err: &anyhow::Error) -> String {
    let mut parts = Vec::<String>::new();
    for cause in err.chain() {
        let s = cause.to_string();
        if s.is_empty() {
            continue;
        }
        if parts.last() == Some(&s) {
            continue;
        }
        parts.push(s);
    }
    if parts.is_empty() {
        "unknown error".to_string()
    } else {
        parts.join(": ")
    }
}

/// First occurrence of `needle` in `haystack`, byte-wise.
pub(crate) fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Sleep that aborts early when the caller cancels the operation.
pub(crate) async fn sleep_cancellable(
    duration: Duration,
    cancel: &CancellationToken,
) -> Result<(), LifecycleError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(LifecycleError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Race a future against cancellation. The future is dropped on cancel, so it
/// must not be mid-way through something that needs explicit teardown; run
/// teardown at the call site after this returns `Cancelled`.
pub(crate) async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = T>,
) -> Result<T, LifecycleError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(LifecycleError::Cancelled),
        v = fut => Ok(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_subslice_basic() {
        assert_eq!(find_subslice(b"hello world", b"world"), Some(6));
        assert_eq!(find_subslice(b"hello", b"world"), None);
        assert_eq!(find_subslice(b"abc", b""), None);
        assert_eq!(find_subslice(b"ab", b"abc"), None);
    }

    #[test]
    fn format_error_chain_dedups_adjacent() {
        let inner = anyhow::anyhow!("boom");
        let err = inner.context("boom").context("outer");
        assert_eq!(format_error_chain(&err), "outer: boom");
    }

    #[tokio::test]
    async fn sleep_cancellable_returns_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let r = sleep_cancellable(Duration::from_secs(60), &cancel).await;
        assert!(matches!(r, Err(LifecycleError::Cancelled)));
    }

    #[tokio::test]
    async fn cancellable_passes_value_through() {
        let cancel = CancellationToken::new();
        let r = cancellable(&cancel, async { 7 }).await.unwrap();
        assert_eq!(r, 7);
    }
}
