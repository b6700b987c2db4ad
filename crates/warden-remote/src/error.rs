/// Failure taxonomy for lifecycle operations.
///
/// `AlreadyBusy` and `UserInput` describe requests that are invalid in the
/// current state; they are meant to be shown to the user verbatim and are
/// never logged as faults. Everything else is fatal to the operation that
/// raised it.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("another lifecycle operation is already in progress")]
    AlreadyBusy,

    #[error("{0}")]
    UserInput(String),

    #[error("host did not become reachable after {attempts} probe attempts")]
    HostBootTimeout { attempts: u32 },

    #[error("could not establish an SSH connection after {attempts} attempts")]
    ConnectTimeout { attempts: u32 },

    #[error(
        "no milestone matched within {timeout_secs}s while waiting for {expected:?} (phase {phase} of {phases})"
    )]
    MilestoneStall {
        phase: usize,
        phases: usize,
        expected: Vec<String>,
        timeout_secs: u64,
    },

    #[error("{stage} failed: {cause}")]
    Failed {
        stage: &'static str,
        cause: anyhow::Error,
    },

    #[error("{original}; cleanup after the failure also failed: {cleanup}")]
    CompoundTeardown {
        original: Box<LifecycleError>,
        cleanup: anyhow::Error,
    },

    #[error("operation cancelled")]
    Cancelled,
}

impl LifecycleError {
    pub fn user_input(message: impl Into<String>) -> Self {
        Self::UserInput(message.into())
    }

    /// True for errors the user caused (show verbatim, don't log as a fault).
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::AlreadyBusy | Self::UserInput(_))
    }

    /// Fold the outcome of a cleanup attempt into this error. A failed
    /// cleanup never replaces the original error and is never dropped.
    pub(crate) fn with_cleanup(self, cleanup: anyhow::Result<()>) -> Self {
        match cleanup {
            Ok(()) => self,
            Err(cleanup) => Self::CompoundTeardown {
                original: Box::new(self),
                cleanup,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_input_displays_verbatim() {
        let e = LifecycleError::user_input("the server is already running");
        assert_eq!(e.to_string(), "the server is already running");
        assert!(e.is_user_error());
    }

    #[test]
    fn with_cleanup_keeps_original_on_success() {
        let e = LifecycleError::HostBootTimeout { attempts: 15 };
        let e = e.with_cleanup(Ok(()));
        assert!(matches!(e, LifecycleError::HostBootTimeout { attempts: 15 }));
    }

    #[test]
    fn compound_shows_both_errors() {
        let e = LifecycleError::MilestoneStall {
            phase: 2,
            phases: 5,
            expected: vec!["Done".into()],
            timeout_secs: 150,
        };
        let e = e.with_cleanup(Err(anyhow::anyhow!("session refused to die")));
        let msg = e.to_string();
        assert!(msg.contains("no milestone matched"));
        assert!(msg.contains("session refused to die"));
    }
}
