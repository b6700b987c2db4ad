use std::time::Duration;

use crate::config::Timings;

/// Ordered list of expected console milestones for one operation, plus the
/// terminal pattern that ends the operation no matter which phase it arrives
/// in. Phase lists and timeouts vary release to release, so tables are built
/// from configuration rather than baked into the driver.
#[derive(Debug, Clone)]
pub struct MilestoneTable {
    phases: Vec<Vec<String>>,
    terminal: String,
    phase_timeout: Duration,
}

impl MilestoneTable {
    pub fn new(
        phases: Vec<Vec<String>>,
        terminal: impl Into<String>,
        phase_timeout: Duration,
    ) -> Self {
        Self {
            phases,
            terminal: terminal.into(),
            phase_timeout,
        }
    }

    /// Boot milestones of a vanilla game server. The final phase has no
    /// pattern of its own: only "Done" can finish it.
    pub fn boot(timings: &Timings) -> Self {
        Self::new(
            owned(&[
                &["Starting", "running"],
                &["Loading libraries", "Loading"],
                &["Environment", "Preparing"],
                &["Preparing level"],
                &[],
            ]),
            "Done",
            timings.phase_timeout,
        )
    }

    /// World-save milestones printed while the server shuts down. One long
    /// timeout covers the whole sequence.
    pub fn shutdown(timings: &Timings) -> Self {
        Self::new(
            owned(&[&["overworld"], &["nether"], &["end"], &["All"]]),
            "All",
            timings.shutdown_timeout,
        )
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub(crate) fn phases(&self) -> &[Vec<String>] {
        &self.phases
    }

    pub(crate) fn terminal(&self) -> &str {
        &self.terminal
    }

    pub(crate) fn phase_timeout(&self) -> Duration {
        self.phase_timeout
    }
}

fn owned(phases: &[&[&str]]) -> Vec<Vec<String>> {
    phases
        .iter()
        .map(|p| p.iter().map(|s| s.to_string()).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_table_shape() {
        let table = MilestoneTable::boot(&Timings::production());
        assert_eq!(table.len(), 5);
        assert_eq!(table.terminal(), "Done");
        assert!(table.phases().last().unwrap().is_empty());
    }

    #[test]
    fn shutdown_table_shape() {
        let table = MilestoneTable::shutdown(&Timings::production());
        assert_eq!(table.len(), 4);
        assert_eq!(table.terminal(), "All");
    }
}
