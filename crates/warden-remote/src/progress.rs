use tokio::sync::mpsc;

use warden_core::ProgressTick;

/// Sink for progress ticks. Sends never block and never fail the operation:
/// a caller that stopped listening only loses the display, not the work.
#[derive(Debug, Clone)]
pub struct Progress {
    tx: mpsc::UnboundedSender<ProgressTick>,
}

impl Progress {
    pub fn new(tx: mpsc::UnboundedSender<ProgressTick>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressTick>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn tick(&self) {
        let _ = self.tx.send(ProgressTick::Advance);
    }

    pub fn wake_retry(&self) {
        let _ = self.tx.send(ProgressTick::WakeRetry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_arrive_in_order() {
        let (progress, mut rx) = Progress::channel();
        progress.tick();
        progress.wake_retry();
        progress.tick();
        assert_eq!(rx.try_recv().unwrap(), ProgressTick::Advance);
        assert_eq!(rx.try_recv().unwrap(), ProgressTick::WakeRetry);
        assert_eq!(rx.try_recv().unwrap(), ProgressTick::Advance);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_receiver_does_not_fail_sends() {
        let (progress, rx) = Progress::channel();
        drop(rx);
        progress.tick();
    }
}
