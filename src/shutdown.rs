use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::error::Result;
use crate::output::SIGNAL_RECEIVED;

/// Gates the wait loop. Only the shutdown handler clears it.
#[derive(Clone, Debug)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn request_stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}

pub trait ShutdownSignal {
    /// Arrange for `flag` to be cleared when shutdown is requested.
    fn register(&self, flag: &RunFlag) -> Result<()>;
}

/// SIGINT and SIGTERM, delivered on the `ctrlc` handler thread.
///
/// SIGHUP also stops the tracker gracefully. This is a deliberate departure
/// from treating only interrupt and terminate as shutdown: the `termination`
/// feature of `ctrlc` installs all three, and ending the session on hangup
/// still reports the measurement instead of losing it.
pub struct OsSignals;

impl ShutdownSignal for OsSignals {
    fn register(&self, flag: &RunFlag) -> Result<()> {
        let flag = flag.clone();
        // The stdout lock is taken before the flag is cleared, so the
        // acknowledgement always lands ahead of the stop report.
        ctrlc::set_handler(move || acknowledge(&flag, &mut io::stdout().lock()))?;
        Ok(())
    }
}

/// Clears the flag first so a dead stdout can never keep the loop alive.
/// Every delivery is acknowledged; clearing an already clear flag is a no-op.
fn acknowledge<W: Write>(flag: &RunFlag, out: &mut W) {
    flag.request_stop();
    if let Err(err) = writeln!(out, "{SIGNAL_RECEIVED}").and_then(|()| out.flush()) {
        debug!(error = %err, "could not acknowledge shutdown signal");
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Write};

    use super::{RunFlag, acknowledge};

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }
    }

    #[test]
    fn clones_share_state() {
        let flag = RunFlag::new();
        let handler_side = flag.clone();
        assert!(flag.is_running());

        handler_side.request_stop();
        handler_side.request_stop();
        assert!(!flag.is_running());
    }

    #[test]
    fn acknowledgement_is_printed_and_stops() {
        let flag = RunFlag::new();
        let mut out = Vec::new();
        acknowledge(&flag, &mut out);
        assert!(!flag.is_running());
        assert_eq!(out, b"Signal received, stopping the tracker...\n");
    }

    #[test]
    fn closed_stdout_still_stops() {
        let flag = RunFlag::new();
        acknowledge(&flag, &mut ClosedPipe);
        assert!(!flag.is_running());
    }
}
