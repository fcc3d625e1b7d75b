use std::io::Write;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::cli::TrackerCommand;
use crate::emissions::{Measurement, Session};
use crate::error::Result;
use crate::output::{self, OutputFormat};
use crate::shutdown::{RunFlag, ShutdownSignal};

#[derive(Debug)]
pub enum Outcome {
    MissingCommand,
    UnknownCommand,
    Stopped(Measurement),
}

/// Drives one measurement session from `start` until shutdown is requested.
pub struct Lifecycle {
    pub interval: Duration,
    pub format: OutputFormat,
}

impl Lifecycle {
    /// The session is only opened once the command is known to be `start`.
    pub fn execute<S, F, G, W>(
        &self,
        command: Option<&str>,
        open_session: F,
        signals: &G,
        out: &mut W,
    ) -> Result<Outcome>
    where
        S: Session,
        F: FnOnce() -> Result<S>,
        G: ShutdownSignal,
        W: Write,
    {
        let Some(raw) = command else {
            output::print_line(out, output::MISSING_COMMAND)?;
            return Ok(Outcome::MissingCommand);
        };
        output::print_line(out, output::STARTING)?;

        match TrackerCommand::parse(raw) {
            Some(TrackerCommand::Start) => {
                let session = open_session()?;
                let flag = RunFlag::new();
                signals.register(&flag)?;
                let measurement = self.start(session, &flag, out)?;
                Ok(Outcome::Stopped(measurement))
            }
            None => {
                debug!(command = raw, "unrecognized command");
                output::print_line(out, output::UNKNOWN_COMMAND)?;
                Ok(Outcome::UnknownCommand)
            }
        }
    }

    fn start<S: Session, W: Write>(
        &self,
        mut session: S,
        flag: &RunFlag,
        out: &mut W,
    ) -> Result<Measurement> {
        output::print_line(out, output::STARTED)?;
        session.begin()?;
        info!(interval = ?self.interval, "tracking until a termination signal arrives");

        let mut guard = StopGuard::new(session, out, self.format);
        wait_while_running(guard.session(), flag, self.interval)?;
        guard.finish()
    }
}

fn wait_while_running<S: Session>(
    session: &mut S,
    flag: &RunFlag,
    interval: Duration,
) -> Result<()> {
    while flag.is_running() {
        thread::sleep(interval);
        session.sample()?;
    }
    info!("shutdown requested");
    Ok(())
}

fn stop<S: Session, W: Write>(
    session: &mut S,
    out: &mut W,
    format: OutputFormat,
) -> Result<Measurement> {
    let measurement = session.end()?;
    output::print_stopped(out, format, &measurement)?;
    Ok(measurement)
}

/// Ends the session exactly once, on whichever path leaves the wait loop.
struct StopGuard<'a, S: Session, W: Write> {
    session: S,
    out: &'a mut W,
    format: OutputFormat,
    stopped: bool,
}

impl<'a, S: Session, W: Write> StopGuard<'a, S, W> {
    fn new(session: S, out: &'a mut W, format: OutputFormat) -> Self {
        Self {
            session,
            out,
            format,
            stopped: false,
        }
    }

    fn session(&mut self) -> &mut S {
        &mut self.session
    }

    fn finish(mut self) -> Result<Measurement> {
        self.stopped = true;
        stop(&mut self.session, &mut *self.out, self.format)
    }
}

impl<S: Session, W: Write> Drop for StopGuard<'_, S, W> {
    fn drop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        if let Err(err) = stop(&mut self.session, &mut *self.out, self.format) {
            error!(error = %err, "failed to stop the tracker");
        }
    }
}
