//! Signal handling for the CLI (SIGINT/SIGTERM)
//!
//! The first signal cancels the running build through the shared
//! [`CancellationToken`]; the pipeline then kills the toolchain, writes the
//! cancelled status and exits with the cancelled code. A second signal
//! SIGKILLs the toolchain's process group itself, writes the cancelled status
//! if it knows where, and exits immediately with the same code.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::{error, warn};

use crate::cancel::CancellationToken;
use crate::executor::kill_group;
use crate::status::{StatusReporter, CANCELLED_MESSAGE};
use crate::summary::EXIT_CODE_CANCELLED;

/// Action to take after receiving a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// First signal: cancel the build and let the pipeline wind down
    InitiateCancellation,
    /// Second signal: exit now
    ImmediateExit,
    /// Third+ signal
    Ignore,
}

/// Signal bookkeeping shared with the handler
#[derive(Debug)]
pub struct SignalState {
    signal_count: AtomicU8,
    token: CancellationToken,
    status: Option<StatusReporter>,
}

impl SignalState {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            signal_count: AtomicU8::new(0),
            token,
            status: None,
        }
    }

    /// Also write the cancelled status on an immediate exit
    pub fn with_status(mut self, status: StatusReporter) -> Self {
        self.status = Some(status);
        self
    }

    /// Record a signal and decide what to do
    pub fn handle_signal(&self) -> SignalAction {
        match self.signal_count.fetch_add(1, Ordering::SeqCst) {
            0 => {
                self.token.cancel();
                SignalAction::InitiateCancellation
            }
            1 => SignalAction::ImmediateExit,
            _ => SignalAction::Ignore,
        }
    }

    pub fn signal_count(&self) -> u8 {
        self.signal_count.load(Ordering::SeqCst)
    }

    /// Tear down the build without the pipeline's help
    ///
    /// Returns the process group that was killed, if a toolchain was running.
    pub fn abort_build(&self) -> Option<i32> {
        self.token.cancel();
        let killed = self.token.active_group();
        if let Some(pgid) = killed {
            kill_group(pgid);
        }
        if let Some(status) = &self.status {
            if let Err(e) = status.report(CANCELLED_MESSAGE) {
                error!(error = %e, "could not write cancelled status");
            }
        }
        killed
    }
}

/// Installs the process-wide handler
pub struct SignalHandler {
    state: Arc<SignalState>,
}

impl SignalHandler {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            state: Arc::new(SignalState::new(token)),
        }
    }

    /// Handler that knows the submission's status artifact
    pub fn with_status(token: CancellationToken, status: StatusReporter) -> Self {
        Self {
            state: Arc::new(SignalState::new(token).with_status(status)),
        }
    }

    pub fn state(&self) -> Arc<SignalState> {
        Arc::clone(&self.state)
    }

    /// Install handlers for SIGINT and SIGTERM
    ///
    /// Must be called at most once per process.
    pub fn install(&self) -> Result<(), ctrlc::Error> {
        let state = Arc::clone(&self.state);
        ctrlc::set_handler(move || match state.handle_signal() {
            SignalAction::InitiateCancellation => {
                warn!("received termination signal, cancelling build");
            }
            SignalAction::ImmediateExit => {
                warn!("received second termination signal, exiting");
                state.abort_build();
                std::process::exit(EXIT_CODE_CANCELLED);
            }
            SignalAction::Ignore => {}
        })
    }
}
