//! # liveness-client
//!
//! Command-line host for one liveness verification session: loads a
//! TOML config, streams frames from a still-image directory or the test
//! pattern, and prints each instruction to the terminal.

pub mod config;
pub mod sink;

use std::process::ExitCode;

use liveness_core::SessionOutcome;

/// Process exit status for a finished session: 0 verified, 1 rejected
/// by the service, 2 for anything else.
pub fn exit_code(outcome: &SessionOutcome) -> ExitCode {
    ExitCode::from(exit_status(outcome))
}

fn exit_status(outcome: &SessionOutcome) -> u8 {
    match outcome {
        SessionOutcome::Verified => 0,
        SessionOutcome::Failed { .. } => 1,
        _ => 2,
    }
}
