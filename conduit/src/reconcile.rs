//! Polling-intent reconciliation.
//!
//! The data layer and the socket layer declare their polling needs
//! independently. Reconciliation picks the intent that currently drives the
//! connection, turns it into the state the poller should be in, and
//! compares that with what the poller was last told. Only the difference is
//! pushed to the poller.

use crate::connection::flags::{Direction, Flags, Intent, PollBits, PollState};

use std::fmt;

/// How the poller backend treats an enabled direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PollMode {
    /// I/O may be attempted before the poller reported readiness; a
    /// direction is only registered for polling after a would-block.
    #[default]
    Speculative,

    /// Every enabled direction must be registered for polling.
    PollRequired,
}

/// The action needed to bring one direction from its current state to its
/// target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollChange {
    /// Nothing to do.
    Unchanged,
    /// Enable speculative I/O. Edge-triggered backends need no syscall.
    ///
    /// This is how a direction that is enabled but not polled gets
    /// "armed" in [`PollMode::Speculative`]: the armed state becomes
    /// ENABLED without POLLED, and the poller only registers the direction
    /// after a would-block. In [`PollMode::PollRequired`] the same intent
    /// yields [`PollChange::Arm`].
    Enable,
    /// Register the direction with the poller.
    Arm,
    /// Stop watching the direction.
    Stop,
}

/// The outcome of a reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPlan {
    pub read: PollChange,
    pub write: PollChange,
    pub target: Intent,
}

impl PollPlan {
    pub fn change(&self, dir: Direction) -> PollChange {
        match dir {
            Direction::Read => self.read,
            Direction::Write => self.write,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.read == PollChange::Unchanged && self.write == PollChange::Unchanged
    }
}

fn target_bits(declared: PollBits, error: bool, mode: PollMode) -> PollBits {
    if error {
        return PollBits::STOPPED;
    }

    match (declared.state(), mode) {
        (PollState::Stopped, _) => PollBits::STOPPED,
        (PollState::Enabled, PollMode::Speculative) => PollBits::ENABLED,
        (PollState::Enabled, PollMode::PollRequired) | (PollState::Polled, _) => PollBits::POLLED,
    }
}

/// Computes the polling state the poller should be in.
///
/// While any handshake is pending the socket layer's intent is used,
/// otherwise the data layer's. An error stops every direction.
pub fn target(flags: &Flags, mode: PollMode) -> Intent {
    let declared = flags.effective();
    let error = flags.status().is_error();

    Intent::new(
        target_bits(declared.read, error, mode),
        target_bits(declared.write, error, mode),
    )
}

fn change(curr: PollBits, target: PollBits) -> PollChange {
    if curr == target {
        return PollChange::Unchanged;
    }

    match target.state() {
        PollState::Stopped => PollChange::Stop,
        PollState::Enabled => PollChange::Enable,
        PollState::Polled => PollChange::Arm,
    }
}

/// Diffs the target polling state against the current one.
pub fn plan(flags: &Flags, mode: PollMode) -> PollPlan {
    let target = target(flags, mode);
    let curr = flags.curr();

    PollPlan {
        read: change(curr.read, target.read),
        write: change(curr.write, target.write),
        target,
    }
}

impl fmt::Display for PollChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PollChange::Unchanged => "unchanged",
            PollChange::Enable => "enable",
            PollChange::Arm => "arm",
            PollChange::Stop => "stop",
        };
        f.write_str(s)
    }
}
