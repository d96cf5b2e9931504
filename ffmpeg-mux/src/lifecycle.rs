use std::fmt;

use crate::error::{MuxError, Result};

/// Muxer lifecycle. Transitions only move forward:
/// `Created -> Initialized -> Started -> Stopped -> Released`, and any
/// non-released state may jump straight to `Released`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MuxerState {
    Created,
    Initialized,
    Started,
    Stopped,
    Released,
}

impl MuxerState {
    /// Whether the muxer owns a container context in this state.
    pub fn has_context(self) -> bool {
        matches!(
            self,
            MuxerState::Initialized | MuxerState::Started | MuxerState::Stopped
        )
    }
}

impl fmt::Display for MuxerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MuxerState::Created => "CREATED",
            MuxerState::Initialized => "INITIALIZED",
            MuxerState::Started => "STARTED",
            MuxerState::Stopped => "STOPPED",
            MuxerState::Released => "RELEASED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Initialize,
    DeclareStream,
    Start,
    WriteSample,
    Stop,
    Release,
}

impl Operation {
    /// Whether the operation may run in `state`.
    pub fn allowed_in(self, state: MuxerState) -> bool {
        match self {
            Operation::Initialize => state == MuxerState::Created,
            Operation::DeclareStream | Operation::Start => state == MuxerState::Initialized,
            Operation::WriteSample | Operation::Stop => state == MuxerState::Started,
            Operation::Release => true,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Initialize => "initialize",
            Operation::DeclareStream => "declare stream",
            Operation::Start => "start",
            Operation::WriteSample => "write sample",
            Operation::Stop => "stop",
            Operation::Release => "release",
        };
        f.write_str(name)
    }
}

/// Rejects `op` with [`MuxError::InvalidState`] unless `state` permits it.
pub fn require(op: Operation, state: MuxerState) -> Result<()> {
    if op.allowed_in(state) {
        Ok(())
    } else {
        log::warn!("rejected {} in state {}", op, state);
        Err(MuxError::InvalidState {
            operation: op,
            state,
        })
    }
}
