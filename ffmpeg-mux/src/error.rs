//! Error taxonomy returned by every muxer operation.
//!
//! Engine failures arrive as [`ffmpeg_next::Error`] (FFmpeg's negative result
//! codes) and are translated here into a closed set of kinds. The engine error
//! is kept as the `source` so hosts can still log the underlying cause.

use std::fmt;

use thiserror::Error;

use crate::lifecycle::{MuxerState, Operation};

pub type Result<T> = std::result::Result<T, MuxError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MuxError {
    /// The container context (or a stream slot inside it) could not be created.
    #[error("failed to allocate {what}")]
    AllocationFailure {
        what: String,
        #[source]
        source: ffmpeg_next::Error,
    },

    /// The output destination could not be opened or closed.
    #[error("I/O failure on {path}: {source}")]
    IoFailure {
        path: String,
        #[source]
        source: ffmpeg_next::Error,
    },

    /// The container header or trailer could not be written.
    #[error("failed to write container {stage}: {source}")]
    FormatFailure {
        stage: FormatStage,
        #[source]
        source: ffmpeg_next::Error,
    },

    #[error("unknown codec: {0}")]
    UnknownCodec(String),

    #[error("{operation} is not allowed while the muxer is {state}")]
    InvalidState {
        operation: Operation,
        state: MuxerState,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A single sample was rejected by the engine. The session stays usable.
    #[error("failed to write sample to stream {stream_index}: {source}")]
    WriteFailure {
        stream_index: usize,
        #[source]
        source: ffmpeg_next::Error,
    },

    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

impl MuxError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MuxError::AllocationFailure { .. } => ErrorKind::AllocationFailure,
            MuxError::IoFailure { .. } => ErrorKind::IoFailure,
            MuxError::FormatFailure { .. } => ErrorKind::FormatFailure,
            MuxError::UnknownCodec(_) => ErrorKind::UnknownCodec,
            MuxError::InvalidState { .. } => ErrorKind::InvalidState,
            MuxError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            MuxError::WriteFailure { .. } => ErrorKind::WriteFailure,
            MuxError::Unsupported(_) => ErrorKind::Unsupported,
        }
    }

    /// The engine error behind this failure, if any.
    pub fn engine_error(&self) -> Option<ffmpeg_next::Error> {
        match self {
            MuxError::AllocationFailure { source, .. }
            | MuxError::IoFailure { source, .. }
            | MuxError::FormatFailure { source, .. }
            | MuxError::WriteFailure { source, .. } => Some(*source),
            _ => None,
        }
    }
}

/// Fieldless mirror of [`MuxError`] for hosts that only carry an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AllocationFailure,
    IoFailure,
    FormatFailure,
    UnknownCodec,
    InvalidState,
    InvalidArgument,
    WriteFailure,
    Unsupported,
}

impl ErrorKind {
    /// Stable negative code, following the engine's "negative means error"
    /// convention. Zero is never returned.
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::AllocationFailure => -1,
            ErrorKind::IoFailure => -2,
            ErrorKind::FormatFailure => -3,
            ErrorKind::UnknownCodec => -4,
            ErrorKind::InvalidState => -5,
            ErrorKind::InvalidArgument => -6,
            ErrorKind::WriteFailure => -7,
            ErrorKind::Unsupported => -8,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        let kind = match code {
            -1 => ErrorKind::AllocationFailure,
            -2 => ErrorKind::IoFailure,
            -3 => ErrorKind::FormatFailure,
            -4 => ErrorKind::UnknownCodec,
            -5 => ErrorKind::InvalidState,
            -6 => ErrorKind::InvalidArgument,
            -7 => ErrorKind::WriteFailure,
            -8 => ErrorKind::Unsupported,
            _ => return None,
        };
        Some(kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatStage {
    Header,
    Trailer,
}

impl fmt::Display for FormatStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatStage::Header => write!(f, "header"),
            FormatStage::Trailer => write!(f, "trailer"),
        }
    }
}

/// Engine call that produced a failure; decides which kind it becomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EngineOp {
    AllocateContext,
    NewStreamSlot,
    OpenOutput,
    WriteHeader,
    WriteInterleaved { stream_index: usize },
    WriteTrailer,
    CloseOutput,
}

/// Translates an engine failure into the taxonomy. `target` names the thing
/// being operated on (format/path) for allocation and I/O failures.
pub(crate) fn translate(op: EngineOp, target: &str, source: ffmpeg_next::Error) -> MuxError {
    match op {
        EngineOp::AllocateContext => MuxError::AllocationFailure {
            what: format!("output context for {}", target),
            source,
        },
        EngineOp::NewStreamSlot => MuxError::AllocationFailure {
            what: format!("stream slot in {}", target),
            source,
        },
        EngineOp::OpenOutput | EngineOp::CloseOutput => MuxError::IoFailure {
            path: target.to_string(),
            source,
        },
        EngineOp::WriteHeader => MuxError::FormatFailure {
            stage: FormatStage::Header,
            source,
        },
        EngineOp::WriteTrailer => MuxError::FormatFailure {
            stage: FormatStage::Trailer,
            source,
        },
        EngineOp::WriteInterleaved { stream_index } => MuxError::WriteFailure {
            stream_index,
            source,
        },
    }
}
