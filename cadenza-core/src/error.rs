use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while encoding or decoding a wire message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message is not a non-empty JSON array with a name")]
    NotAMessage,

    #[error("unknown message name `{0}`")]
    UnknownName(String),

    #[error("`{name}`: missing argument {index} ({what})")]
    MissingArgument {
        name: String,
        index: usize,
        what: &'static str,
    },

    #[error("`{name}`: bad argument {index} ({what}): {source}")]
    BadArgument {
        name: String,
        index: usize,
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("`{name}`: {extra} unexpected trailing argument(s)")]
    TrailingArguments { name: String, extra: usize },
}

impl ProtocolError {
    /// An unknown name is a contract violation between controller and engine,
    /// every other decoding failure only affects the one line.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProtocolError::UnknownName(_))
    }
}

/// Errors raised by a media pipeline (playback output or rip chain).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot decode {}: {message}", path.display())]
    Decode { path: PathBuf, message: String },

    #[error("no source bound to the pipeline")]
    NoSource,

    #[error("seek failed: {0}")]
    Seek(String),

    #[error("audio output: {0}")]
    Output(String),

    #[error("{tool} failed: {message}")]
    Tool { tool: String, message: String },

    #[error("pipeline thread is gone")]
    Disconnected,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors on the controller side of an engine channel.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("cannot spawn {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("child process is missing its {0} pipe")]
    MissingPipe(&'static str),

    #[error("cannot write to engine: {0}")]
    Write(#[source] std::io::Error),

    #[error("cannot wait for engine exit: {0}")]
    Wait(#[source] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
