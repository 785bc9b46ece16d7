//! Typed error hierarchy for the bridge.
//!
//! Parse failures inside the protocol codecs are deliberately *not*
//! represented here: per the error-handling design, a short or malformed
//! frame degrades gracefully (the byte is skipped or carried over) and is
//! never propagated as a `Result::Err`. This enum only covers the handful of
//! failures that cross a task boundary.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("failed to bind local control socket: {0}")]
    ListenBind(#[source] io::Error),

    #[error("no reachable candidate for team {team:?}")]
    ResolveNoCandidate { team: String },

    #[error("failed to open {transport} transport: {source}")]
    TransportOpen {
        transport: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{transport} transport io error: {source}")]
    TransportIo {
        transport: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("NetworkTables connection failed: {source}")]
    NtOpen {
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, BridgeError>;
