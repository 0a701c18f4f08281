//! Error types for the handshake engine

use crate::types::{NodeId, Stage};
use thiserror::Error;

/// Errors raised by the simulated classical channel
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No node with this id is registered on the network
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    /// The destination's actor has shut down
    #[error("channel to {0} closed")]
    Closed(NodeId),

    /// A send-with-ack was not acknowledged before its deadline
    #[error("no acknowledgment from {to} within deadline")]
    AckTimeout { to: NodeId },

    /// A bounded receive elapsed with nothing queued
    #[error("nothing received from {from} within deadline")]
    RecvTimeout { from: NodeId },
}

/// Errors that end a handshake session
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// A bounded wait elapsed while trying to enter the given stage
    #[error("timed out entering {0}")]
    Timeout(Stage),

    /// Expected key material or ciphertext never arrived
    #[error("{artifact} not received from {from}")]
    MissingArtifact {
        artifact: &'static str,
        from: NodeId,
    },

    /// Artifact arrived but is not a hex string
    #[error("{artifact} from {from} is not valid hex")]
    MalformedArtifact {
        artifact: &'static str,
        from: NodeId,
    },

    /// A message other than the one the protocol expects at this point
    #[error("unexpected message: expected {expected}, got {got:?}")]
    UnexpectedMessage { expected: &'static str, got: String },

    /// MAC recomputed by the responder does not match the transmitted tag
    #[error("authentication mismatch ({malformed_skipped} malformed message(s) skipped)")]
    AuthenticationMismatch { malformed_skipped: usize },

    /// Attempted to leave the strict stage order
    #[error("invalid stage transition {from} -> {to}")]
    InvalidTransition { from: Stage, to: Stage },

    /// Session already reached a terminal stage
    #[error("session already finished in {0}")]
    AlreadyFinished(Stage),

    /// A pair list names the same link twice or pairs a node with itself
    #[error("invalid pair list: {0}")]
    InvalidPair(String),

    /// Node is not part of the topology
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    /// The key-exchange backend rejected an operation
    #[error("crypto error: {0}")]
    Crypto(#[from] crypto::CryptoError),

    /// The channel failed outside a bounded wait
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Result type for handshake operations
pub type Result<T> = std::result::Result<T, HandshakeError>;
