use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("invalid length: expected {expected} bytes, found {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// A public key or ciphertext could not be parsed by the backend.
    #[error("invalid artifact: {0}")]
    InvalidArtifact(String),

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("decapsulation failed")]
    DecapsulationFailed,

    /// The private state handed to a backend was produced by another backend.
    #[error("private state does not belong to the {0} backend")]
    ForeignPrivateState(&'static str),

    #[error("{backend} does not support {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },

    #[error("invalid mac key")]
    InvalidMacKey,
}
