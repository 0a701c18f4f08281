use core::fmt;
use core::str::FromStr;

use crate::error::CryptoError;
use crate::secret::{PrivateState, SharedSecret};

/// Shape of the exchange a backend performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExchangeKind {
    /// Responder publishes a key, initiator encapsulates against it.
    Kem,
    /// Both sides publish a key and compute the secret locally.
    DiffieHellman,
    /// Initiator picks a secret and encrypts it to the responder's key.
    KeyTransport,
}

impl ExchangeKind {
    /// Whether the responder sends back a ciphertext for this exchange.
    pub fn uses_ciphertext(self) -> bool {
        matches!(self, ExchangeKind::Kem | ExchangeKind::KeyTransport)
    }
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExchangeKind::Kem => "kem",
            ExchangeKind::DiffieHellman => "dh",
            ExchangeKind::KeyTransport => "rsa",
        };
        f.write_str(name)
    }
}

impl FromStr for ExchangeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "kem" | "ml-kem" | "pqc" => Ok(ExchangeKind::Kem),
            "dh" | "ecdh" | "x25519" => Ok(ExchangeKind::DiffieHellman),
            "rsa" | "rsa-oaep" | "kt" => Ok(ExchangeKind::KeyTransport),
            other => Err(format!("unknown backend '{other}' (expected kem, dh or rsa)")),
        }
    }
}

/// Key-exchange capability consumed by the handshake core.
///
/// Artifacts and secrets are opaque byte strings. Operations that do not apply
/// to a variant return [`CryptoError::Unsupported`].
pub trait KeyExchangeBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn kind(&self) -> ExchangeKind;

    /// Length of the secrets this backend derives.
    fn secret_len(&self) -> usize;

    /// Generate a key pair, returning the public artifact to transmit and the
    /// private state the generating party keeps.
    fn generate_keypair(&self) -> Result<(Vec<u8>, PrivateState), CryptoError>;

    /// Produce `(ciphertext, secret)` against a peer's public artifact.
    fn encapsulate(&self, public: &[u8]) -> Result<(Vec<u8>, SharedSecret), CryptoError> {
        let _ = public;
        Err(CryptoError::Unsupported {
            backend: self.name(),
            operation: "encapsulate",
        })
    }

    /// Recover the secret from a ciphertext with the retained private state.
    fn decapsulate(
        &self,
        ciphertext: &[u8],
        private: &PrivateState,
    ) -> Result<SharedSecret, CryptoError> {
        let _ = (ciphertext, private);
        Err(CryptoError::Unsupported {
            backend: self.name(),
            operation: "decapsulate",
        })
    }

    /// Combine our private state with the peer's public artifact.
    fn compute_shared(
        &self,
        private: &PrivateState,
        peer_public: &[u8],
    ) -> Result<SharedSecret, CryptoError> {
        let _ = (private, peer_public);
        Err(CryptoError::Unsupported {
            backend: self.name(),
            operation: "compute_shared",
        })
    }
}
