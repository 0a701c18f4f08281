//! Key-exchange backends for the handshake benchmark.
//!
//! Three variants of one capability:
//!
//! | Backend            | Kind            | Public artifact | Secret |
//! |--------------------|-----------------|-----------------|--------|
//! | [`MlKem768Backend`] | KEM             | 1184 B          | 32 B   |
//! | [`X25519Backend`]   | Diffie-Hellman  | 32 B            | 32 B   |
//! | [`RsaOaepBackend`]  | Key transport   | SPKI DER        | 32 B   |
//!
//! The handshake core only sees [`KeyExchangeBackend`], [`SharedSecret`] and
//! the opaque [`PrivateState`].

use std::sync::Arc;

pub mod error;
pub mod mac;
pub mod ml_kem;
pub mod rsa_oaep;
pub mod secret;
pub mod traits;
pub mod x25519;

pub use error::CryptoError;
pub use ml_kem::MlKem768Backend;
pub use rsa_oaep::RsaOaepBackend;
pub use secret::{PrivateState, SharedSecret};
pub use traits::{ExchangeKind, KeyExchangeBackend};
pub use x25519::X25519Backend;

/// Default backend for each exchange kind.
pub fn backend_for(kind: ExchangeKind) -> Arc<dyn KeyExchangeBackend> {
    match kind {
        ExchangeKind::Kem => Arc::new(MlKem768Backend::new()),
        ExchangeKind::DiffieHellman => Arc::new(X25519Backend::new()),
        ExchangeKind::KeyTransport => Arc::new(RsaOaepBackend::new()),
    }
}
