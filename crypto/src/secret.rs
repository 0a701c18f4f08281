//! Opaque secret material handed between backends and the handshake core.

use core::fmt;

use subtle::ConstantTimeEq;
use x25519_dalek::StaticSecret;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::ml_kem::MlKemDecapsulationKey;

/// Shared secret derived by one side of a key exchange.
///
/// Equality is constant-time and the bytes are wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret {
    bytes: Vec<u8>,
}

impl SharedSecret {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn from_slice(bytes: &[u8]) -> Self {
        Self::new(bytes.to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

impl PartialEq for SharedSecret {
    fn eq(&self, other: &Self) -> bool {
        self.bytes.ct_eq(&other.bytes).into()
    }
}

impl Eq for SharedSecret {}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedSecret({} bytes)", self.bytes.len())
    }
}

/// Private half of a generated key pair.
///
/// The handshake core stores and passes this around but never looks inside;
/// only the backend that produced it can use it.
#[derive(Clone)]
pub struct PrivateState {
    pub(crate) key: PrivateKey,
}

#[derive(Clone)]
pub(crate) enum PrivateKey {
    MlKem(Box<MlKemDecapsulationKey>),
    X25519(StaticSecret),
    Rsa(Box<rsa::RsaPrivateKey>),
}

impl PrivateState {
    pub(crate) fn new(key: PrivateKey) -> Self {
        Self { key }
    }

    /// Name of the backend that produced this state.
    pub fn backend(&self) -> &'static str {
        match self.key {
            PrivateKey::MlKem(_) => crate::ml_kem::BACKEND_NAME,
            PrivateKey::X25519(_) => crate::x25519::BACKEND_NAME,
            PrivateKey::Rsa(_) => crate::rsa_oaep::BACKEND_NAME,
        }
    }
}

impl fmt::Debug for PrivateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateState({})", self.backend())
    }
}
