//! ML-KEM-768 (FIPS 203) backend.
//!
//! Wraps the `ml-kem` crate. The responder keeps the decapsulation key inside
//! its [`PrivateState`]; only the encapsulation key travels over the wire.

use ml_kem::kem::{Decapsulate, Encapsulate};
use ml_kem::{Ciphertext, EncodedSizeUser, KemCore, MlKem768};
use rand::rngs::OsRng;

use crate::error::CryptoError;
use crate::secret::{PrivateKey, PrivateState, SharedSecret};
use crate::traits::{ExchangeKind, KeyExchangeBackend};

pub const BACKEND_NAME: &str = "ML-KEM-768";

pub const ML_KEM_PUBLIC_KEY_LEN: usize = 1184;
pub const ML_KEM_CIPHERTEXT_LEN: usize = 1088;
pub const ML_KEM_SHARED_SECRET_LEN: usize = 32;

pub(crate) type MlKemDecapsulationKey = <MlKem768 as KemCore>::DecapsulationKey;
type MlKemEncapsulationKey = <MlKem768 as KemCore>::EncapsulationKey;

#[derive(Clone, Copy, Debug, Default)]
pub struct MlKem768Backend;

impl MlKem768Backend {
    pub fn new() -> Self {
        Self
    }

    fn parse_public_key(bytes: &[u8]) -> Result<MlKemEncapsulationKey, CryptoError> {
        if bytes.len() != ML_KEM_PUBLIC_KEY_LEN {
            return Err(CryptoError::InvalidLength {
                expected: ML_KEM_PUBLIC_KEY_LEN,
                actual: bytes.len(),
            });
        }
        let encoded = ml_kem::Encoded::<MlKemEncapsulationKey>::try_from(bytes)
            .map_err(|_| CryptoError::InvalidArtifact("ML-KEM encapsulation key".into()))?;
        Ok(MlKemEncapsulationKey::from_bytes(&encoded))
    }

    fn parse_ciphertext(bytes: &[u8]) -> Result<Ciphertext<MlKem768>, CryptoError> {
        if bytes.len() != ML_KEM_CIPHERTEXT_LEN {
            return Err(CryptoError::InvalidLength {
                expected: ML_KEM_CIPHERTEXT_LEN,
                actual: bytes.len(),
            });
        }
        Ciphertext::<MlKem768>::try_from(bytes)
            .map_err(|_| CryptoError::InvalidArtifact("ML-KEM ciphertext".into()))
    }
}

impl KeyExchangeBackend for MlKem768Backend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Kem
    }

    fn secret_len(&self) -> usize {
        ML_KEM_SHARED_SECRET_LEN
    }

    fn generate_keypair(&self) -> Result<(Vec<u8>, PrivateState), CryptoError> {
        let (dk, ek) = MlKem768::generate(&mut OsRng);
        let public = ek.as_bytes().to_vec();
        Ok((public, PrivateState::new(PrivateKey::MlKem(Box::new(dk)))))
    }

    fn encapsulate(&self, public: &[u8]) -> Result<(Vec<u8>, SharedSecret), CryptoError> {
        let ek = Self::parse_public_key(public)?;
        let (ct, ss) = ek
            .encapsulate(&mut OsRng)
            .map_err(|_| CryptoError::EncryptionFailed)?;
        Ok((ct.to_vec(), SharedSecret::from_slice(&ss)))
    }

    fn decapsulate(
        &self,
        ciphertext: &[u8],
        private: &PrivateState,
    ) -> Result<SharedSecret, CryptoError> {
        let PrivateKey::MlKem(dk) = &private.key else {
            return Err(CryptoError::ForeignPrivateState(BACKEND_NAME));
        };
        let ct = Self::parse_ciphertext(ciphertext)?;
        let ss = dk
            .decapsulate(&ct)
            .map_err(|_| CryptoError::DecapsulationFailed)?;
        Ok(SharedSecret::from_slice(&ss))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_sizes_match_parameter_set() {
        let backend = MlKem768Backend::new();
        let (pk, _sk) = backend.generate_keypair().unwrap();
        assert_eq!(pk.len(), ML_KEM_PUBLIC_KEY_LEN);

        let (ct, ss) = backend.encapsulate(&pk).unwrap();
        assert_eq!(ct.len(), ML_KEM_CIPHERTEXT_LEN);
        assert_eq!(ss.len(), ML_KEM_SHARED_SECRET_LEN);
    }

    #[test]
    fn decapsulation_recovers_secret() {
        let backend = MlKem768Backend::new();
        let (pk, sk) = backend.generate_keypair().unwrap();
        let (ct, ss_enc) = backend.encapsulate(&pk).unwrap();
        let ss_dec = backend.decapsulate(&ct, &sk).unwrap();
        assert_eq!(ss_enc, ss_dec);
    }

    #[test]
    fn undersized_public_key_rejected() {
        let backend = MlKem768Backend::new();
        let err = backend.encapsulate(&[0u8; 32]).unwrap_err();
        assert_eq!(
            err,
            CryptoError::InvalidLength {
                expected: ML_KEM_PUBLIC_KEY_LEN,
                actual: 32
            }
        );
    }

    #[test]
    fn undersized_ciphertext_rejected() {
        let backend = MlKem768Backend::new();
        let (_pk, sk) = backend.generate_keypair().unwrap();
        let err = backend.decapsulate(&[1u8; 100], &sk).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidLength { actual: 100, .. }));
    }

    #[test]
    fn compute_shared_is_unsupported() {
        let backend = MlKem768Backend::new();
        let (pk, sk) = backend.generate_keypair().unwrap();
        assert!(matches!(
            backend.compute_shared(&sk, &pk),
            Err(CryptoError::Unsupported { .. })
        ));
    }
}
