//! Behavior every backend must share, checked through the trait object only.

use kex_crypto::mac::{hmac_sha256, verify_hmac_sha256};
use kex_crypto::{
    backend_for, CryptoError, ExchangeKind, KeyExchangeBackend, MlKem768Backend, RsaOaepBackend,
    SharedSecret, X25519Backend,
};

fn all_backends() -> Vec<Box<dyn KeyExchangeBackend>> {
    vec![
        Box::new(MlKem768Backend::new()),
        Box::new(X25519Backend::new()),
        Box::new(RsaOaepBackend::with_bits(1024).expect("minimum size is accepted")),
    ]
}

/// Both parties' view of the secret for one exchange
fn agree(backend: &dyn KeyExchangeBackend) -> (SharedSecret, SharedSecret) {
    let (responder_public, responder_private) = backend.generate_keypair().expect("keygen");
    match backend.kind() {
        ExchangeKind::Kem | ExchangeKind::KeyTransport => {
            let (ct, initiator) = backend.encapsulate(&responder_public).expect("encapsulate");
            let responder = backend
                .decapsulate(&ct, &responder_private)
                .expect("decapsulate");
            (initiator, responder)
        }
        ExchangeKind::DiffieHellman => {
            let (initiator_public, initiator_private) = backend.generate_keypair().expect("keygen");
            let initiator = backend
                .compute_shared(&initiator_private, &responder_public)
                .expect("initiator computes");
            let responder = backend
                .compute_shared(&responder_private, &initiator_public)
                .expect("responder computes");
            (initiator, responder)
        }
    }
}

#[test]
fn every_backend_agrees_on_a_secret_of_declared_length() {
    for backend in all_backends() {
        let (initiator, responder) = agree(backend.as_ref());
        assert_eq!(initiator, responder, "{}", backend.name());
        assert_eq!(initiator.len(), backend.secret_len(), "{}", backend.name());
    }
}

#[test]
fn fresh_exchanges_give_fresh_secrets() {
    for backend in all_backends() {
        let (first, _) = agree(backend.as_ref());
        let (second, _) = agree(backend.as_ref());
        assert_ne!(first, second, "{}", backend.name());
    }
}

#[test]
fn operations_outside_the_kind_are_unsupported() {
    let dh = X25519Backend::new();
    let (public, private) = dh.generate_keypair().unwrap();
    assert!(matches!(
        dh.encapsulate(&public),
        Err(CryptoError::Unsupported { operation: "encapsulate", .. })
    ));
    assert!(matches!(
        dh.decapsulate(&[0u8; 32], &private),
        Err(CryptoError::Unsupported { operation: "decapsulate", .. })
    ));

    let kem = MlKem768Backend::new();
    let (public, private) = kem.generate_keypair().unwrap();
    assert!(matches!(
        kem.compute_shared(&private, &public),
        Err(CryptoError::Unsupported { operation: "compute_shared", .. })
    ));
}

#[test]
fn private_state_from_another_backend_is_refused() {
    let kem = MlKem768Backend::new();
    let dh = X25519Backend::new();
    let (kem_public, kem_private) = kem.generate_keypair().unwrap();
    let (dh_public, dh_private) = dh.generate_keypair().unwrap();
    let (ct, _) = kem.encapsulate(&kem_public).unwrap();

    assert!(matches!(
        kem.decapsulate(&ct, &dh_private),
        Err(CryptoError::ForeignPrivateState(_))
    ));
    assert!(matches!(
        dh.compute_shared(&kem_private, &dh_public),
        Err(CryptoError::ForeignPrivateState(_))
    ));
}

#[test]
fn truncated_artifacts_are_rejected() {
    for backend in all_backends() {
        let (public, private) = backend.generate_keypair().unwrap();
        let short = &public[..public.len() / 2];
        let result = match backend.kind() {
            ExchangeKind::DiffieHellman => backend.compute_shared(&private, short).map(|_| ()),
            _ => backend.encapsulate(short).map(|_| ()),
        };
        assert!(result.is_err(), "{} accepted a truncated key", backend.name());
    }
}

#[test]
fn factory_backends_match_their_kind() {
    for kind in ["kem", "dh", "rsa"] {
        let kind: ExchangeKind = kind.parse().unwrap();
        assert_eq!(backend_for(kind).kind(), kind);
    }
}

#[test]
fn transcript_tag_binds_key_and_message() {
    let (secret, _) = agree(&X25519Backend::new());
    let tag = hmac_sha256(secret.as_bytes(), b"AUTH_CHECK").unwrap();

    assert!(verify_hmac_sha256(secret.as_bytes(), b"AUTH_CHECK", &tag).unwrap());
    assert!(!verify_hmac_sha256(secret.as_bytes(), b"AUTH_CHECk", &tag).unwrap());
    let mut other = secret.as_bytes().to_vec();
    other[31] ^= 0x80;
    assert!(!verify_hmac_sha256(&other, b"AUTH_CHECK", &tag).unwrap());
    assert!(!verify_hmac_sha256(secret.as_bytes(), b"AUTH_CHECK", &tag[..16]).unwrap());
}
