//! Micro-benchmark of one backend's primitives, outside any handshake

use crate::stats::Summary;
use anyhow::{anyhow, bail, Result};
use crypto::{KeyExchangeBackend, PrivateState, SharedSecret};
use serde::Serialize;
use std::time::{Duration, Instant};

#[derive(Debug, Serialize)]
pub struct PrimitiveReport {
    pub backend: &'static str,
    pub iterations: usize,
    pub warmup: usize,
    /// Milliseconds
    pub keygen_ms: Summary,
    /// Encapsulation, or the initiator's shared-secret computation for DH
    pub derive_ms: Summary,
    /// Decapsulation, or the responder's shared-secret computation for DH
    pub recover_ms: Summary,
    pub public_len: usize,
    pub ciphertext_len: Option<usize>,
    pub secret_len: usize,
}

struct Round {
    keygen: Duration,
    derive: Duration,
    recover: Duration,
    public_len: usize,
    ciphertext_len: Option<usize>,
    secret_len: usize,
}

fn timed<T>(op: impl FnOnce() -> T) -> (T, Duration) {
    let started = Instant::now();
    let out = op();
    (out, started.elapsed())
}

fn check_agreement(derived: &SharedSecret, recovered: &SharedSecret) -> Result<()> {
    if derived != recovered {
        bail!("secrets disagree after a primitive round");
    }
    Ok(())
}

fn round(backend: &dyn KeyExchangeBackend) -> Result<Round> {
    let (keypair, keygen) = timed(|| backend.generate_keypair());
    let (public, private): (Vec<u8>, PrivateState) = keypair?;

    if backend.kind().uses_ciphertext() {
        let (encapsulated, derive) = timed(|| backend.encapsulate(&public));
        let (ciphertext, derived) = encapsulated?;
        let (recovered, recover) = timed(|| backend.decapsulate(&ciphertext, &private));
        let recovered = recovered?;
        check_agreement(&derived, &recovered)?;
        Ok(Round {
            keygen,
            derive,
            recover,
            public_len: public.len(),
            ciphertext_len: Some(ciphertext.len()),
            secret_len: derived.len(),
        })
    } else {
        let (peer_public, peer_private) = backend.generate_keypair()?;
        let (derived, derive) = timed(|| backend.compute_shared(&private, &peer_public));
        let derived = derived?;
        let (recovered, recover) = timed(|| backend.compute_shared(&peer_private, &public));
        let recovered = recovered?;
        check_agreement(&derived, &recovered)?;
        Ok(Round {
            keygen,
            derive,
            recover,
            public_len: public.len(),
            ciphertext_len: None,
            secret_len: derived.len(),
        })
    }
}

/// `warmup` discarded rounds, then `iterations` measured ones
pub fn run(backend: &dyn KeyExchangeBackend, iterations: usize, warmup: usize) -> Result<PrimitiveReport> {
    if iterations == 0 {
        bail!("iterations must be greater than zero");
    }
    for _ in 0..warmup {
        round(backend)?;
    }

    let mut keygen = Vec::with_capacity(iterations);
    let mut derive = Vec::with_capacity(iterations);
    let mut recover = Vec::with_capacity(iterations);
    let mut last = None;
    for _ in 0..iterations {
        let r = round(backend)?;
        keygen.push(r.keygen.as_secs_f64());
        derive.push(r.derive.as_secs_f64());
        recover.push(r.recover.as_secs_f64());
        last = Some(r);
    }
    let last = last.ok_or_else(|| anyhow!("no measured rounds"))?;
    let ms = |samples: &[f64]| {
        Summary::from_samples(samples)
            .map(|s| s.scaled(1000.0))
            .ok_or_else(|| anyhow!("no samples"))
    };

    Ok(PrimitiveReport {
        backend: backend.name(),
        iterations,
        warmup,
        keygen_ms: ms(&keygen)?,
        derive_ms: ms(&derive)?,
        recover_ms: ms(&recover)?,
        public_len: last.public_len,
        ciphertext_len: last.ciphertext_len,
        secret_len: last.secret_len,
    })
}
