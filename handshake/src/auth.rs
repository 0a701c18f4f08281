//! Transcript authentication: proves both ends derived the same secret
//!
//! The initiator sends `"<message>|<hex(HMAC-SHA-256(secret, message))>"`;
//! the responder recomputes the tag under its own secret and compares in
//! constant time. Received payloads that do not parse are counted and
//! skipped until a batch with a conforming one arrives or the wait runs out.

use crate::config::HandshakeConfig;
use crate::error::{Result, TransportError};
use crate::transport::Endpoint;
use crate::types::NodeId;
use crate::wire::AuthMessage;
use crypto::mac::{hmac_sha256, verify_hmac_sha256};
use crypto::SharedSecret;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Result of one authentication exchange
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AuthReport {
    pub success: bool,
    /// Payloads skipped because they were not `message|tag`
    pub malformed_skipped: usize,
}

/// Computes and checks the MAC over the fixed test message
#[derive(Clone, Debug)]
pub struct TranscriptAuthenticator {
    message: String,
    ack_timeout: Duration,
    auth_wait: Duration,
    verbose: bool,
}

impl TranscriptAuthenticator {
    pub fn new(config: &HandshakeConfig) -> Self {
        Self {
            message: config.auth_message.clone(),
            ack_timeout: config.ack_timeout,
            auth_wait: config.auth_wait,
            verbose: config.verbose_logging,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Tag the test message under `secret`
    pub fn seal(&self, secret: &SharedSecret) -> Result<AuthMessage> {
        let tag = hmac_sha256(secret.as_bytes(), self.message.as_bytes())?;
        Ok(AuthMessage::new(self.message.clone(), tag))
    }

    /// Send the tagged message from `endpoint` to `to`, blocking until acknowledged
    pub async fn send_tag(&self, endpoint: &Endpoint, to: &NodeId, secret: &SharedSecret) -> Result<()> {
        let sealed = self.seal(secret)?;
        endpoint
            .send_with_ack(to, sealed.encode(), Some(self.ack_timeout))
            .await?;
        if self.verbose {
            tracing::debug!(node = %endpoint.id(), peer = %to, "sent authentication tag");
        }
        Ok(())
    }

    /// Scan messages from `from` until a batch holds a conforming payload,
    /// then check the tags of that batch under `secret`.
    ///
    /// Any matching tag in the batch succeeds, so a stale tag queued ahead of
    /// the current one does not decide the outcome. A batch of only malformed
    /// payloads keeps the wait going; if it runs out, the report is a failure
    /// carrying the skipped count.
    pub async fn verify(&self, endpoint: &Endpoint, from: &NodeId, secret: &SharedSecret) -> Result<AuthReport> {
        let deadline = Instant::now() + self.auth_wait;
        let mut report = AuthReport::default();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let batch = match endpoint.recv_batch(from, remaining).await {
                Ok(batch) => batch,
                Err(TransportError::RecvTimeout { .. }) => break,
                Err(err) => return Err(err.into()),
            };
            let mut conforming = 0;
            for received in batch {
                match AuthMessage::parse(&received.content) {
                    Ok(auth) => {
                        conforming += 1;
                        if verify_hmac_sha256(secret.as_bytes(), auth.message.as_bytes(), &auth.tag)? {
                            report.success = true;
                            return Ok(report);
                        }
                    }
                    Err(reason) => {
                        report.malformed_skipped += 1;
                        tracing::warn!(
                            node = %endpoint.id(),
                            peer = %from,
                            %reason,
                            "skipping malformed authentication message"
                        );
                    }
                }
            }
            if conforming > 0 {
                if self.verbose {
                    tracing::debug!(node = %endpoint.id(), peer = %from, conforming, "no tag in batch matched");
                }
                return Ok(report);
            }
        }

        if self.verbose {
            tracing::debug!(node = %endpoint.id(), peer = %from, "no authentication message before deadline");
        }
        Ok(report)
    }

    /// Run both halves: the initiator tags under its secret, the responder verifies under its own
    pub async fn authenticate(
        &self,
        initiator: &Endpoint,
        responder: &Endpoint,
        initiator_secret: &SharedSecret,
        responder_secret: &SharedSecret,
    ) -> Result<AuthReport> {
        self.send_tag(initiator, responder.id(), initiator_secret).await?;
        self.verify(responder, initiator.id(), responder_secret).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Network;

    fn setup() -> (Endpoint, Endpoint, TranscriptAuthenticator) {
        let network = Network::builder().nodes(["Alice", "Bob"]).build();
        let alice = network.endpoint(&"Alice".into()).unwrap();
        let bob = network.endpoint(&"Bob".into()).unwrap();
        let config = HandshakeConfig::fast().with_timeout(Duration::from_millis(100));
        (alice, bob, TranscriptAuthenticator::new(&config))
    }

    #[tokio::test]
    async fn equal_secrets_authenticate() {
        let (alice, bob, auth) = setup();
        let secret = SharedSecret::from_slice(&[7; 32]);
        let report = auth.authenticate(&alice, &bob, &secret, &secret).await.unwrap();
        assert_eq!(
            report,
            AuthReport {
                success: true,
                malformed_skipped: 0
            }
        );
    }

    #[tokio::test]
    async fn unequal_secrets_fail() {
        let (alice, bob, auth) = setup();
        let report = auth
            .authenticate(
                &alice,
                &bob,
                &SharedSecret::from_slice(&[7; 32]),
                &SharedSecret::from_slice(&[8; 32]),
            )
            .await
            .unwrap();
        assert!(!report.success);
    }

    #[tokio::test]
    async fn malformed_messages_are_skipped_and_counted() {
        let (alice, bob, auth) = setup();
        let secret = SharedSecret::from_slice(&[7; 32]);
        alice.send(bob.id(), "AUTH_CHECK").unwrap();
        alice.send(bob.id(), "A|B|C").unwrap();
        auth.send_tag(&alice, bob.id(), &secret).await.unwrap();

        let report = auth.verify(&bob, alice.id(), &secret).await.unwrap();
        assert!(report.success);
        assert_eq!(report.malformed_skipped, 2);
    }

    #[tokio::test]
    async fn matching_tag_behind_a_stale_one_authenticates() {
        let (alice, bob, auth) = setup();
        let secret = SharedSecret::from_slice(&[7; 32]);
        auth.send_tag(&alice, bob.id(), &SharedSecret::from_slice(&[9; 32]))
            .await
            .unwrap();
        alice.send(bob.id(), "A|B|C").unwrap();
        auth.send_tag(&alice, bob.id(), &secret).await.unwrap();

        let report = auth.verify(&bob, alice.id(), &secret).await.unwrap();
        assert_eq!(
            report,
            AuthReport {
                success: true,
                malformed_skipped: 1
            }
        );
    }

    #[tokio::test]
    async fn batch_without_a_matching_tag_fails_before_the_wait() {
        let (alice, bob, auth) = setup();
        let config = HandshakeConfig::fast().with_timeout(Duration::from_secs(30));
        let auth_long = TranscriptAuthenticator::new(&config);
        auth.send_tag(&alice, bob.id(), &SharedSecret::from_slice(&[9; 32]))
            .await
            .unwrap();

        let started = Instant::now();
        let report = auth_long
            .verify(&bob, alice.id(), &SharedSecret::from_slice(&[7; 32]))
            .await
            .unwrap();
        assert!(!report.success);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn no_conforming_message_fails_after_wait() {
        let (alice, bob, auth) = setup();
        let secret = SharedSecret::from_slice(&[7; 32]);
        alice.send(bob.id(), "AUTH_CHECK").unwrap();

        let report = auth.verify(&bob, alice.id(), &secret).await.unwrap();
        assert_eq!(
            report,
            AuthReport {
                success: false,
                malformed_skipped: 1
            }
        );
    }

    #[test]
    fn seal_uses_configured_message() {
        let config = HandshakeConfig::new().with_auth_message("PING");
        let auth = TranscriptAuthenticator::new(&config);
        let sealed = auth.seal(&SharedSecret::from_slice(&[1; 32])).unwrap();
        assert_eq!(sealed.message, "PING");
        assert!(sealed.encode().starts_with("PING|"));
    }
}
