//! One-byte handshake: the same message pattern as a KEM session, with
//! single-character stand-ins for the public key and ciphertext

use anyhow::{bail, Context, Result};
use pq_handshake::latency::{CT_TRANSMISSION, HANDSHAKE_TOTAL, PK_TRANSMISSION};
use pq_handshake::{ControlToken, HandshakeConfig, LatencyRecorder, LinkLabel, Network, NodeId};
use std::time::Instant;

const PK_STAND_IN: &str = "B";
const CT_STAND_IN: &str = "A";

pub async fn run(network: &Network, initiator: &NodeId, responder: &NodeId, config: &HandshakeConfig) -> Result<LatencyRecorder> {
    let alice = network.endpoint(initiator)?;
    let bob = network.endpoint(responder)?;
    let mut latency = LatencyRecorder::new();
    let started = Instant::now();

    alice
        .send_with_ack(responder, ControlToken::Syn.as_str(), config.syn_ack_timeout)
        .await
        .context("SYN not acknowledged")?;
    let syn = bob
        .recv(initiator, config.syn_wait)
        .await
        .context("SYN not received")?;
    if syn.content != ControlToken::Syn.as_str() {
        bail!("expected SYN, got {:?}", syn.content);
    }

    let sent = Instant::now();
    bob.send_with_ack(initiator, PK_STAND_IN, Some(config.ack_timeout))
        .await
        .context("stand-in public key not acknowledged")?;
    latency.record(PK_TRANSMISSION, LinkLabel::new(responder, initiator), sent.elapsed());
    let pk = alice
        .recv(responder, config.artifact_wait)
        .await
        .context("stand-in public key not received")?;
    tracing::debug!(bytes = pk.content.len(), "received stand-in public key");

    let sent = Instant::now();
    alice
        .send_with_ack(responder, CT_STAND_IN, Some(config.ack_timeout))
        .await
        .context("stand-in ciphertext not acknowledged")?;
    latency.record(CT_TRANSMISSION, LinkLabel::new(initiator, responder), sent.elapsed());
    let ct = bob
        .recv(initiator, config.artifact_wait)
        .await
        .context("stand-in ciphertext not received")?;
    tracing::debug!(bytes = ct.content.len(), "received stand-in ciphertext");

    latency.record(HANDSHAKE_TOTAL, LinkLabel::new(initiator, responder), started.elapsed());
    Ok(latency)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_both_transmissions() {
        let network = Network::builder().nodes(["Alice", "Eva"]).build();
        let (alice, eva) = (NodeId::from("Alice"), NodeId::from("Eva"));
        let latency = run(&network, &alice, &eva, &HandshakeConfig::fast()).await.unwrap();

        let keys: Vec<_> = latency.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(
            keys,
            [
                "pk_transmission Eva<->Alice",
                "ct_transmission Alice<->Eva",
                "handshake_total Alice<->Eva",
            ]
        );
    }

    #[tokio::test]
    async fn offline_responder_fails_fast() {
        let network = Network::builder().node("Alice").offline_node("Eva").build();
        let result = run(&network, &"Alice".into(), &"Eva".into(), &HandshakeConfig::fast()).await;
        assert!(result.is_err());
    }
}
