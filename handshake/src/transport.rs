//! Simulated classical channel between named nodes
//!
//! Every node runs one inbox actor. A send posts an envelope to the
//! destination's actor, which files the message into a per-sender FIFO queue
//! and, if asked, confirms delivery through a oneshot acknowledgment. A node
//! taken offline parks incoming envelopes without acknowledging them, which
//! is how a silent peer is modelled.

use crate::error::TransportError;
use crate::types::NodeId;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::timeout;

/// A classical message carried between two nodes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub sender: NodeId,
    pub receiver: NodeId,
    pub content: String,
    /// Whether the sender asked for a delivery acknowledgment
    pub await_ack: bool,
}

struct Envelope {
    message: Message,
    ack: Option<oneshot::Sender<()>>,
}

enum Inbound {
    Deliver(Envelope),
    SetOnline(bool),
}

type Inboxes = Arc<HashMap<NodeId, mpsc::UnboundedSender<Inbound>>>;
type LinkQueue = Mutex<mpsc::UnboundedReceiver<Message>>;

/// Registers nodes before the network starts
#[derive(Default)]
pub struct NetworkBuilder {
    nodes: BTreeSet<NodeId>,
    offline: BTreeSet<NodeId>,
}

impl NetworkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node that starts online
    pub fn node(mut self, id: impl Into<NodeId>) -> Self {
        self.nodes.insert(id.into());
        self
    }

    /// Register several online nodes
    pub fn nodes<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<NodeId>,
    {
        self.nodes.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Register a node that starts offline
    pub fn offline_node(mut self, id: impl Into<NodeId>) -> Self {
        let id = id.into();
        self.nodes.insert(id.clone());
        self.offline.insert(id);
        self
    }

    /// Spawn one inbox actor per node. Must be called inside a tokio runtime.
    pub fn build(self) -> Network {
        let mut inbox_txs = HashMap::new();
        let mut inbox_rxs = Vec::new();
        for id in &self.nodes {
            let (tx, rx) = mpsc::unbounded_channel();
            inbox_txs.insert(id.clone(), tx);
            inbox_rxs.push((id.clone(), rx));
        }
        let inboxes: Inboxes = Arc::new(inbox_txs);

        let mut endpoints = HashMap::new();
        for (id, rx) in inbox_rxs {
            // One FIFO queue per (sender -> id) link
            let mut link_txs = HashMap::new();
            let mut link_rxs = HashMap::new();
            for peer in self.nodes.iter().filter(|peer| **peer != id) {
                let (tx, link_rx) = mpsc::unbounded_channel();
                link_txs.insert(peer.clone(), tx);
                link_rxs.insert(peer.clone(), Mutex::new(link_rx));
            }

            let online = !self.offline.contains(&id);
            tokio::spawn(run_inbox(id.clone(), rx, link_txs, online));

            endpoints.insert(
                id.clone(),
                Endpoint {
                    id,
                    inboxes: inboxes.clone(),
                    links: Arc::new(link_rxs),
                },
            );
        }

        Network {
            inboxes,
            endpoints: Arc::new(endpoints),
        }
    }
}

async fn run_inbox(
    id: NodeId,
    mut rx: mpsc::UnboundedReceiver<Inbound>,
    links: HashMap<NodeId, mpsc::UnboundedSender<Message>>,
    mut online: bool,
) {
    let mut parked = VecDeque::new();
    while let Some(inbound) = rx.recv().await {
        match inbound {
            Inbound::Deliver(envelope) if online => deliver(&id, &links, envelope),
            Inbound::Deliver(envelope) => {
                tracing::trace!(node = %id, from = %envelope.message.sender, "offline, parking message");
                parked.push_back(envelope);
            }
            Inbound::SetOnline(flag) => {
                online = flag;
                if online {
                    while let Some(envelope) = parked.pop_front() {
                        deliver(&id, &links, envelope);
                    }
                }
            }
        }
    }
}

fn deliver(id: &NodeId, links: &HashMap<NodeId, mpsc::UnboundedSender<Message>>, envelope: Envelope) {
    let Envelope { message, ack } = envelope;
    let Some(link) = links.get(&message.sender) else {
        tracing::warn!(node = %id, from = %message.sender, "dropping message from unregistered sender");
        return;
    };
    let bytes = message.content.len();
    let from = message.sender.clone();
    // Only acknowledge what actually reached the queue
    if link.send(message).is_ok() {
        tracing::trace!(node = %id, from = %from, bytes, "delivered");
        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }
}

/// Explicit network context: one [`Endpoint`] per registered node
#[derive(Clone)]
pub struct Network {
    inboxes: Inboxes,
    endpoints: Arc<HashMap<NodeId, Endpoint>>,
}

impl Network {
    pub fn builder() -> NetworkBuilder {
        NetworkBuilder::new()
    }

    /// Handle for sending and receiving as `id`
    pub fn endpoint(&self, id: &NodeId) -> Result<Endpoint, TransportError> {
        self.endpoints
            .get(id)
            .cloned()
            .ok_or_else(|| TransportError::UnknownNode(id.clone()))
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.endpoints.contains_key(id)
    }

    /// Registered node ids, sorted
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut ids: Vec<_> = self.endpoints.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Take a node offline or bring it back. Offline nodes hold incoming
    /// messages unacknowledged; going online delivers them in arrival order.
    pub fn set_online(&self, id: &NodeId, online: bool) -> Result<(), TransportError> {
        let inbox = self
            .inboxes
            .get(id)
            .ok_or_else(|| TransportError::UnknownNode(id.clone()))?;
        inbox
            .send(Inbound::SetOnline(online))
            .map_err(|_| TransportError::Closed(id.clone()))
    }
}

/// One node's view of the channel
#[derive(Clone)]
pub struct Endpoint {
    id: NodeId,
    inboxes: Inboxes,
    links: Arc<HashMap<NodeId, LinkQueue>>,
}

impl Endpoint {
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    fn post(
        &self,
        to: &NodeId,
        content: String,
        ack: Option<oneshot::Sender<()>>,
    ) -> Result<(), TransportError> {
        let inbox = self
            .inboxes
            .get(to)
            .ok_or_else(|| TransportError::UnknownNode(to.clone()))?;
        let message = Message {
            sender: self.id.clone(),
            receiver: to.clone(),
            content,
            await_ack: ack.is_some(),
        };
        inbox
            .send(Inbound::Deliver(Envelope { message, ack }))
            .map_err(|_| TransportError::Closed(to.clone()))
    }

    /// Fire-and-forget send
    pub fn send(&self, to: &NodeId, content: impl Into<String>) -> Result<(), TransportError> {
        self.post(to, content.into(), None)
    }

    /// Send and block until the destination confirms delivery.
    ///
    /// With `deadline = None` this waits indefinitely.
    pub async fn send_with_ack(
        &self,
        to: &NodeId,
        content: impl Into<String>,
        deadline: Option<Duration>,
    ) -> Result<(), TransportError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.post(to, content.into(), Some(ack_tx))?;
        match deadline {
            Some(deadline) => match timeout(deadline, ack_rx).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(_)) => Err(TransportError::Closed(to.clone())),
                Err(_) => Err(TransportError::AckTimeout { to: to.clone() }),
            },
            None => ack_rx.await.map_err(|_| TransportError::Closed(to.clone())),
        }
    }

    fn link(&self, from: &NodeId) -> Result<&LinkQueue, TransportError> {
        self.links
            .get(from)
            .ok_or_else(|| TransportError::UnknownNode(from.clone()))
    }

    /// Wait up to `wait` for the next message from `from`
    pub async fn recv(&self, from: &NodeId, wait: Duration) -> Result<Message, TransportError> {
        let link = self.link(from)?;
        let received = timeout(wait, async {
            let mut queue = link.lock().await;
            queue.recv().await
        })
        .await;
        match received {
            Ok(Some(message)) => Ok(message),
            Ok(None) => Err(TransportError::Closed(from.clone())),
            Err(_) => Err(TransportError::RecvTimeout { from: from.clone() }),
        }
    }

    /// Take every message already queued from `from` without waiting
    pub async fn drain(&self, from: &NodeId) -> Result<Vec<Message>, TransportError> {
        let mut queue = self.link(from)?.lock().await;
        let mut drained = Vec::new();
        while let Ok(message) = queue.try_recv() {
            drained.push(message);
        }
        Ok(drained)
    }

    /// Wait up to `wait` for a message from `from`, then also take every
    /// message already queued behind it
    pub async fn recv_batch(
        &self,
        from: &NodeId,
        wait: Duration,
    ) -> Result<Vec<Message>, TransportError> {
        let link = self.link(from)?;
        let received = timeout(wait, async {
            let mut queue = link.lock().await;
            let first = queue.recv().await?;
            let mut batch = vec![first];
            while let Ok(message) = queue.try_recv() {
                batch.push(message);
            }
            Some(batch)
        })
        .await;
        match received {
            Ok(Some(batch)) => Ok(batch),
            Ok(None) => Err(TransportError::Closed(from.clone())),
            Err(_) => Err(TransportError::RecvTimeout { from: from.clone() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (NodeId, NodeId) {
        (NodeId::from("Alice"), NodeId::from("Bob"))
    }

    #[tokio::test]
    async fn ack_arrives_on_delivery() {
        let (alice, bob) = ids();
        let network = Network::builder().nodes([alice.clone(), bob.clone()]).build();
        let a = network.endpoint(&alice).unwrap();
        let b = network.endpoint(&bob).unwrap();

        a.send_with_ack(&bob, "SYN", Some(Duration::from_secs(1)))
            .await
            .unwrap();

        let message = b.recv(&alice, Duration::from_secs(1)).await.unwrap();
        assert_eq!(message.content, "SYN");
        assert_eq!(message.sender, alice);
        assert!(message.await_ack);
    }

    #[tokio::test]
    async fn per_link_order_is_fifo() {
        let (alice, bob) = ids();
        let network = Network::builder().nodes([alice.clone(), bob.clone()]).build();
        let a = network.endpoint(&alice).unwrap();
        let b = network.endpoint(&bob).unwrap();

        for i in 0..20 {
            a.send(&bob, format!("m{i}")).unwrap();
        }
        for i in 0..20 {
            let message = b.recv(&alice, Duration::from_secs(1)).await.unwrap();
            assert_eq!(message.content, format!("m{i}"));
        }
    }

    #[tokio::test]
    async fn links_are_separate_queues() {
        let network = Network::builder().nodes(["Alice", "Bob", "Cathy"]).build();
        let (alice, bob, cathy) = (NodeId::from("Alice"), NodeId::from("Bob"), NodeId::from("Cathy"));
        network.endpoint(&alice).unwrap().send(&bob, "from-alice").unwrap();
        network.endpoint(&cathy).unwrap().send(&bob, "from-cathy").unwrap();

        let b = network.endpoint(&bob).unwrap();
        let m = b.recv(&cathy, Duration::from_secs(1)).await.unwrap();
        assert_eq!(m.content, "from-cathy");
        let m = b.recv(&alice, Duration::from_secs(1)).await.unwrap();
        assert_eq!(m.content, "from-alice");
    }

    #[tokio::test]
    async fn recv_times_out_when_link_is_empty() {
        let (alice, bob) = ids();
        let network = Network::builder().nodes([alice.clone(), bob.clone()]).build();
        let b = network.endpoint(&bob).unwrap();

        let err = b.recv(&alice, Duration::from_millis(20)).await.unwrap_err();
        assert_eq!(err, TransportError::RecvTimeout { from: alice });
    }

    #[tokio::test]
    async fn offline_node_never_acks() {
        let (alice, bob) = ids();
        let network = Network::builder()
            .node(alice.clone())
            .offline_node(bob.clone())
            .build();
        let a = network.endpoint(&alice).unwrap();

        let err = a
            .send_with_ack(&bob, "SYN", Some(Duration::from_millis(30)))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::AckTimeout { to: bob.clone() });

        // Parked messages are delivered once the node comes back
        network.set_online(&bob, true).unwrap();
        let b = network.endpoint(&bob).unwrap();
        let message = b.recv(&alice, Duration::from_secs(1)).await.unwrap();
        assert_eq!(message.content, "SYN");
    }

    #[tokio::test]
    async fn batch_takes_everything_queued() {
        let (alice, bob) = ids();
        let network = Network::builder().nodes([alice.clone(), bob.clone()]).build();
        let a = network.endpoint(&alice).unwrap();
        let b = network.endpoint(&bob).unwrap();

        a.send(&bob, "one").unwrap();
        a.send_with_ack(&bob, "two", Some(Duration::from_secs(1)))
            .await
            .unwrap();

        let batch = b.recv_batch(&alice, Duration::from_secs(1)).await.unwrap();
        let contents: Vec<_> = batch.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["one", "two"]);
    }

    #[tokio::test]
    async fn drain_empties_only_the_named_link() {
        let network = Network::builder().nodes(["Alice", "Bob", "Cathy"]).build();
        let (alice, bob, cathy) = (NodeId::from("Alice"), NodeId::from("Bob"), NodeId::from("Cathy"));
        let a = network.endpoint(&alice).unwrap();
        let b = network.endpoint(&bob).unwrap();
        a.send_with_ack(&bob, "stale-1", Some(Duration::from_secs(1))).await.unwrap();
        a.send_with_ack(&bob, "stale-2", Some(Duration::from_secs(1))).await.unwrap();
        network
            .endpoint(&cathy)
            .unwrap()
            .send_with_ack(&bob, "keep", Some(Duration::from_secs(1)))
            .await
            .unwrap();

        let drained = b.drain(&alice).await.unwrap();
        let contents: Vec<_> = drained.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["stale-1", "stale-2"]);
        assert!(b.drain(&alice).await.unwrap().is_empty());
        assert_eq!(b.recv(&cathy, Duration::from_secs(1)).await.unwrap().content, "keep");
    }

    #[tokio::test]
    async fn unknown_node_is_reported() {
        let network = Network::builder().node("Alice").build();
        let ghost = NodeId::from("Ghost");
        assert!(matches!(
            network.endpoint(&ghost),
            Err(TransportError::UnknownNode(_))
        ));
        let a = network.endpoint(&NodeId::from("Alice")).unwrap();
        assert_eq!(a.send(&ghost, "hi"), Err(TransportError::UnknownNode(ghost)));
    }
}
