//! Handshake orchestration over a simulated classical channel
//!
//! Runs KEM, Diffie-Hellman and RSA key-transport handshakes between named
//! nodes, records per-stage latency, and confirms agreement with an HMAC
//! transcript check.
//!
//! # Components
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ TopologyRunner        one session per node pair               │
//! │   └─ HandshakeSession  Idle → SynSent → AckObserved →          │
//! │        │               KeyMaterialSent → SecretDerived →       │
//! │        │               Authenticated  (or Failed)              │
//! │        ├─ Network / Endpoint       ack-based string channel   │
//! │        ├─ KeyExchangeBackend       kem | dh | rsa             │
//! │        ├─ TranscriptAuthenticator  "msg|hex(hmac)"            │
//! │        └─ LatencyRecorder          (stage, link) → duration   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use pq_handshake::{HandshakeConfig, Topology, TopologyRunner};
//! use crypto::{backend_for, ExchangeKind};
//!
//! let topology = Topology::chain(["Alice", "Bob", "Cathy"]);
//! let runner = TopologyRunner::new(topology, backend_for(ExchangeKind::Kem), HandshakeConfig::new());
//! let report = runner.run(&[("Alice".into(), "Cathy".into())]).await?;
//! for entry in report.latency.dump() {
//!     println!("{} {} : {}", entry.stage, entry.link, entry.seconds);
//! }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod latency;
pub mod node;
pub mod session;
pub mod topology;
pub mod transport;
pub mod types;
pub mod wire;

pub use auth::{AuthReport, TranscriptAuthenticator};
pub use config::{HandshakeConfig, HandshakeConfigBuilder};
pub use error::{HandshakeError, Result, TransportError};
pub use latency::{LatencyEntry, LatencyKey, LatencyRecorder};
pub use node::{Node, NodeHandle};
pub use session::{AuthenticationOutcome, HandshakeSession, SessionArtifacts};
pub use topology::{PairReport, RunReport, SchedulePolicy, Topology, TopologyRunner};
pub use transport::{Endpoint, Message, Network, NetworkBuilder};
pub use types::{ControlToken, LinkLabel, NodeId, Stage};
