use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use crypto::{backend_for, ExchangeKind, KeyExchangeBackend, RsaOaepBackend};
use pq_handshake::{HandshakeConfig, Network, NodeId, SchedulePolicy, Topology};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod baseline;
mod primitives;
mod scenario;
mod stats;

use scenario::{default_pairs, Scenario, ScenarioReport};

#[derive(Parser, Debug)]
#[command(name = "handshake-bench", version, about = "Benchmark key-exchange handshakes between simulated nodes")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run handshakes over a topology and print latency records
    Run(RunArgs),
    /// Time keygen / encapsulate / decapsulate outside any handshake
    Primitives(PrimitiveArgs),
    /// One-byte stand-in handshake for transmission-cost comparison
    Baseline(BaselineArgs),
}

#[derive(Args, Debug)]
struct BackendArgs {
    /// kem, dh or rsa
    #[arg(long, default_value = "kem", env = "HANDSHAKE_BACKEND")]
    backend: ExchangeKind,
    /// RSA modulus size for the rsa backend
    #[arg(long, default_value_t = 2048)]
    rsa_bits: usize,
}

impl BackendArgs {
    fn backend(&self) -> Result<Arc<dyn KeyExchangeBackend>> {
        match self.backend {
            ExchangeKind::KeyTransport => Ok(Arc::new(
                RsaOaepBackend::with_bits(self.rsa_bits).context("invalid RSA modulus size")?,
            )),
            kind => Ok(backend_for(kind)),
        }
    }
}

#[derive(Args, Debug)]
struct TimingArgs {
    /// Apply one deadline (milliseconds) to every wait, the SYN included
    #[arg(long, env = "HANDSHAKE_TIMEOUT_MS")]
    timeout_ms: Option<u64>,
    /// Block on the SYN acknowledgment with no deadline
    #[arg(long, conflicts_with = "timeout_ms")]
    reference: bool,
    /// Plaintext authenticated at the end of each handshake
    #[arg(long, env = "HANDSHAKE_AUTH_MESSAGE")]
    auth_message: Option<String>,
    /// Log every protocol step at debug level
    #[arg(long)]
    verbose: bool,
}

impl TimingArgs {
    fn config(&self) -> Result<HandshakeConfig> {
        let mut builder = HandshakeConfig::builder();
        if self.reference {
            builder = builder.syn_ack_timeout(None);
        }
        if let Some(ms) = self.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        if let Some(message) = &self.auth_message {
            builder = builder.auth_message(message.clone());
        }
        if self.verbose {
            builder = builder.verbose();
        }
        builder
            .build()
            .map_err(|reason| anyhow!("invalid timing options: {reason}"))
    }
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Node ids, in chain order
    #[arg(long, value_delimiter = ',', default_value = "Alice,Bob,Cathy,Dave,Eva")]
    nodes: Vec<String>,
    /// Link consecutive nodes
    #[arg(long)]
    chain: bool,
    /// Pairs to exercise, e.g. Alice-Eva,Bob-Cathy (default: consecutive pairs plus first-last)
    #[arg(long, value_delimiter = ',', value_parser = parse_pair)]
    pairs: Vec<(NodeId, NodeId)>,
    #[command(flatten)]
    backend: BackendArgs,
    #[command(flatten)]
    timing: TimingArgs,
    #[arg(long, default_value_t = 1)]
    iterations: usize,
    #[arg(long, default_value_t = 0)]
    warmup: usize,
    /// Run independent pairs concurrently
    #[arg(long)]
    concurrent: bool,
    /// Output JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct PrimitiveArgs {
    #[command(flatten)]
    backend: BackendArgs,
    #[arg(long, default_value_t = 1000)]
    iterations: usize,
    #[arg(long, default_value_t = 30)]
    warmup: usize,
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct BaselineArgs {
    #[arg(long, default_value = "Alice")]
    initiator: String,
    #[arg(long, default_value = "Eva")]
    responder: String,
    #[command(flatten)]
    timing: TimingArgs,
    #[arg(long)]
    json: bool,
}

fn parse_pair(raw: &str) -> Result<(NodeId, NodeId), String> {
    match raw.split_once('-').map(|(a, b)| (a.trim(), b.trim())) {
        Some((a, b)) if !a.is_empty() && !b.is_empty() => Ok((a.into(), b.into())),
        _ => Err(format!("expected <initiator>-<responder>, got '{raw}'")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Primitives(args) => run_primitives(args),
        Command::Baseline(args) => run_baseline(args).await,
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let nodes: Vec<NodeId> = args.nodes.iter().map(|n| NodeId::from(n.trim())).collect();
    let topology = if args.chain {
        Topology::chain(nodes.clone())
    } else {
        let mut topology = Topology::new();
        for id in &nodes {
            topology.add_node(id.clone());
        }
        topology
    };
    let pairs = if args.pairs.is_empty() {
        default_pairs(&nodes)
    } else {
        args.pairs
    };
    // Pairs may name nodes outside --nodes; those fail per pair
    for (a, b) in &pairs {
        if !topology.contains(a) || !topology.contains(b) {
            tracing::warn!(pair = %format!("{a}-{b}"), "pair names a node outside the topology");
        }
    }

    let backend = args.backend.backend()?;
    info!(backend = backend.name(), pairs = pairs.len(), iterations = args.iterations, "starting scenario");
    let scenario = Scenario {
        topology,
        pairs,
        backend,
        config: args.timing.config()?,
        policy: if args.concurrent {
            SchedulePolicy::Concurrent
        } else {
            SchedulePolicy::Sequential
        },
        iterations: args.iterations,
        warmup: args.warmup,
    };
    let report = scenario.run().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_scenario(&report);
    }

    if report.all_succeeded() {
        if !args.json {
            println!("--- READY FOR QUANTUM OPERATIONS ---");
        }
        Ok(())
    } else {
        if !args.json {
            println!("Handshake failed. Aborting.");
        }
        bail!(
            "{} of {} run(s) had a failed pair",
            report.iterations - report.successful_runs,
            report.iterations
        )
    }
}

fn print_scenario(report: &ScenarioReport) {
    let last = &report.last;
    println!("-- {} LATENCY --", last.backend);
    for entry in last.latency.dump() {
        println!("{} {} : {}", entry.stage, entry.link, entry.seconds);
    }
    println!();
    for pair in &last.pairs {
        let status = match &pair.error {
            None => "authenticated".to_string(),
            Some(err) => format!("failed: {err}"),
        };
        let hop = if pair.adjacent { "direct" } else { "multi-hop" };
        println!("{}<->{} ({hop}): {status}", pair.initiator, pair.responder);
    }
    println!("overall time: {:.6}s", last.total.as_secs_f64());

    if report.iterations > 1 {
        println!();
        println!(
            "-- {} measured run(s), {} warm-up; mean/median/p95 (ms) --",
            report.iterations, report.warmup
        );
        for key in &report.summaries {
            let s = key.summary.scaled(1000.0);
            println!("{:<40} {:>10.4} {:>10.4} {:>10.4}", key.key, s.mean, s.median, s.p95);
        }
    }
}

fn run_primitives(args: PrimitiveArgs) -> Result<()> {
    let backend = args.backend.backend()?;
    let report = primitives::run(backend.as_ref(), args.iterations, args.warmup)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let (derive, recover) = if backend.kind().uses_ciphertext() {
        ("encaps", "decaps")
    } else {
        ("compute (initiator)", "compute (responder)")
    };
    let row = |label: &str, s: &stats::Summary| {
        println!("{label} mean/median/p95 (ms): ({:.4}, {:.4}, {:.4})", s.mean, s.median, s.p95);
    };
    println!("{} over {} rounds ({} warm-up)", report.backend, report.iterations, report.warmup);
    row("keygen", &report.keygen_ms);
    row(derive, &report.derive_ms);
    row(recover, &report.recover_ms);
    println!("pk length : {}", report.public_len);
    if let Some(len) = report.ciphertext_len {
        println!("ct length : {len}");
    }
    println!("ss length : {}", report.secret_len);
    Ok(())
}

async fn run_baseline(args: BaselineArgs) -> Result<()> {
    let (initiator, responder) = (NodeId::from(args.initiator), NodeId::from(args.responder));
    if initiator == responder {
        bail!("initiator and responder must differ");
    }
    let network = Network::builder()
        .nodes([initiator.clone(), responder.clone()])
        .build();
    let latency = baseline::run(&network, &initiator, &responder, &args.timing.config()?).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&latency)?);
    } else {
        println!("-- 1 BYTE LATENCY --");
        for entry in latency.dump() {
            println!("{} {} : {}", entry.stage, entry.link, entry.seconds);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_syntax() {
        assert_eq!(parse_pair("Alice-Eva"), Ok(("Alice".into(), "Eva".into())));
        assert!(parse_pair("AliceEva").is_err());
        assert!(parse_pair("-Eva").is_err());
        assert!(parse_pair("Alice- ").is_err());
        assert!(parse_pair("  -Eva").is_err());
        assert_eq!(parse_pair(" Alice - Eva "), Ok(("Alice".into(), "Eva".into())));
    }

    #[test]
    fn cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "handshake-bench",
            "run",
            "--nodes",
            "Alice,Bob,Cathy",
            "--chain",
            "--pairs",
            "Alice-Cathy",
            "--backend",
            "dh",
            "--concurrent",
            "--timeout-ms",
            "500",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run subcommand");
        };
        assert_eq!(args.nodes, ["Alice", "Bob", "Cathy"]);
        assert_eq!(args.pairs, [(NodeId::from("Alice"), NodeId::from("Cathy"))]);
        assert_eq!(args.backend.backend, ExchangeKind::DiffieHellman);
        assert!(args.concurrent && args.chain);
        let config = args.timing.config().unwrap();
        assert_eq!(config.syn_ack_timeout, Some(Duration::from_millis(500)));
    }

    #[test]
    fn reference_flag_removes_syn_deadline() {
        let cli = Cli::try_parse_from(["handshake-bench", "baseline", "--reference"]).unwrap();
        let Command::Baseline(args) = cli.command else {
            panic!("expected baseline subcommand");
        };
        assert_eq!(args.timing.config().unwrap().syn_ack_timeout, None);
    }

    #[test]
    fn delimiter_in_auth_message_is_rejected() {
        let cli = Cli::try_parse_from(["handshake-bench", "baseline", "--auth-message", "A|B"]).unwrap();
        let Command::Baseline(args) = cli.command else {
            panic!("expected baseline subcommand");
        };
        assert!(args.timing.config().is_err());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let cli = Cli::try_parse_from(["handshake-bench", "baseline", "--timeout-ms", "0"]).unwrap();
        let Command::Baseline(args) = cli.command else {
            panic!("expected baseline subcommand");
        };
        let err = args.timing.config().unwrap_err();
        assert!(err.to_string().contains("non-zero"), "{err}");
    }

    #[test]
    fn timing_flags_flow_into_config() {
        let cli = Cli::try_parse_from([
            "handshake-bench",
            "baseline",
            "--reference",
            "--auth-message",
            "PING",
            "--verbose",
        ])
        .unwrap();
        let Command::Baseline(args) = cli.command else {
            panic!("expected baseline subcommand");
        };
        let config = args.timing.config().unwrap();
        assert_eq!(config.syn_ack_timeout, None);
        assert_eq!(config.syn_wait, HandshakeConfig::new().syn_wait);
        assert_eq!(config.auth_message, "PING");
        assert!(config.verbose_logging);
    }
}
