use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::Resource;
use kview_api::{LabelSelector, Mirror, MirrorConfig, Persistent, QueryFacade, Readiness, ResourceKind, Running};
use kview_kubehub::{ClientOptions, KubeSources};
use kview_store::{visit, KindVisitor};
use serde::Serialize;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "kviewctl", version, about = "Query a RAM mirror of cluster state")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Only mirror namespaced kinds from this namespace (KVIEW_NAMESPACE)
    #[arg(long = "ns", global = true)]
    restrict_ns: Option<String>,

    /// Path to a kubeconfig file
    #[arg(long, global = true)]
    kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use
    #[arg(long, global = true)]
    context: Option<String>,

    /// Kinds to mirror for `serve`, comma separated (KVIEW_KINDS)
    #[arg(long, global = true)]
    kinds: Option<String>,

    /// Kinds that gate readiness for `serve` (KVIEW_GATE_KINDS)
    #[arg(long, global = true)]
    gate: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json, Yaml }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch one object by name
    Get {
        kind: ResourceKind,
        name: String,
        /// Namespace to read; defaults to --ns, then "default"
        #[arg(short = 'n', long)]
        namespace: Option<String>,
    },
    /// List objects of a kind in a namespace, or everywhere with --all
    Ls {
        kind: ResourceKind,
        /// Namespace to read; defaults to --ns, then "default"
        #[arg(short = 'n', long)]
        namespace: Option<String>,
        #[arg(short = 'A', long = "all")]
        all: bool,
    },
    /// List objects carrying every label in SELECTOR (e.g. "app=web,tier=fe")
    Labels {
        kind: ResourceKind,
        selector: LabelSelector,
        /// Namespace to read; defaults to --ns, then "default"
        #[arg(short = 'n', long)]
        namespace: Option<String>,
    },
    /// Latest event message recorded about an object
    Events {
        /// Involved object kind as the API reports it, e.g. "Pod"
        object_kind: String,
        object_name: String,
        /// Namespace to read; defaults to --ns, then "default"
        #[arg(short = 'n', long)]
        namespace: Option<String>,
    },
    /// Names of mirrored namespaces
    Namespaces,
    /// Keep the mirror running and log its status until interrupted
    Serve {
        /// Seconds between status lines
        #[arg(long, default_value_t = 30)]
        interval: u64,
    },
}

fn init_tracing() {
    let env = std::env::var("KVIEW_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("KVIEW_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid KVIEW_METRICS_ADDR; expected host:port");
        }
    }
}

/// Explicit `-n` wins, then the mirror's namespace restriction, then `default`.
fn target_ns(explicit: Option<String>, restricted: Option<&str>) -> String {
    explicit.or_else(|| restricted.map(str::to_string)).unwrap_or_else(|| "default".to_string())
}

/// Namespace key used by the store: cluster-scoped kinds live under "".
fn scope(kind: ResourceKind, namespace: &str) -> String {
    if kind.is_namespaced() { namespace.to_string() } else { String::new() }
}

fn render_age(created: Option<&Time>) -> String {
    let Some(Time(ts)) = created else { return "-".to_string() };
    let mut secs = (Utc::now() - *ts).num_seconds().max(0);
    let days = secs / 86_400; secs %= 86_400;
    let hours = secs / 3600; secs %= 3600;
    let mins = secs / 60; secs %= 60;
    if days > 0 { format!("{}d{}h", days, hours) }
    else if hours > 0 { format!("{}h{}m", hours, mins) }
    else if mins > 0 { format!("{}m", mins) }
    else { format!("{}s", secs) }
}

fn print_value<T: Serialize + ?Sized>(value: &T, output: Output) -> Result<()> {
    match output {
        Output::Json => println!("{}", serde_json::to_string_pretty(value)?),
        _ => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

fn print_objects<K: Resource + Serialize>(items: &[Arc<K>], output: Output) -> Result<()> {
    if output != Output::Human {
        let plain: Vec<&K> = items.iter().map(|o| o.as_ref()).collect();
        return print_value(&plain, output);
    }
    println!("{:<20} {:<40} AGE", "NAMESPACE", "NAME");
    for item in items {
        let meta = item.meta();
        let ns = meta.namespace.as_deref().unwrap_or("-");
        let name = meta.name.as_deref().unwrap_or("");
        println!("{:<20} {:<40} {}", ns, name, render_age(meta.creation_timestamp.as_ref()));
    }
    Ok(())
}

enum Request {
    Get { namespace: String, name: String },
    List { namespace: Option<String> },
    Labels { namespace: String, selector: LabelSelector },
}

/// Resolves a runtime kind to its typed collection and prints the answer.
struct Lookup<'a> {
    query: &'a QueryFacade,
    request: &'a Request,
    output: Output,
    result: Result<()>,
}

impl Lookup<'_> {
    fn run<K: Persistent>(&self) -> Result<()> {
        let items = match self.request {
            Request::Get { namespace, name } => match self.query.get_by_name::<K>(namespace, name)? {
                Some(obj) => vec![obj],
                None => bail!("{} {:?} not found in namespace {:?}", K::KIND, name, namespace),
            },
            Request::List { namespace: Some(ns) } => self.query.list_by_namespace::<K>(ns)?,
            Request::List { namespace: None } => self.query.list_all::<K>()?,
            Request::Labels { namespace, selector } => self.query.filter_by_label::<K>(namespace, selector)?,
        };
        print_objects(&items, self.output)
    }
}

impl KindVisitor for Lookup<'_> {
    fn persistent<K: Persistent>(&mut self) { self.result = self.run::<K>(); }

    fn events(&mut self) { self.result = Err(anyhow!("events keep only the latest message; use `kviewctl events`")); }
}

fn build_config(cli: &Cli) -> Result<MirrorConfig> {
    let mut cfg = MirrorConfig::from_env()?;
    if let Some(ns) = cli.restrict_ns.as_deref().filter(|s| !s.is_empty()) { cfg.namespace = Some(ns.to_string()); }
    if let Some(raw) = &cli.kinds { cfg.kinds = ResourceKind::parse_list(raw)?; }
    if let Some(raw) = &cli.gate { cfg.gate = Some(ResourceKind::parse_list(raw)?); }
    // One-shot queries only need the kind they read.
    let only = match &cli.command {
        Commands::Get { kind, .. } | Commands::Ls { kind, .. } | Commands::Labels { kind, .. } => Some(*kind),
        Commands::Events { .. } => Some(ResourceKind::Event),
        Commands::Namespaces => Some(ResourceKind::Namespace),
        Commands::Serve { .. } => None,
    };
    if let Some(kind) = only {
        cfg.kinds = vec![kind];
        cfg.gate = None;
    }
    cfg.validate()?;
    Ok(cfg)
}

/// One-shot queries need their kind synced; an unsynced kind has no answer to give.
async fn wait_ready(mirror: &Mirror, token: &CancellationToken) -> Result<()> {
    let secs = mirror.config().wait_secs;
    match tokio::time::timeout(Duration::from_secs(secs), mirror.wait(token)).await {
        Ok(Readiness::Ready) => Ok(()),
        Ok(Readiness::Cancelled) => bail!("readiness wait cancelled"),
        Err(_) => {
            let pending = mirror.gate().pending();
            warn!(secs, pending = ?pending, "mirror not ready");
            let names: Vec<&str> = pending.iter().map(|k| k.as_str()).collect();
            bail!("not synced after {}s (KVIEW_WAIT_SECS): {}", secs, names.join(", "))
        }
    }
}

async fn serve(mirror: &Mirror, mut running: Running, token: CancellationToken, interval: u64) -> Result<()> {
    let shutdown = signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut tick = tokio::time::interval(Duration::from_secs(interval.max(1)));
    let mut announced = false;
    loop {
        tokio::select! {
            res = &mut shutdown => {
                res?;
                info!("interrupt received; stopping synchronizers");
                break;
            }
            r = mirror.wait(&token), if !announced => {
                announced = true;
                if r == Readiness::Ready { info!(kinds = mirror.config().kinds.len(), "mirror ready"); }
            }
            exit = running.next_exit(), if !running.is_empty() => {
                if let Some((kind, Ok(()))) = exit { warn!(kind = %kind, "synchronizer stopped"); }
            }
            _ = tick.tick() => {
                let counts = mirror.query().counts();
                for (kind, n) in &counts {
                    metrics::gauge!("kview_objects", *n as f64, "kind" => kind.as_str());
                }
                let total: usize = counts.iter().map(|(_, n)| n).sum();
                info!(ready = mirror.ready(), synced = mirror.gate().synced_count(), objects = total, "mirror status");
            }
        }
    }
    token.cancel();
    running.join().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let cfg = build_config(&cli)?;

    let opts = ClientOptions { kubeconfig: cli.kubeconfig.clone(), context: cli.context.clone() };
    let client = kview_kubehub::connect(&opts).await?;
    let sources = KubeSources::new(client, cfg.namespace.clone(), cfg.strip_managed_fields);
    let mirror = Mirror::new(cfg)?;
    let token = CancellationToken::new();
    let running = mirror.start(&sources, token.clone());

    if let Commands::Serve { interval } = cli.command {
        return serve(&mirror, running, token, interval).await;
    }

    wait_ready(&mirror, &token).await?;
    let query = mirror.query();
    let restricted = mirror.config().namespace.clone();
    let result = match cli.command {
        Commands::Get { kind, name, namespace } => {
            let namespace = target_ns(namespace, restricted.as_deref());
            let request = Request::Get { namespace: scope(kind, &namespace), name };
            lookup(&query, kind, &request, cli.output)
        }
        Commands::Ls { kind, namespace, all } => {
            let namespace = (!all).then(|| scope(kind, &target_ns(namespace, restricted.as_deref())));
            lookup(&query, kind, &Request::List { namespace }, cli.output)
        }
        Commands::Labels { kind, selector, namespace } => {
            let namespace = target_ns(namespace, restricted.as_deref());
            let request = Request::Labels { namespace: scope(kind, &namespace), selector };
            lookup(&query, kind, &request, cli.output)
        }
        Commands::Events { object_kind, object_name, namespace } => {
            let namespace = target_ns(namespace, restricted.as_deref());
            let message = query.latest_event_message(&namespace, &object_kind, &object_name);
            match cli.output {
                Output::Human if message.is_empty() => println!("<none>"),
                Output::Human => println!("{}", message),
                out => print_value(&serde_json::json!({ "message": message }), out)?,
            }
            Ok(())
        }
        Commands::Namespaces => query.namespaces().map_err(anyhow::Error::from).and_then(|names| match cli.output {
            Output::Human => {
                names.iter().for_each(|n| println!("{}", n));
                Ok(())
            }
            out => print_value(&names, out),
        }),
        Commands::Serve { .. } => Ok(()),
    };

    token.cancel();
    running.join().await;
    result
}

fn lookup(query: &QueryFacade, kind: ResourceKind, request: &Request, output: Output) -> Result<()> {
    let mut visitor = Lookup { query, request, output, result: Ok(()) };
    visit(kind, &mut visitor);
    visitor.result
}
