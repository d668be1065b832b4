use anyhow::{Context as _, Result};
use clap::{Parser, ValueEnum};
use infuse_engine::Approach;
use infuse_runner::{offline, online, output, record, RuleSet};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum Mode {
    Offline,
    Online,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Incremental consistency checking over a context change stream")]
struct Args {
    /// Checking technique and scheduler, e.g. `PCC+GEAS_ori` or `INFUSE`
    #[arg(long, default_value = "INFUSE")]
    approach: String,

    /// Rule set (JSON)
    #[arg(long)]
    rules: PathBuf,

    /// Contexts to load before checking starts (JSON array of
    /// `{"pat_id", "contexts": [{"ctx_id", "fields"}]}`)
    #[arg(long)]
    contextpool: Option<PathBuf>,

    /// Change records, one per line (offline mode)
    #[arg(long)]
    data: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Mode::Offline)]
    mode: Mode,

    /// Write per-rule results instead of the accumulated links
    #[arg(long)]
    test: bool,

    /// Minimize link generation to substantial nodes
    #[arg(long)]
    mg: bool,

    /// Output file for results or links; stdout if absent
    #[arg(long)]
    incs: Option<PathBuf>,

    /// Output file for the CCT dump
    #[arg(long)]
    cct: Option<PathBuf>,

    /// UDP port to listen on (online mode)
    #[arg(long, default_value_t = online::DEFAULT_PORT)]
    port: u16,

    /// Receive timeout ending the online stream
    #[arg(long, default_value_t = 10_000)]
    timeout_ms: u64,
}

fn writer(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(io::stdout()),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let approach: Approach = args.approach.parse()?;
    let rules = RuleSet::load(&args.rules)
        .with_context(|| format!("loading rules from {}", args.rules.display()))?;
    let mut engine = rules.engine(approach, args.mg)?;
    if let Some(path) = &args.contextpool {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let pool = record::decode_pool(&text)
            .with_context(|| format!("decoding context pool {}", path.display()))?;
        offline::seed(&mut engine, pool)?;
    }
    engine.check_init()?;

    let stats = match args.mode {
        Mode::Offline => {
            let path = args
                .data
                .as_ref()
                .context("offline mode needs --data")?;
            let input = File::open(path).with_context(|| format!("opening {}", path.display()))?;
            offline::run(&mut engine, BufReader::new(input))?
        }
        Mode::Online => {
            let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, args.port));
            let socket = UdpSocket::bind(addr)
                .await
                .with_context(|| format!("binding {}", addr))?;
            info!(%addr, "listening");
            online::run(
                &mut engine,
                socket,
                Duration::from_millis(args.timeout_ms),
            )
            .await
        }
    };

    let mut out = writer(args.incs.as_deref())?;
    if args.test {
        engine.end();
        output::write_results(&engine, &mut out)?;
    } else {
        output::write_links(&engine, &mut out)?;
    }
    out.flush()?;

    if let Some(path) = &args.cct {
        let mut cct = writer(Some(path))?;
        output::write_cct(&engine, &mut cct)?;
        cct.flush()?;
    }

    info!(
        %approach,
        records = stats.records,
        failures = stats.failures,
        "done"
    );
    Ok(())
}

#[test]
fn test_args_parse() {
    let args = Args::try_parse_from([
        "infuse",
        "--rules",
        "rules.json",
        "--contextpool",
        "pool.json",
        "--mode",
        "online",
    ])
    .expect("ok");

    assert_eq!(args.approach, "INFUSE");
    assert_eq!(args.contextpool, Some(PathBuf::from("pool.json")));
    assert_eq!(args.mode, Mode::Online);
    assert_eq!(args.port, online::DEFAULT_PORT);
    assert!(!args.test && !args.mg);

    assert!(Args::try_parse_from(["infuse"]).is_err());
}
