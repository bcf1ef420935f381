mod readings;
mod simulate;

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "iaq-linkd", version, about = "IAQ sensor telemetry link over a simulated mesh")]
struct Cli {
    /// Log filter, overrides RUST_LOG (e.g. `debug`, `iaq_link=trace`)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Run a sensor node and collector over the loopback mesh
    Simulate {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value = "iaq-readings.db")]
        db: PathBuf,
        /// Stop after this many cycles; 0 runs until interrupted
        #[arg(long, default_value_t = 0)]
        cycles: u64,
        /// Overrides node.sample_interval_secs
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Print the most recent stored readings
    Readings {
        #[arg(long, default_value = "iaq-readings.db")]
        db: PathBuf,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn init_logging(level: Option<&str>) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(level) = level {
        builder.parse_filters(level);
    }
    builder.init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    match cli.command {
        Command::Simulate { config, db, cycles, interval_secs } => {
            simulate::run(config.as_deref(), &db, cycles, interval_secs).await
        }
        Command::Readings { db, limit } => readings::run(&db, limit),
    }
}
