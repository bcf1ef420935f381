use anyhow::Context;
use iaq_collector::ReadingsStore;
use iaq_linkd::config::LinkdConfig;
use iaq_linkd::simulation::Simulation;
use std::path::Path;
use std::time::Duration;

pub(super) async fn run(
    config_path: Option<&Path>,
    db: &Path,
    cycles: u64,
    interval_secs: Option<u64>,
) -> anyhow::Result<()> {
    let config = match config_path {
        Some(path) => LinkdConfig::from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => LinkdConfig::default(),
    };
    let store = ReadingsStore::open(db)
        .with_context(|| format!("opening reading store {}", db.display()))?;
    let mut simulation = Simulation::new(&config, store).context("building simulation")?;

    let interval = Duration::from_secs(interval_secs.unwrap_or(config.node.sample_interval_secs));
    log::info!(
        "node: sampling {} sensor(s) every {}s, collector at {}",
        config.sensors.len(),
        interval.as_secs(),
        simulation.mesh().collector_addr()
    );
    simulation.start();

    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    let mut completed = 0u64;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                log::info!("node: interrupted");
                break;
            }
        }
        simulation.round();
        completed += 1;
        if cycles != 0 && completed >= cycles {
            break;
        }
    }

    let stats = simulation.observer().stats();
    let sink = simulation.sink().stats();
    log::info!(
        "node: {completed} cycle(s), {} confirmed, {} unconfirmed, {} stored, {} undecodable",
        stats.confirmed(),
        stats.unconfirmed(),
        sink.stored,
        sink.undecodable
    );
    Ok(())
}
