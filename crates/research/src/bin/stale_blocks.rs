// Stale block rate of an honest network for growing link latency.

use anyhow::Result;
use double_spend_sim::prelude::*;
use log::LevelFilter;

const LATENCIES: [f64; 4] = [10.0, 50.0, 100.0, 200.0];

fn main() -> Result<()> {
    let params = LATENCIES
        .iter()
        .map(|&latency| {
            Parameters::builder()
                .trusted_nodes(24)
                .attacker_nodes(0)
                .difficulty(1e-3)
                .trusted_latency(latency)
                .trusted_density(0.3)
                .epsilon(1e-3)
                .reset_peers(true)
                .runs(20)
                .log_level(LevelFilter::Info)
                .build()
        })
        .collect::<Result<Vec<_>, _>>()?;

    env_logger::Builder::new()
        .filter_level(params[0].log_level())
        .parse_default_env()
        .init();

    let mut results = vec![];
    for params in params {
        log::info!("mean latency {}", params.trusted_latency());
        results.push(StaleBlockSimulation::new(params)?.run()?);
    }

    println!("{}", ResultsTable::stale_blocks(&results, Format::PrettyPrint));

    Ok(())
}
