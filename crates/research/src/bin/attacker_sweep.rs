// Double-spend success rate as the attacker share of the network grows.

use anyhow::Result;
use double_spend_sim::prelude::*;
use log::LevelFilter;

const TRUSTED_NODES: usize = 20;

fn main() -> Result<()> {
    let params = [2, 4, 6, 8, 10]
        .into_iter()
        .map(|attackers| {
            Parameters::builder()
                .trusted_nodes(TRUSTED_NODES)
                .attacker_nodes(attackers)
                .difficulty(1e-3)
                .confirmations_between(1, 6)
                .connection_latency(30.0)
                .epsilon(1e-3)
                .runs(40)
                .seed(attackers as u64)
                .log_level(LevelFilter::Warn)
                .build()
        })
        .collect::<Result<Vec<_>, _>>()?;

    env_logger::Builder::new()
        .filter_level(params[0].log_level())
        .parse_default_env()
        .init();

    let results = SimulationGroup::new(params).run_all()?;

    println!("{}", ResultsTable::double_spend(&results, Format::CSV));

    Ok(())
}
