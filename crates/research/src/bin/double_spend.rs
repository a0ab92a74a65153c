// Success rate of a double-spend attack with a third of the mining power.

use std::time::Instant;

use anyhow::Result;
use double_spend_sim::prelude::*;

fn main() -> Result<()> {
    let params = Parameters::builder()
        .trusted_nodes(16)
        .attacker_nodes(8)
        .difficulty(1e-3)
        .confirmations(3)
        .epsilon(1e-4)
        .runs(50)
        .build()?;

    env_logger::Builder::new()
        .filter_level(params.log_level())
        .parse_default_env()
        .init();

    let start = Instant::now();
    let results = DoubleSpendSimulation::new(params)?.run()?;

    println!("{}", ResultsTable::double_spend(&[results], Format::PrettyPrint));

    println!("elapsed time: {:.4} secs", start.elapsed().as_secs_f64());
    Ok(())
}
