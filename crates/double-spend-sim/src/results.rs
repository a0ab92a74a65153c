/*!
Aggregated simulation results

Round records are collected by a [`Tally`] (double-spend rounds) or a
[`StaleTally`] (stale block rounds), which hand out immutable snapshots:
[`DoubleSpendResults`] and [`StaleBlockResults`]. A list of snapshots can be
presented as a [`ResultsTable`].

## Examples

```no_run
use double_spend_sim::prelude::*;

let group = SimulationGroup::new(vec![
    Parameters::builder().attacker_nodes(4).build().unwrap(),
    Parameters::builder().attacker_nodes(8).build().unwrap(),
]);

let results = group.run_all().unwrap();
println!("{}", ResultsTable::double_spend(&results, Format::CSV));
```
*/

use std::fmt::Display;

use parking_lot::Mutex;

use crate::{
    outcome::{Outcome, Reporter, RoundOutcome},
    params::{Parameter, Parameters},
    stale::StaleOutcome,
};

/// Floating point precision of results data.
pub const FLOAT_PRECISION_DIGITS: usize = 6;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Counts {
    successes: u64,
    failures: u64,
    attacker_blocks: u64,
    attacker_stale: u64,
    trusted_blocks: u64,
    trusted_stale: u64,
}

/// Collects the outcomes of double-spend rounds.
#[derive(Debug, Default)]
pub struct Tally {
    counts: Mutex<Counts>,
}

impl Reporter<RoundOutcome> for Tally {
    fn report(&self, record: RoundOutcome) {
        let mut counts = self.counts.lock();
        match record.outcome {
            Outcome::Success => counts.successes += 1,
            Outcome::Failure => counts.failures += 1,
        }
        // Every stale block was mined in addition to the final chain
        counts.attacker_blocks += record.attacker_length + record.attacker_stale;
        counts.attacker_stale += record.attacker_stale;
        counts.trusted_blocks += record.trusted_length + record.trusted_stale;
        counts.trusted_stale += record.trusted_stale;
    }
}

impl Tally {
    pub fn rounds(&self) -> u64 {
        let counts = self.counts.lock();
        counts.successes + counts.failures
    }

    /// Snapshot of the collected outcomes of a simulation run with `params`.
    pub fn results(&self, params: &Parameters) -> DoubleSpendResults {
        let counts = *self.counts.lock();

        DoubleSpendResults {
            trusted_nodes: params.trusted_nodes(),
            attacker_nodes: params.attacker_nodes(),
            confirmations: params.confirmations(),
            successes: counts.successes,
            failures: counts.failures,
            attacker_blocks: counts.attacker_blocks,
            attacker_stale: counts.attacker_stale,
            trusted_blocks: counts.trusted_blocks,
            trusted_stale: counts.trusted_stale,
        }
    }
}

#[inline]
fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Totals of a double-spend simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct DoubleSpendResults {
    pub trusted_nodes: usize,
    pub attacker_nodes: usize,
    pub confirmations: Parameter<u64>,
    pub successes: u64,
    pub failures: u64,
    /// All blocks mined on attacker chains, stale ones included.
    pub attacker_blocks: u64,
    pub attacker_stale: u64,
    /// All blocks mined on trusted chains, stale ones included.
    pub trusted_blocks: u64,
    pub trusted_stale: u64,
}

impl DoubleSpendResults {
    pub fn rounds(&self) -> u64 {
        self.successes + self.failures
    }

    /// Fraction of rounds in which the attack succeeded.
    pub fn success_rate(&self) -> f64 {
        ratio(self.successes, self.rounds())
    }

    pub fn attacker_stale_rate(&self) -> f64 {
        ratio(self.attacker_stale, self.attacker_blocks)
    }

    pub fn trusted_stale_rate(&self) -> f64 {
        ratio(self.trusted_stale, self.trusted_blocks)
    }
}

impl Display for DoubleSpendResults {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} of {} attacks succeeded ({:.4}); attacker blocks {} ({} stale), \
             trusted blocks {} ({} stale)",
            self.successes,
            self.rounds(),
            self.success_rate(),
            self.attacker_blocks,
            self.attacker_stale,
            self.trusted_blocks,
            self.trusted_stale
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct StaleCounts {
    rounds: u64,
    blocks: u64,
    stale_blocks: u64,
}

/// Collects the outcomes of stale block rounds.
#[derive(Debug, Default)]
pub struct StaleTally {
    counts: Mutex<StaleCounts>,
}

impl Reporter<StaleOutcome> for StaleTally {
    fn report(&self, record: StaleOutcome) {
        let mut counts = self.counts.lock();
        counts.rounds += 1;
        counts.blocks += record.chain_length + record.stale_blocks;
        counts.stale_blocks += record.stale_blocks;
    }
}

impl StaleTally {
    pub fn rounds(&self) -> u64 {
        self.counts.lock().rounds
    }

    pub fn results(&self, params: &Parameters) -> StaleBlockResults {
        let counts = *self.counts.lock();

        StaleBlockResults {
            nodes: params.trusted_nodes() + params.attacker_nodes(),
            rounds: counts.rounds,
            blocks: counts.blocks,
            stale_blocks: counts.stale_blocks,
        }
    }
}

/// Totals of a stale block simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleBlockResults {
    pub nodes: usize,
    pub rounds: u64,
    /// All mined blocks, stale ones included.
    pub blocks: u64,
    pub stale_blocks: u64,
}

impl StaleBlockResults {
    pub fn stale_rate(&self) -> f64 {
        ratio(self.stale_blocks, self.blocks)
    }
}

impl Display for StaleBlockResults {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} of {} blocks stale ({:.4}) over {} rounds",
            self.stale_blocks,
            self.blocks,
            self.stale_rate(),
            self.rounds
        )
    }
}

/// Describes the appearance of a [`ResultsTable`] table as given by its
/// [`Display`] implementation.
#[derive(Debug, Clone, Copy, Default)]
pub enum Format {
    /// Comma-separated, without extra whitespace.
    CSV,
    /// Human-readable.
    #[default]
    PrettyPrint,
}

/// Column of a double-spend results table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DoubleSpendColumn {
    TrustedNodes,
    AttackerNodes,
    Confirmations,
    Rounds,
    Successes,
    SuccessRate,
    TrustedStaleRate,
    AttackerStaleRate,
}

/// Column of a stale block results table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StaleColumn {
    Nodes,
    Rounds,
    Blocks,
    StaleBlocks,
    StaleRate,
}

/// Value which corresponds to a column.
#[derive(Debug, Clone)]
enum ColumnValue {
    Count(u64),
    Rate(f64),
    Text(String),
}

impl DoubleSpendColumn {
    fn title(&self) -> &'static str {
        match self {
            Self::TrustedNodes => "Trusted Nodes",
            Self::AttackerNodes => "Attacker Nodes",
            Self::Confirmations => "Confirmations",
            Self::Rounds => "Rounds",
            Self::Successes => "Successes",
            Self::SuccessRate => "Success Rate",
            Self::TrustedStaleRate => "Trusted Stale Rate",
            Self::AttackerStaleRate => "Attacker Stale Rate",
        }
    }

    fn value(&self, data: &DoubleSpendResults) -> ColumnValue {
        match self {
            Self::TrustedNodes => ColumnValue::Count(data.trusted_nodes as u64),
            Self::AttackerNodes => ColumnValue::Count(data.attacker_nodes as u64),
            Self::Confirmations => ColumnValue::Text(data.confirmations.to_string()),
            Self::Rounds => ColumnValue::Count(data.rounds()),
            Self::Successes => ColumnValue::Count(data.successes),
            Self::SuccessRate => ColumnValue::Rate(data.success_rate()),
            Self::TrustedStaleRate => ColumnValue::Rate(data.trusted_stale_rate()),
            Self::AttackerStaleRate => ColumnValue::Rate(data.attacker_stale_rate()),
        }
    }
}

impl StaleColumn {
    fn title(&self) -> &'static str {
        match self {
            Self::Nodes => "Nodes",
            Self::Rounds => "Rounds",
            Self::Blocks => "Blocks",
            Self::StaleBlocks => "Stale Blocks",
            Self::StaleRate => "Stale Rate",
        }
    }

    fn value(&self, data: &StaleBlockResults) -> ColumnValue {
        match self {
            Self::Nodes => ColumnValue::Count(data.nodes as u64),
            Self::Rounds => ColumnValue::Count(data.rounds),
            Self::Blocks => ColumnValue::Count(data.blocks),
            Self::StaleBlocks => ColumnValue::Count(data.stale_blocks),
            Self::StaleRate => ColumnValue::Rate(data.stale_rate()),
        }
    }
}

impl Display for ColumnValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Count(count) => write!(f, "{}", count),
            Self::Rate(rate) => write!(f, "{:.1$}", rate, FLOAT_PRECISION_DIGITS),
            Self::Text(text) => write!(f, "{}", text),
        }
    }
}

/// Formatted results of a set of simulations, one row per simulation. The
/// table is given by the struct's [`Display`] implementation, as specified
/// by its [`Format`].
pub struct ResultsTable {
    titles: Vec<&'static str>,
    format: Format,
    rows: Vec<Vec<ColumnValue>>,
}

impl ResultsTable {
    const SEPARATOR_VERTICAL: char = '|';
    const SEPARATOR_HORIZONTAL: char = '-';

    /// Table of double-spend simulations.
    pub fn double_spend(data: &[DoubleSpendResults], format: Format) -> Self {
        let columns = vec![
            DoubleSpendColumn::TrustedNodes,
            DoubleSpendColumn::AttackerNodes,
            DoubleSpendColumn::Confirmations,
            DoubleSpendColumn::Rounds,
            DoubleSpendColumn::Successes,
            DoubleSpendColumn::SuccessRate,
            DoubleSpendColumn::TrustedStaleRate,
            DoubleSpendColumn::AttackerStaleRate,
        ];

        let rows = data
            .iter()
            .map(|results| columns.iter().map(|col| col.value(results)).collect())
            .collect();
        let titles = columns.iter().map(DoubleSpendColumn::title).collect();

        Self { titles, format, rows }
    }

    /// Table of stale block simulations.
    pub fn stale_blocks(data: &[StaleBlockResults], format: Format) -> Self {
        let columns = vec![
            StaleColumn::Nodes,
            StaleColumn::Rounds,
            StaleColumn::Blocks,
            StaleColumn::StaleBlocks,
            StaleColumn::StaleRate,
        ];

        let rows = data
            .iter()
            .map(|results| columns.iter().map(|col| col.value(results)).collect())
            .collect();
        let titles = columns.iter().map(StaleColumn::title).collect();

        Self { titles, format, rows }
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn set_format(&mut self, format: Format) {
        self.format = format;
    }
}

impl Display for ResultsTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let titles: Vec<_> =
            self.titles.iter().map(|title| title.to_string()).collect();

        match self.format {
            Format::CSV => {
                write!(f, "{}", titles.join(","))?;

                for row in self.rows.iter() {
                    writeln!(f)?;

                    let row: Vec<_> =
                        row.iter().map(|val| val.to_string()).collect();

                    write!(f, "{}", row.join(","))?;
                }
            }
            Format::PrettyPrint => {
                let mut text_widths: Vec<_> =
                    titles.iter().map(|title| title.len()).collect();

                for row in self.rows.iter() {
                    for (i, val) in row.iter().enumerate() {
                        let val = val.to_string();
                        text_widths[i] = text_widths[i].max(val.len());
                    }
                }

                for (i, title) in titles.into_iter().enumerate() {
                    write!(
                        f,
                        " {:1$} {2}",
                        title,
                        text_widths[i],
                        Self::SEPARATOR_VERTICAL
                    )?;
                }
                writeln!(f)?;

                let total_width = text_widths.iter().map(|x| x + 3).sum();
                for _ in 0..total_width {
                    write!(f, "{}", Self::SEPARATOR_HORIZONTAL)?;
                }

                for row in self.rows.iter() {
                    writeln!(f)?;

                    for (i, val) in row.iter().enumerate() {
                        write!(
                            f,
                            " {:1$} {2}",
                            val.to_string(),
                            text_widths[i],
                            Self::SEPARATOR_VERTICAL
                        )?;
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Format, ResultsTable, StaleTally, Tally};
    use crate::{
        outcome::{Outcome, Reporter, RoundOutcome},
        params::Parameters,
        stale::StaleOutcome,
    };

    fn outcome(outcome: Outcome, attacker: u64, trusted: u64) -> RoundOutcome {
        RoundOutcome {
            outcome,
            attacker_length: attacker,
            trusted_length: trusted,
            attacker_stale: 1,
            trusted_stale: 2,
        }
    }

    #[test]
    fn tally_counts_blocks_and_outcomes() {
        let params = Parameters::builder().build().unwrap();
        let tally = Tally::default();

        tally.report(outcome(Outcome::Success, 7, 6));
        tally.report(outcome(Outcome::Failure, 2, 9));
        tally.report(outcome(Outcome::Failure, 0, 9));

        let results = tally.results(&params);
        assert_eq!(results.rounds(), 3);
        assert_eq!(results.successes, 1);
        assert_eq!(results.attacker_blocks, 9 + 3);
        assert_eq!(results.trusted_blocks, 24 + 6);
        assert_eq!(results.trusted_stale_rate(), 6.0 / 30.0);
        assert!((results.success_rate() - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn empty_tally_has_zero_rates() {
        let params = Parameters::builder().build().unwrap();
        let results = Tally::default().results(&params);

        assert_eq!(results.success_rate(), 0.0);
        assert_eq!(results.attacker_stale_rate(), 0.0);
    }

    #[test]
    fn csv_table_has_one_row_per_simulation() {
        let params = Parameters::builder().trusted_nodes(4).attacker_nodes(2).build().unwrap();
        let tally = Tally::default();
        tally.report(outcome(Outcome::Success, 7, 6));
        let results = vec![tally.results(&params), tally.results(&params)];

        let table = ResultsTable::double_spend(&results, Format::CSV).to_string();
        let lines: Vec<_> = table.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Trusted Nodes,Attacker Nodes,Confirmations"));
        assert!(lines[1].starts_with("4,2,6,1,1,1.000000,"));
    }

    #[test]
    fn tables_only_show_their_own_columns() {
        let params = Parameters::builder().build().unwrap();

        let double_spend =
            ResultsTable::double_spend(&[Tally::default().results(&params)], Format::CSV)
                .to_string();
        let stale =
            ResultsTable::stale_blocks(&[StaleTally::default().results(&params)], Format::CSV)
                .to_string();

        assert_eq!(
            double_spend.lines().next().unwrap(),
            "Trusted Nodes,Attacker Nodes,Confirmations,Rounds,Successes,\
             Success Rate,Trusted Stale Rate,Attacker Stale Rate"
        );
        assert_eq!(
            stale.lines().next().unwrap(),
            "Nodes,Rounds,Blocks,Stale Blocks,Stale Rate"
        );
    }

    #[test]
    fn stale_table_reports_rate() {
        let params = Parameters::builder().trusted_nodes(3).attacker_nodes(1).build().unwrap();
        let tally = StaleTally::default();
        tally.report(StaleOutcome { chain_length: 8, stale_blocks: 2 });

        let results = tally.results(&params);
        assert_eq!(results.nodes, 4);
        assert_eq!(results.stale_rate(), 0.2);

        let table = ResultsTable::stale_blocks(&[results], Format::CSV).to_string();
        assert_eq!(table, "Nodes,Rounds,Blocks,Stale Blocks,Stale Rate\n4,1,10,2,0.200000");
    }
}
