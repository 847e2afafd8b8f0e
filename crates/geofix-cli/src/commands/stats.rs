//! Stats command printing per-field value histograms.
//!
//! Fields whose value sets are too diverse to chart are named but not
//! expanded, matching what a renderer would skip.

use std::io::Write;

use anyhow::Result;
use clap::Args;
use geofix_core::dataset::Dataset;
use geofix_core::stats::{StatsThresholds, collect_stats};

use crate::Config;
use crate::commands::util::{self, SelectArgs};

#[derive(Debug, Args)]
pub struct StatsArgs {
    #[command(flatten)]
    pub select: SelectArgs,

    /// Only these event types. Repeatable.
    #[arg(short = 'k', long = "kind")]
    pub kinds: Vec<String>,

    /// Distinct-value ceiling before a field counts as diverse.
    #[arg(long)]
    pub max_categories: Option<usize>,

    /// Diversity percentage ceiling.
    #[arg(long)]
    pub max_diversity: Option<f64>,
}

pub fn run<W: Write>(writer: &mut W, args: &StatsArgs, config: &Config) -> Result<()> {
    let batch = util::load_batch(config, &args.select)?;
    let thresholds = StatsThresholds {
        max_categories: args.max_categories.unwrap_or(config.stats.max_categories),
        max_diversity: args.max_diversity.unwrap_or(config.stats.max_diversity),
    };
    for dataset in &batch.datasets {
        write_dataset(writer, dataset, &thresholds, &args.kinds)?;
    }
    Ok(())
}

fn write_dataset<W: Write>(
    writer: &mut W,
    dataset: &Dataset,
    thresholds: &StatsThresholds,
    kinds: &[String],
) -> Result<()> {
    writeln!(writer, "Dataset {}", dataset.key())?;
    for ((kind, field), stats) in collect_stats(dataset) {
        if !kinds.is_empty() && !kinds.iter().any(|k| *k == kind) {
            continue;
        }
        if stats.total() == 0 {
            continue;
        }
        if stats.is_diverse(thresholds) {
            writeln!(
                writer,
                "  {kind}.{field}: {} values over {} samples, too diverse ({:.1}%)",
                stats.distinct(),
                stats.total(),
                stats.diversity()
            )?;
            continue;
        }
        let numeric = if stats.is_numeric() { ", numeric" } else { "" };
        writeln!(writer, "  {kind}.{field} ({} samples{numeric}):", stats.total())?;
        for (value, count) in stats.entries() {
            writeln!(writer, "    {value}: {count}")?;
        }
    }
    Ok(())
}
