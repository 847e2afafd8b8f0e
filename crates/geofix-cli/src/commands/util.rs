//! Shared argument blocks and the flag-over-config merge every subcommand
//! performs before touching the engine.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use geofix_core::dataset::{Batch, DatasetOptions, make_datasets};
use geofix_core::geo::LocationFilter;
use geofix_core::locator::{Locator, LocatorAlgorithm};
use geofix_core::range::DateRanges;

use crate::Config;

/// Input selection shared by every subcommand.
#[derive(Debug, Args)]
pub struct SelectArgs {
    /// Capture files to read.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Keep only events inside this range, e.g. `2013-01-13..2013-01-20`.
    /// Semicolons join multiple ranges.
    #[arg(short = 't', long)]
    pub time_range: Option<String>,

    /// Keep only GPS fixes inside `minlat,minlon,maxlat,maxlon` or
    /// `dist(km,lat,lon)`.
    #[arg(short = 'l', long)]
    pub location: Option<String>,

    /// Merge every device into one dataset.
    #[arg(short = 'a', long)]
    pub combine_all: bool,
}

/// Fix-assignment knobs for the locating subcommands.
#[derive(Debug, Args)]
pub struct LocateArgs {
    /// Fix-picking algorithm: before, after, closest, interpolate.
    #[arg(long)]
    pub algorithm: Option<String>,

    /// Largest usable gap to a fix, in seconds. Zero or less means
    /// unlimited.
    #[arg(short = 'w', long)]
    pub window: Option<f64>,
}

/// Builds engine options from config defaults and per-run flags.
pub fn dataset_options(config: &Config, select: &SelectArgs) -> Result<DatasetOptions> {
    let time_range = select
        .time_range
        .as_deref()
        .or(config.time_range.as_deref())
        .map(DateRanges::from_spec)
        .transpose()
        .context("invalid time range")?;
    let location = select
        .location
        .as_deref()
        .or(config.location.as_deref())
        .map(LocationFilter::from_spec)
        .transpose()
        .context("invalid location filter")?
        .unwrap_or_default();
    Ok(DatasetOptions {
        time_range,
        location,
        accept: config.accept,
        combine_all: select.combine_all || config.combine_all,
    })
}

/// Reads every input file into grouped datasets.
pub fn load_batch(config: &Config, select: &SelectArgs) -> Result<Batch> {
    let options = dataset_options(config, select)?;
    make_datasets(&select.files, &options).context("failed to read captures")
}

/// The locator a command should use, honoring flag overrides.
pub fn locator(config: &Config, locate: &LocateArgs) -> Result<Locator> {
    let algorithm: LocatorAlgorithm = locate
        .algorithm
        .as_deref()
        .unwrap_or(&config.locator.algorithm)
        .parse()?;
    let window = locate.window.unwrap_or(config.locator.window_seconds);
    Ok(Locator::new(algorithm, window))
}
