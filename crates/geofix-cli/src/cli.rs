//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use crate::commands::events::EventsArgs;
use crate::commands::export::ExportArgs;
use crate::commands::info::InfoArgs;
use crate::commands::stats::StatsArgs;
use crate::commands::traces::TracesArgs;

/// Telemetry capture correlator.
///
/// Reads per-device capture files, merges them into ordered datasets, and
/// answers location and field-correlation queries over the result.
#[derive(Debug, Parser)]
#[command(name = "geofix", version, about, long_about = None)]
pub struct Cli {
    /// Increase log detail. Twice for trace level.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Summarize each dataset: identity, span, event mix, error report.
    Info(InfoArgs),

    /// Print merged events, oldest first.
    Events(EventsArgs),

    /// Produce delimiter-joined rows for spreadsheets and GIS tools.
    Export(ExportArgs),

    /// Split located fixes into traces and describe each one.
    Traces(TracesArgs),

    /// Per-field value histograms honoring diversity gates.
    Stats(StatsArgs),
}
