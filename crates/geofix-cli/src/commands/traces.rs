//! Traces command describing each split journey and its projected extents.

use std::io::Write;

use anyhow::Result;
use clap::Args;
use geofix_core::dataset::Dataset;
use geofix_core::event::EventKind;
use geofix_core::geo::Point;
use geofix_core::trace::{MergedTrace, PixelProjection, SplitThresholds, assemble_traces};

use crate::Config;
use crate::commands::util::{self, SelectArgs};

#[derive(Debug, Args)]
pub struct TracesArgs {
    #[command(flatten)]
    pub select: SelectArgs,

    /// Split when consecutive fixes are further apart than this many
    /// degrees.
    #[arg(long)]
    pub max_gap_degrees: Option<f64>,

    /// Split when consecutive fixes are at least this many days apart.
    #[arg(long)]
    pub max_gap_days: Option<f64>,

    /// Pixel canvas edge for projected extents.
    #[arg(long, default_value_t = 800)]
    pub size: u32,

    /// Canvas inset in pixels.
    #[arg(long, default_value_t = 20)]
    pub padding: u32,
}

pub fn run<W: Write>(writer: &mut W, args: &TracesArgs, config: &Config) -> Result<()> {
    let batch = util::load_batch(config, &args.select)?;
    let thresholds = SplitThresholds {
        max_gap_degrees: args.max_gap_degrees.unwrap_or(config.trace.max_gap_degrees),
        max_gap_days: args.max_gap_days.unwrap_or(config.trace.max_gap_days),
    };
    for dataset in &batch.datasets {
        write_dataset(writer, dataset, &thresholds, args.size, args.padding)?;
    }
    Ok(())
}

fn write_dataset<W: Write>(
    writer: &mut W,
    dataset: &Dataset,
    thresholds: &SplitThresholds,
    size: u32,
    padding: u32,
) -> Result<()> {
    writeln!(writer, "Dataset {}", dataset.key())?;
    let fixes = dataset.sorted_of(&EventKind::Gps);
    let mut traces = assemble_traces(&fixes, thresholds);
    for trace in &mut traces {
        trace.remove_outliers();
    }
    if traces.is_empty() {
        writeln!(writer, "  No located fixes.")?;
        return Ok(());
    }

    for (index, trace) in traces.iter().enumerate() {
        writeln!(
            writer,
            "  Trace {index}: {} points ({} pushed)",
            trace.len(),
            trace.pushed_count()
        )?;
        if let (Some(first), Some(last)) = (trace.first_time(), trace.last_time()) {
            writeln!(
                writer,
                "    Span: {} .. {}",
                first.format("%Y-%m-%d %H:%M:%S"),
                last.format("%Y-%m-%d %H:%M:%S")
            )?;
        }
        if let Some(bounds) = trace.bounds() {
            writeln!(
                writer,
                "    Bounds: {},{} .. {},{}",
                bounds.min.latitude, bounds.min.longitude, bounds.max.latitude, bounds.max.longitude
            )?;
        }
        if let Some(centroid) = trace.centroid() {
            writeln!(
                writer,
                "    Centroid: {},{}",
                centroid.latitude, centroid.longitude
            )?;
        }
    }

    let merged: MergedTrace = traces.into_iter().collect();
    if let Some(bounds) = merged.bounds() {
        let projection = PixelProjection::fit(bounds, size, padding);
        let top_left = projection.project(&Point::new(bounds.max.latitude, bounds.min.longitude));
        let bottom_right =
            projection.project(&Point::new(bounds.min.latitude, bounds.max.longitude));
        writeln!(
            writer,
            "  Canvas {size}x{size}: x {:.0}..{:.0}, y {:.0}..{:.0}",
            top_left.0, bottom_right.0, top_left.1, bottom_right.1
        )?;
    }
    Ok(())
}
