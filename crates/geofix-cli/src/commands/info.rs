//! Info command summarizing each dataset and the batch error report.

use std::io::Write;

use anyhow::Result;
use clap::Args;
use geofix_core::dataset::Batch;
use geofix_core::event::EventKind;

use crate::Config;
use crate::commands::util::{self, SelectArgs};

#[derive(Debug, Args)]
pub struct InfoArgs {
    #[command(flatten)]
    pub select: SelectArgs,
}

pub fn run<W: Write>(writer: &mut W, args: &InfoArgs, config: &Config) -> Result<()> {
    let batch = util::load_batch(config, &args.select)?;
    write_batch(writer, &batch)
}

fn write_batch<W: Write>(writer: &mut W, batch: &Batch) -> Result<()> {
    for dataset in &batch.datasets {
        writeln!(writer, "Dataset {}", dataset.key())?;
        writeln!(writer, "  Files: {}", dataset.file_count())?;
        writeln!(writer, "  Events: {}", dataset.event_count())?;
        if let (Some(first), Some(last)) = (dataset.first(), dataset.last()) {
            writeln!(writer, "  Span: {} .. {}", first.time_key(), last.time_key())?;
        }
        let subscribers = dataset.subscriber_ids();
        if !subscribers.is_empty() {
            let names: Vec<&str> = subscribers.iter().map(|id| id.as_str()).collect();
            writeln!(writer, "  Subscribers: {}", names.join(", "))?;
        }
        if let Some(platform) = dataset.platform() {
            writeln!(writer, "  Platform: {platform}")?;
        }
        if let Some(model) = dataset.model() {
            writeln!(writer, "  Model: {model}")?;
        }
        if let Some(os) = dataset.os_version() {
            writeln!(writer, "  OS: {os}")?;
        }
        let mix: Vec<String> = dataset
            .kind_names()
            .into_iter()
            .map(|name| {
                let kind = EventKind::from_name(&name);
                format!("{name} ({})", dataset.sorted_of(&kind).len())
            })
            .collect();
        if !mix.is_empty() {
            writeln!(writer, "  Types: {}", mix.join(", "))?;
        }
    }

    let counts = batch.error_counts();
    if counts.is_empty() {
        writeln!(writer, "No data errors.")?;
    } else {
        writeln!(writer, "Data errors:")?;
        for (tag, count) in counts.entries() {
            writeln!(writer, "  {tag}: {count}")?;
        }
    }
    Ok(())
}
