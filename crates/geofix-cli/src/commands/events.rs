//! Events command printing the merged stream for inspection.
//!
//! Text lines carry time key, device, type, coordinates, and fields;
//! `--json` switches to one serialized event per line.

use std::collections::HashMap;

use anyhow::Result;
use clap::Args;
use geofix_core::event::Event;
use geofix_core::geo::Point;
use geofix_core::types::EventId;

use crate::Config;
use crate::commands::util::{self, LocateArgs, SelectArgs};

#[derive(Debug, Args)]
pub struct EventsArgs {
    #[command(flatten)]
    pub select: SelectArgs,

    #[command(flatten)]
    pub locator: LocateArgs,

    /// Assign each event the nearest fix and print its coordinates.
    #[arg(short = 'L', long)]
    pub locate: bool,

    /// Only these event types. Repeatable.
    #[arg(short = 'k', long = "kind")]
    pub kinds: Vec<String>,

    /// Stop after this many events per dataset.
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Print events as JSON Lines instead of text.
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &EventsArgs, config: &Config) -> Result<()> {
    let batch = util::load_batch(config, &args.select)?;
    for dataset in &batch.datasets {
        let located = if args.locate {
            let locator = util::locator(config, &args.locator)?;
            locator.locate(dataset.sorted()).side_table()
        } else {
            HashMap::new()
        };

        let events = dataset
            .sorted()
            .iter()
            .filter(|event| {
                args.kinds.is_empty() || args.kinds.iter().any(|k| k == event.kind.name())
            })
            .take(args.limit.unwrap_or(usize::MAX));
        for event in events {
            if args.json {
                println!("{}", serde_json::to_string(event)?);
            } else {
                println!("{}", format_event(event, &located));
            }
        }
    }
    Ok(())
}

/// One text line per event. The coordinate column shows the side-table
/// location first, then the event's own fix, then a dash.
fn format_event(event: &Event, located: &HashMap<EventId, Point>) -> String {
    let location = located.get(&event.id).copied().or(event.location);
    let place = location.map_or_else(
        || "-".to_string(),
        |point| format!("{},{}", point.latitude, point.longitude),
    );
    let mut line = format!(
        "{} {} {} {}",
        event.time_key(),
        event.device,
        event.kind.name(),
        place
    );
    if !event.fields.is_empty() {
        let fields: Vec<String> = event
            .fields
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        line.push(' ');
        line.push_str(&fields.join(" "));
    }
    line
}
