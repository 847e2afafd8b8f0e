//! Export command producing tab-joined rows.
//!
//! Rows go to stdout by default, or to `.csv` files under `--out`, one per
//! dataset (and per type with `--separate`). Every non-GPS row gets its
//! coordinates from the locator side table.

use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use geofix_core::dataset::DatasetKey;
use geofix_core::export::{ExportOptions, Exporter};

use crate::Config;
use crate::commands::util::{self, LocateArgs, SelectArgs};

/// Column separator in produced rows.
const DELIMITER: &str = "\t";

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub select: SelectArgs,

    #[command(flatten)]
    pub locator: LocateArgs,

    /// Only these event types. Repeatable.
    #[arg(short = 'k', long = "kind")]
    pub kinds: Vec<String>,

    /// Add identity and correlation columns.
    #[arg(short = 'x', long)]
    pub extended: bool,

    /// One output per event type, with unprefixed field columns.
    #[arg(long)]
    pub separate: bool,

    /// Write `.csv` files to this directory instead of stdout.
    #[arg(short, long)]
    pub out: Option<std::path::PathBuf>,
}

pub fn run(args: &ExportArgs, config: &Config) -> Result<()> {
    let batch = util::load_batch(config, &args.select)?;
    let locator = util::locator(config, &args.locator)?;

    for dataset in &batch.datasets {
        let located = locator.locate(dataset.sorted()).side_table();
        let options = ExportOptions {
            extended: args.extended,
            separate: args.separate,
            kinds: args.kinds.clone(),
            ..ExportOptions::default()
        };
        let exporter = Exporter::new(dataset, &located, options);

        if let Some(dir) = &args.out {
            write_files(dir, dataset.key(), &exporter, args.separate)?;
        } else {
            let out = stdout();
            let mut writer = BufWriter::new(out.lock());
            if args.separate {
                for kind in exporter.kinds() {
                    write_rows(&mut writer, &exporter, Some(kind))?;
                }
            } else {
                write_rows(&mut writer, &exporter, None)?;
            }
            writer.flush()?;
        }
    }
    Ok(())
}

fn write_files(dir: &Path, key: &DatasetKey, exporter: &Exporter, separate: bool) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    if separate {
        for kind in exporter.kinds() {
            let path = dir.join(format!("{key}_{kind}.csv"));
            let mut writer = create(&path)?;
            write_rows(&mut writer, exporter, Some(kind))?;
            writer.flush()?;
        }
    } else {
        let path = dir.join(format!("{key}.csv"));
        let mut writer = create(&path)?;
        write_rows(&mut writer, exporter, None)?;
        writer.flush()?;
    }
    Ok(())
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

/// Header plus every matching row. `kind` narrows to one type for separate
/// outputs; `None` writes the shared-file shape.
fn write_rows<W: Write>(writer: &mut W, exporter: &Exporter, kind: Option<&str>) -> Result<()> {
    writeln!(writer, "{}", exporter.header(kind).join(DELIMITER))?;
    for row in exporter.rows() {
        if kind.is_some_and(|k| k != row.kind) {
            continue;
        }
        writeln!(writer, "{}", row.values.join(DELIMITER))?;
    }
    Ok(())
}
