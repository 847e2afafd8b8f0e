//! Core domain logic for geofix.
//!
//! This crate contains the fundamental types and logic for:
//! - Reading: parsing per-device capture files into typed, repaired events
//! - Datasets: merging sources into one ordered, filterable event stream
//! - Correlation: `recent` field lookups and GPS fix assignment
//! - Traces: splitting located streams into drawable journeys

pub mod dataset;
pub mod event;
pub mod export;
pub mod geo;
mod headers;
pub mod locator;
pub mod range;
pub mod reader;
pub mod source;
pub mod stats;
pub mod trace;
pub mod types;

pub use dataset::{Batch, Dataset, DatasetKey, DatasetOptions, make_datasets};
pub use event::{Event, EventKind, FieldValue};
pub use locator::{LocateOutcome, Locator, LocatorAlgorithm};
pub use source::Source;
pub use trace::{MergedTrace, SplitThresholds, Trace, assemble_traces};
pub use types::{DeviceId, EventId, SourceId};
