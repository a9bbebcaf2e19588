// src/lib.rs
pub mod config_file;
pub mod error;
pub mod input_format;
pub mod pattern_extraction;
pub mod pipeline;
pub mod sink;
pub mod sources;

pub use error::*;
pub use pipeline::*;

pub use config_file::Settings;
pub use input_format::{LineParser, ParseOutcome, Record};
pub use pattern_extraction::{CompiledFormat, FieldStrategy, FormatSpec};
pub use sink::{FilterCommand, OutputSink};
pub use sources::{resolve_sources, Resolution, Source, SourceName};
