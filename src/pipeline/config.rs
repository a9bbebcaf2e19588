use crate::pattern_extraction::FormatSpec;
use crate::sink::FilterCommand;

/// Configuration for one run. Built once, never changed by the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub format: FormatSpec,
    pub decompress: bool,
    pub filter: Option<FilterCommand>,
    pub error_strategy: ErrorStrategy,
    pub max_line_length: usize,
    pub buffer_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            format: FormatSpec::default(),
            decompress: false,
            filter: None,
            error_strategy: ErrorStrategy::Skip,
            max_line_length: 1048576, // 1MB
            buffer_size: 65536,       // 64KB
        }
    }
}

/// What to do with a line that does not parse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStrategy {
    /// Report it and move on to the next line
    Skip,
    /// Stop processing on first error
    FailFast,
}
