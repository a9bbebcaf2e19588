// src/pipeline/stream.rs
use std::io::{self, BufRead, Read, Write};
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::{ConfigError, ParseFailure, ProcessingError, SourceError};
use crate::input_format::LineParser;
use crate::pattern_extraction::CompiledFormat;
use crate::pipeline::config::{ErrorStrategy, PipelineConfig};
use crate::pipeline::context::{CancellationToken, ProcessingStats};
use crate::sources::Source;

/// Main pipeline orchestrator
pub struct StreamPipeline {
    parser: Box<dyn LineParser>,
    config: PipelineConfig,
    cancel: CancellationToken,
    stats: ProcessingStats,
    // Reused between records
    scratch: Vec<u8>,
}

impl StreamPipeline {
    pub fn new(parser: Box<dyn LineParser>, config: PipelineConfig) -> Self {
        StreamPipeline {
            parser,
            config,
            cancel: CancellationToken::new(),
            stats: ProcessingStats::default(),
            scratch: Vec::new(),
        }
    }

    /// Compile the configured format and build a pipeline around it
    pub fn from_config(config: PipelineConfig) -> Result<Self, ConfigError> {
        if config.buffer_size == 0 {
            return Err(ConfigError::InvalidBufferSize(config.buffer_size));
        }
        let parser = CompiledFormat::compile(&config.format)?.into_parser();
        debug!(format = parser.name(), fields = ?parser.field_names(), "compiled format");
        Ok(Self::new(parser, config))
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn get_config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Get current accumulated stats
    pub fn get_stats(&self) -> &ProcessingStats {
        &self.stats
    }

    /// Drain every source in order into `output`.
    ///
    /// Bad lines and unreadable sources are reported and skipped; only
    /// output errors, fail-fast aborts and cancellation end the run.
    pub fn run<W: Write>(
        &mut self,
        sources: Vec<Source>,
        output: &mut W,
    ) -> Result<ProcessingStats, ProcessingError> {
        for source in sources {
            self.process_source(source, output)?;
        }
        output.flush()?;
        Ok(self.stats.clone())
    }

    /// Consume one source; it is closed when this returns
    pub fn process_source<W: Write>(
        &mut self,
        source: Source,
        output: &mut W,
    ) -> Result<ProcessingStats, ProcessingError> {
        let name = source.name().to_string();
        debug!(source = %name, compressed = source.is_compressed(), "processing");
        let reader = source.into_reader(self.config.buffer_size);
        self.process_stream(reader, output, &name)
    }

    /// Process a single file/stream
    pub fn process_stream<R: BufRead, W: Write>(
        &mut self,
        mut input: R,
        output: &mut W,
        name: &str,
    ) -> Result<ProcessingStats, ProcessingError> {
        let start_time = Instant::now();
        let mut file_stats = ProcessingStats::default();

        let result = self.drain(&mut input, output, name, &mut file_stats);
        // Only a source read to the end counts as processed
        if result.is_ok() && file_stats.sources_failed == 0 {
            file_stats.sources_processed = 1;
        }

        file_stats.processing_time = start_time.elapsed();
        self.stats.add(&file_stats);
        debug!(
            source = name,
            lines = file_stats.lines_read,
            records = file_stats.records_output,
            failures = file_stats.parse_failures,
            "finished source"
        );

        result.map(|_| file_stats)
    }

    fn drain<R: BufRead, W: Write>(
        &mut self,
        input: &mut R,
        output: &mut W,
        name: &str,
        file_stats: &mut ProcessingStats,
    ) -> Result<(), ProcessingError> {
        let mut buf = Vec::new();

        loop {
            if self.cancel.is_cancelled() {
                return Err(ProcessingError::Interrupted);
            }

            buf.clear();
            let raw = match read_capped_line(input, &mut buf, self.config.max_line_length) {
                Ok(RawLine::Eof) => return Ok(()),
                Ok(raw) => raw,
                Err(source) => {
                    // Includes gzip errors; the rest of this source is lost
                    let error = SourceError::Read {
                        name: name.to_string(),
                        source,
                    };
                    warn!("{}", error);
                    file_stats.sources_failed += 1;
                    return Ok(());
                }
            };

            if buf.last() == Some(&b'\n') {
                buf.pop();
                if buf.last() == Some(&b'\r') {
                    buf.pop();
                }
            }
            file_stats.lines_read += 1;
            let line_number = file_stats.lines_read;

            let length = match raw {
                RawLine::TooLong(length) => length,
                _ => buf.len(),
            };
            let outcome = if length > self.config.max_line_length {
                Err(ParseFailure::LineTooLong {
                    length,
                    max_length: self.config.max_line_length,
                })
            } else {
                self.parser.parse_line(&String::from_utf8_lossy(&buf))
            };

            match outcome {
                Ok(record) => {
                    self.scratch.clear();
                    serde_json::to_writer(&mut self.scratch, &record)?;
                    self.scratch.push(b'\n');
                    output.write_all(&self.scratch)?;
                    file_stats.records_output += 1;
                }
                Err(failure) => match self.config.error_strategy {
                    ErrorStrategy::Skip => {
                        file_stats.parse_failures += 1;
                        warn!(source = name, line = line_number, "{}", failure);
                    }
                    ErrorStrategy::FailFast => {
                        file_stats.parse_failures += 1;
                        return Err(ProcessingError::Aborted {
                            name: name.to_string(),
                            line: line_number,
                            failure,
                        });
                    }
                },
            }
        }
    }
}

/// What one bounded line read produced
#[derive(Debug, PartialEq, Eq)]
enum RawLine {
    Eof,
    Line,
    /// Longer than the cap; holds the full length, the bytes were discarded
    TooLong(usize),
}

/// Read one line into `buf`, holding at most `max_length` bytes of it plus
/// the line terminator. Anything past the cap is skipped up to the next
/// newline without being buffered.
fn read_capped_line<R: BufRead>(
    input: &mut R,
    buf: &mut Vec<u8>,
    max_length: usize,
) -> io::Result<RawLine> {
    // Room for a trailing "\r\n"
    let limit = max_length.saturating_add(2);
    let read = input.by_ref().take(limit as u64).read_until(b'\n', buf)?;
    if read == 0 {
        return Ok(RawLine::Eof);
    }
    if buf.last() == Some(&b'\n') || read < limit {
        return Ok(RawLine::Line);
    }

    let mut length = read;
    loop {
        let (used, found_newline) = {
            let available = input.fill_buf()?;
            if available.is_empty() {
                break;
            }
            match available.iter().position(|&b| b == b'\n') {
                Some(pos) => (pos + 1, true),
                None => (available.len(), false),
            }
        };
        input.consume(used);
        if found_newline {
            length += used - 1;
            break;
        }
        length += used;
    }

    buf.clear();
    Ok(RawLine::TooLong(length))
}
