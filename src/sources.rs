// src/sources.rs - Resolve path arguments into readable inputs

use flate2::read::MultiGzDecoder;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::SourceError;

/// Where an input comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceName {
    Stdin,
    Path(PathBuf),
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceName::Stdin => write!(f, "<stdin>"),
            SourceName::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// One open input, consumed exactly once by the pipeline
pub struct Source {
    name: SourceName,
    reader: Box<dyn Read>,
    decompress: bool,
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("name", &self.name)
            .field("decompress", &self.decompress)
            .finish()
    }
}

impl Source {
    pub fn stdin(decompress: bool) -> Self {
        Self::from_reader(SourceName::Stdin, io::stdin(), decompress)
    }

    pub fn open(path: &Path, decompress: bool) -> Result<Self, SourceError> {
        if path.is_dir() {
            return Err(SourceError::IsDirectory(path.to_path_buf()));
        }
        let file = File::open(path).map_err(|source| SourceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_reader(
            SourceName::Path(path.to_path_buf()),
            file,
            decompress,
        ))
    }

    pub fn from_reader<R: Read + 'static>(name: SourceName, reader: R, decompress: bool) -> Self {
        Source {
            name,
            reader: Box::new(reader),
            decompress,
        }
    }

    pub fn name(&self) -> &SourceName {
        &self.name
    }

    pub fn is_compressed(&self) -> bool {
        self.decompress
    }

    /// Buffered line reader over the (decompressed) bytes
    ///
    /// Data that is not gzip fails on the first read instead of being
    /// passed through.
    pub fn into_reader(self, buffer_size: usize) -> Box<dyn BufRead> {
        // A zero-capacity BufReader reports end of input on the first fill
        let buffer_size = buffer_size.max(1);
        if self.decompress {
            Box::new(BufReader::with_capacity(
                buffer_size,
                MultiGzDecoder::new(self.reader),
            ))
        } else {
            Box::new(BufReader::with_capacity(buffer_size, self.reader))
        }
    }
}

/// Inputs ready to process plus everything that could not be opened
#[derive(Debug, Default)]
pub struct Resolution {
    pub sources: Vec<Source>,
    pub failures: Vec<SourceError>,
}

/// Expand path arguments into open sources, in argument order then match
/// order. No arguments means standard input.
pub fn resolve_sources<S: AsRef<str>>(patterns: &[S], decompress: bool) -> Resolution {
    let mut resolution = Resolution::default();

    if patterns.is_empty() {
        debug!("reading from stdin");
        resolution.sources.push(Source::stdin(decompress));
        return resolution;
    }

    for pattern in patterns {
        let pattern = pattern.as_ref();
        let (paths, errors) = expand_pattern(pattern);

        for error in errors {
            warn!("{}", error);
            resolution.failures.push(error);
        }

        for path in paths {
            match Source::open(&path, decompress) {
                Ok(source) => {
                    debug!(path = %path.display(), "opened input");
                    resolution.sources.push(source);
                }
                Err(error) => {
                    warn!("{}", error);
                    resolution.failures.push(error);
                }
            }
        }
    }

    resolution
}

fn has_glob_meta(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Paths a pattern stands for, plus any problems found while expanding it
fn expand_pattern(pattern: &str) -> (Vec<PathBuf>, Vec<SourceError>) {
    if !has_glob_meta(pattern) {
        return (vec![PathBuf::from(pattern)], Vec::new());
    }

    let entries = match glob::glob(pattern) {
        Ok(entries) => entries,
        Err(source) => {
            return (
                Vec::new(),
                vec![SourceError::InvalidPattern {
                    pattern: pattern.to_string(),
                    source,
                }],
            )
        }
    };

    let mut paths = Vec::new();
    let mut errors = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) => paths.push(path),
            Err(e) => errors.push(SourceError::from(e)),
        }
    }

    if paths.is_empty() && errors.is_empty() {
        errors.push(SourceError::NoMatches(pattern.to_string()));
    }

    (paths, errors)
}
