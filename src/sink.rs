// src/sink.rs - Where serialized records go

use std::io::{self, BufWriter, LineWriter, Stdout, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use tracing::debug;

use crate::error::ProcessingError;

/// An external program that receives the records on its stdin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl FilterCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        FilterCommand {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

pub enum OutputSink {
    /// Our own stdout, flushed per record
    Direct(LineWriter<Stdout>),
    /// A child process; its stdout is inherited so its output passes
    /// through untouched
    Filtered {
        program: PathBuf,
        child: Child,
        stdin: BufWriter<ChildStdin>,
    },
}

impl OutputSink {
    pub fn direct() -> Self {
        OutputSink::Direct(LineWriter::new(io::stdout()))
    }

    pub fn spawn(filter: &FilterCommand) -> Result<Self, ProcessingError> {
        let spawn_error = |source| ProcessingError::FilterSpawn {
            program: filter.program.clone(),
            source,
        };

        let mut child = Command::new(&filter.program)
            .args(&filter.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(spawn_error)?;

        let stdin = match child.stdin.take() {
            Some(stdin) => stdin,
            None => {
                let _ = child.kill();
                return Err(spawn_error(io::Error::other("stdin was not captured")));
            }
        };

        debug!(program = %filter.program.display(), pid = child.id(), "started filter");
        Ok(OutputSink::Filtered {
            program: filter.program.clone(),
            child,
            stdin: BufWriter::new(stdin),
        })
    }

    /// Flush and close. For a filter: write the trailing newline, close its
    /// stdin so it sees end of input, and wait for it to exit.
    pub fn finish(self) -> Result<(), ProcessingError> {
        match self {
            OutputSink::Direct(mut out) => match out.flush() {
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                other => other.map_err(ProcessingError::from),
            },
            OutputSink::Filtered {
                program,
                mut child,
                mut stdin,
            } => {
                let closed = stdin
                    .write_all(b"\n")
                    .and_then(|_| stdin.flush())
                    .map_err(|e| (e.kind(), e));
                // Dropping the pipe is what signals end of input
                drop(stdin);
                if let Err((kind, e)) = closed {
                    // The filter may legitimately exit before reading everything
                    if kind != io::ErrorKind::BrokenPipe {
                        let _ = child.wait();
                        return Err(ProcessingError::FilterClose(e));
                    }
                }

                let status = child.wait().map_err(ProcessingError::FilterClose)?;
                debug!(program = %program.display(), %status, "filter exited");
                if status.success() {
                    Ok(())
                } else {
                    Err(ProcessingError::FilterStatus { program, status })
                }
            }
        }
    }
}

impl Write for OutputSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputSink::Direct(out) => out.write(buf),
            OutputSink::Filtered { stdin, .. } => stdin.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputSink::Direct(out) => out.flush(),
            OutputSink::Filtered { stdin, .. } => stdin.flush(),
        }
    }
}
