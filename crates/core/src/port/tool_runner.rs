// Tool Runner Port
// Abstraction for running one jpegoptim invocation to completion

use crate::cancel::CancelToken;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

/// Image bytes fed to the tool's standard input
pub type InputStream<'a> = Box<dyn AsyncRead + Send + Unpin + 'a>;

/// Where the tool's standard output goes
pub enum OutputTarget<'a> {
    /// Standard output carries the status lines (in place or destination folder)
    StatusOnly,
    /// Image bytes are copied into the caller's writer; status lines on stderr
    Writer(&'a mut (dyn AsyncWrite + Send + Unpin)),
    /// Image bytes are collected in memory; status lines on stderr
    Buffer,
}

impl OutputTarget<'_> {
    /// True when status lines are read from standard output
    pub fn status_on_stdout(&self) -> bool {
        matches!(self, OutputTarget::StatusOnly)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OutputTarget::StatusOnly => "status",
            OutputTarget::Writer(_) => "writer",
            OutputTarget::Buffer => "buffer",
        }
    }
}

/// One external-tool invocation
pub struct Invocation<'a> {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub input: Option<InputStream<'a>>,
    pub output: OutputTarget<'a>,
    pub timeout: Option<Duration>,
    pub cancel: Option<CancelToken>,
}

/// Captured output of a finished invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOutput {
    /// Channel carrying status lines (stdout or stderr, depending on the target)
    pub status_text: String,
    /// The other text channel, if it carried text
    pub diagnostics: String,
    pub exit_code: Option<i32>,
    /// Image bytes for `OutputTarget::Buffer`
    pub buffer: Option<Vec<u8>>,
    pub duration_ms: u64,
}

/// Execution errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// The binary could not be launched (missing, not executable, denied)
    #[error("Failed to start {program}: {source}. Make sure jpegoptim is installed and its path is configured")]
    ToolUnavailable {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process timeout after {0}ms")]
    Timeout(u64),

    #[error("Invocation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Tool Runner trait
///
/// Implementations:
/// - SubprocessRunner: spawns the external process
/// - MockToolRunner: canned output for tests
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run the invocation until the process exits and every pipe is drained
    ///
    /// # Errors
    /// - ExecutionError::ToolUnavailable if the process cannot be started
    /// - ExecutionError::Timeout / Cancelled if it was aborted
    async fn run(&self, invocation: Invocation<'_>) -> Result<RawOutput, ExecutionError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Mock runner behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Print `status` on the status channel and `image` on stdout
        Respond {
            status: String,
            image: Vec<u8>,
            exit_code: i32,
        },
        /// Behave as if the binary is missing
        Unavailable,
        /// Fail as if the invocation timed out
        Timeout(u64),
    }

    /// What the mock saw for one call
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RecordedCall {
        pub program: PathBuf,
        pub args: Vec<String>,
        pub input: Option<Vec<u8>>,
        pub output_kind: &'static str,
    }

    /// Mock Tool Runner for testing
    pub struct MockToolRunner {
        behavior: Arc<Mutex<MockBehavior>>,
        calls: Arc<Mutex<Vec<RecordedCall>>>,
    }

    impl MockToolRunner {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior: Arc::new(Mutex::new(behavior)),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }
        pub fn new_status(status: impl Into<String>) -> Self {
            Self::new(MockBehavior::Respond {
                status: status.into(),
                image: Vec::new(),
                exit_code: 0,
            })
        }
        pub fn new_image(status: impl Into<String>, image: Vec<u8>) -> Self {
            Self::new(MockBehavior::Respond {
                status: status.into(),
                image,
                exit_code: 0,
            })
        }
        pub fn new_unavailable() -> Self {
            Self::new(MockBehavior::Unavailable)
        }
        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap().clone()
        }
        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ToolRunner for MockToolRunner {
        async fn run(&self, invocation: Invocation<'_>) -> Result<RawOutput, ExecutionError> {
            let Invocation {
                program,
                args,
                input,
                output,
                ..
            } = invocation;

            let input = match input {
                Some(mut reader) => {
                    let mut bytes = Vec::new();
                    reader.read_to_end(&mut bytes).await?;
                    Some(bytes)
                }
                None => None,
            };

            self.calls.lock().unwrap().push(RecordedCall {
                program: program.clone(),
                args,
                input,
                output_kind: output.kind(),
            });

            let behavior = self.behavior.lock().unwrap().clone();

            match behavior {
                MockBehavior::Respond {
                    status,
                    image,
                    exit_code,
                } => {
                    let buffer = match output {
                        OutputTarget::StatusOnly => None,
                        OutputTarget::Writer(writer) => {
                            writer.write_all(&image).await?;
                            writer.flush().await?;
                            None
                        }
                        OutputTarget::Buffer => Some(image),
                    };
                    Ok(RawOutput {
                        status_text: status,
                        diagnostics: String::new(),
                        exit_code: Some(exit_code),
                        buffer,
                        duration_ms: 1,
                    })
                }
                MockBehavior::Unavailable => Err(ExecutionError::ToolUnavailable {
                    program: program.display().to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "mock: not found"),
                }),
                MockBehavior::Timeout(ms) => Err(ExecutionError::Timeout(ms)),
            }
        }
    }
}
