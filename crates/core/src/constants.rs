// Shared constants (No magic values)
use std::time::Duration;

/// Binary name used when no explicit path is configured
pub const DEFAULT_PROGRAM: &str = "jpegoptim";

/// Environment variable overriding the binary path
pub const PROGRAM_ENV: &str = "OPTIJPEG_PROGRAM";

/// Environment variable setting a per-invocation timeout in milliseconds
pub const TIMEOUT_ENV: &str = "OPTIJPEG_TIMEOUT_MS";

/// Token count of a well-formed status line whose filename has no comma
pub const STATUS_FIELD_COUNT: usize = 8;

/// Fixed fields anchored at the right end of every status line
pub const TRAILING_FIELD_COUNT: usize = STATUS_FIELD_COUNT - 1;

/// Status word reported for files the tool rewrote
pub const OPTIMIZED_STATUS: &str = "optimized";

/// Source name the tool reports for standard input
pub const STDIN_SOURCE: &str = "stdin";

/// Grace period between SIGTERM and SIGKILL when aborting an invocation (2 seconds)
pub const GRACEFUL_TERMINATE_TIMEOUT: Duration = Duration::from_secs(2);
