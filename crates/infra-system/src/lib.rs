// optijpeg Infrastructure - System Adapters
// Implements: ToolRunner

pub mod subprocess_runner;

pub use subprocess_runner::SubprocessRunner;

use optijpeg_core::{JpegOptim, Options};
use std::sync::Arc;

/// Service wired to the real jpegoptim process runner
pub fn jpegoptim(options: Options) -> JpegOptim {
    JpegOptim::new(options, Arc::new(SubprocessRunner::new()))
}
