// Port Layer - Interfaces for external dependencies

pub mod tool_runner;

// Re-exports
pub use tool_runner::{
    ExecutionError, InputStream, Invocation, OutputTarget, RawOutput, ToolRunner,
};
