// Domain Layer - Pure data produced for callers

pub mod result;

// Re-exports
pub use result::{EncodingMode, OptimizationResult};
