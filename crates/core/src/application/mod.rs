// Application Layer - Use Cases

pub mod optimizer;
mod validate;


// Re-exports
pub use optimizer::JpegOptim;
