// optijpeg Core - Domain Logic & Ports
// NO process management here (Hexagonal Architecture)

pub mod application;
pub mod cancel;
pub mod constants;
pub mod domain;
pub mod error;
pub mod options;
pub mod parser;
pub mod port;

pub use application::JpegOptim;
pub use cancel::{cancel_channel, CancelSender, CancelToken};
pub use domain::{EncodingMode, OptimizationResult};
pub use error::{AppError, Result};
pub use options::{Options, ProgressiveMode, Strip, StripMarkers, Target, TargetSize};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
