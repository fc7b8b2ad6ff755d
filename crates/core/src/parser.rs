//! Status-line parser
//!
//! jpegoptim prints one comma-separated line per file:
//!
//! ```text
//! <file>,<WxH>,<bits>,<N|P>,<source size>,<optimized size>,<percent>,<status>
//! ```
//!
//! The tool does not escape commas inside file names, so the line is read
//! from the right: the trailing seven fields have fixed meaning and
//! everything in front of them is the file name.

use crate::constants::{OPTIMIZED_STATUS, STATUS_FIELD_COUNT, TRAILING_FIELD_COUNT};
use crate::domain::{EncodingMode, OptimizationResult};
use tracing::warn;

/// A status line split into its filename and the fixed trailing fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine<'a> {
    pub source_file: String,
    pub resolution: &'a str,
    pub color_depth: &'a str,
    pub encoding: &'a str,
    pub source_size: &'a str,
    pub optimized_size: &'a str,
    pub percent: &'a str,
    pub status: &'a str,
}

impl<'a> StatusLine<'a> {
    /// Right-anchored split; `None` when the line has fewer than eight tokens
    pub fn split(line: &'a str) -> Option<Self> {
        let tokens: Vec<&str> = line.split(',').filter(|t| !t.is_empty()).collect();
        if tokens.len() < STATUS_FIELD_COUNT {
            return None;
        }

        let (name, trailing) = tokens.split_at(tokens.len() - TRAILING_FIELD_COUNT);

        Some(Self {
            source_file: name.join(","),
            resolution: trailing[0],
            color_depth: trailing[1],
            encoding: trailing[2],
            source_size: trailing[3],
            optimized_size: trailing[4],
            percent: trailing[5],
            status: trailing[6],
        })
    }

    fn into_result(self) -> Option<OptimizationResult> {
        let source_size = self.source_size.parse::<u64>().ok()?;
        let optimized_size = self.optimized_size.parse::<u64>().ok()?;

        Some(OptimizationResult {
            source_file: self.source_file,
            resolution: self.resolution.to_string(),
            color_depth: self.color_depth.to_string(),
            encoding: EncodingMode::from_code(self.encoding),
            source_size,
            optimized_size,
            percent_improvement: parse_percent(self.percent),
            was_optimized: self.status.eq_ignore_ascii_case(OPTIMIZED_STATUS),
            success: true,
            error_line: None,
            output: None,
        })
    }
}

/// Parse captured status text into one result per non-blank line, in line order
///
/// Lines that cannot be read become failed results carrying the raw line.
pub fn parse_status(text: &str) -> Vec<OptimizationResult> {
    text.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(parse_line)
        .collect()
}

/// Parse a single status line
pub fn parse_line(line: &str) -> OptimizationResult {
    match StatusLine::split(line).and_then(StatusLine::into_result) {
        Some(result) => result,
        None => {
            warn!(line = %line, "Unparseable status line");
            OptimizationResult::failed(line)
        }
    }
}

// Unknown percentages read as 0 rather than failing the line.
fn parse_percent(raw: &str) -> f64 {
    raw.trim()
        .trim_end_matches('%')
        .parse::<f64>()
        .ok()
        .filter(|percent| percent.is_finite())
        .unwrap_or(0.0)
}
