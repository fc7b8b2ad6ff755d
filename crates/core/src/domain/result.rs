// Optimization Result Domain Model

use serde::{Deserialize, Serialize};

/// Scan encoding the tool reports for a file
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum EncodingMode {
    /// Baseline ("N")
    #[default]
    Normal,
    /// Progressive ("P")
    Progressive,
    /// Any other code the tool may emit
    Unknown(String),
}

impl EncodingMode {
    pub fn from_code(code: &str) -> Self {
        match code {
            "N" => EncodingMode::Normal,
            "P" => EncodingMode::Progressive,
            other => EncodingMode::Unknown(other.to_string()),
        }
    }

    pub fn as_code(&self) -> &str {
        match self {
            EncodingMode::Normal => "N",
            EncodingMode::Progressive => "P",
            EncodingMode::Unknown(code) => code,
        }
    }
}

impl std::fmt::Display for EncodingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_code())
    }
}

impl From<String> for EncodingMode {
    fn from(code: String) -> Self {
        EncodingMode::from_code(&code)
    }
}

impl From<EncodingMode> for String {
    fn from(mode: EncodingMode) -> Self {
        mode.as_code().to_string()
    }
}

/// One file as reported by the tool, in the order the tool reported it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// Reported source name (`stdin` for stream input)
    pub source_file: String,
    /// e.g. `2160x600`
    pub resolution: String,
    /// e.g. `24bit`
    pub color_depth: String,
    pub encoding: EncodingMode,
    pub source_size: u64,
    pub optimized_size: u64,
    /// Negative when the file grew
    pub percent_improvement: f64,
    pub was_optimized: bool,
    /// False only for malformed or partial status lines
    pub success: bool,
    /// Raw status line when `success` is false
    pub error_line: Option<String>,
    /// Image bytes, present only for buffer-output invocations
    #[serde(skip)]
    pub output: Option<Vec<u8>>,
}

impl OptimizationResult {
    /// Record for a status line that could not be parsed
    pub fn failed(line: impl Into<String>) -> Self {
        Self {
            error_line: Some(line.into()),
            ..Default::default()
        }
    }

    /// Bytes saved (negative if the output is larger)
    pub fn saved_bytes(&self) -> i64 {
        self.source_size as i64 - self.optimized_size as i64
    }
}
