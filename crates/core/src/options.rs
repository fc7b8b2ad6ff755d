// Argument Builder - Options to jpegoptim command line

use crate::constants::{DEFAULT_PROGRAM, PROGRAM_ENV, TIMEOUT_ENV};
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Target output size (`-S`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetSize {
    Kilobytes(u32),
    Percent(u8),
}

/// Metadata markers removed when stripping selectively
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StripMarkers {
    pub comments: bool,
    pub exif: bool,
    pub icc: bool,
    pub iptc: bool,
    pub xmp: bool,
}

impl StripMarkers {
    fn is_empty(&self) -> bool {
        !(self.comments || self.exif || self.icc || self.iptc || self.xmp)
    }
}

/// Metadata stripping policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strip {
    /// Leave the tool's default
    #[default]
    Unspecified,
    /// `-s`
    All,
    /// `--strip-none`
    None,
    /// Any combination of `--strip-com/exif/icc/iptc/xmp`
    Select(StripMarkers),
}

/// Scan encoding policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressiveMode {
    #[default]
    Unspecified,
    ForceNormal,
    ForceProgressive,
}

/// What the invocation is pointed at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    File { path: PathBuf, to_stdout: bool },
    Stdin { to_stdout: bool },
    Files(Vec<PathBuf>),
}

/// jpegoptim configuration
///
/// Treated as read-only for the duration of every invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Binary name or path
    pub program: PathBuf,
    pub destination_folder: Option<PathBuf>,
    /// Overwrite files already present in `destination_folder`
    pub overwrite: bool,
    pub force: bool,
    pub max_quality: Option<u8>,
    /// Report only, write nothing
    pub no_action: bool,
    pub target_size: Option<TargetSize>,
    /// Keep the original unless it shrinks by at least this percentage
    pub threshold: Option<u8>,
    pub preserve_timestamps: bool,
    pub preserve_permissions: bool,
    pub strip: Strip,
    pub progressive: ProgressiveMode,
    /// Abort the child process after this many milliseconds
    pub timeout_ms: Option<u64>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_PROGRAM),
            destination_folder: None,
            overwrite: false,
            force: false,
            max_quality: None,
            no_action: false,
            target_size: None,
            threshold: None,
            preserve_timestamps: false,
            preserve_permissions: false,
            strip: Strip::Unspecified,
            progressive: ProgressiveMode::Unspecified,
            timeout_ms: None,
        }
    }
}

impl Options {
    /// Defaults, overridden by `OPTIJPEG_PROGRAM` and `OPTIJPEG_TIMEOUT_MS`
    pub fn from_env() -> Result<Self> {
        let mut options = Self::default();

        if let Ok(program) = std::env::var(PROGRAM_ENV) {
            if !program.trim().is_empty() {
                options.program = PathBuf::from(program);
            }
        }

        if let Ok(raw) = std::env::var(TIMEOUT_ENV) {
            let timeout_ms = raw.trim().parse::<u64>().map_err(|e| {
                AppError::Config(format!("{} must be milliseconds: {}", TIMEOUT_ENV, e))
            })?;
            options.timeout_ms = Some(timeout_ms);
        }

        Ok(options)
    }

    /// Load options from a JSON document (missing keys take defaults)
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| AppError::Config(e.to_string()))
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Build the argument vector for `target`
    ///
    /// Fails before anything is spawned when a numeric option is out of range.
    pub fn arguments(&self, target: &Target) -> Result<Vec<String>> {
        self.validate()?;

        let mut args = vec!["-b".to_string()];

        if let Some(folder) = self.destination() {
            let folder = utf8(folder).map_err(AppError::Config)?;
            args.push(format!("-d{}", folder));
            if self.overwrite {
                args.push("-o".to_string());
            }
        }

        if self.force {
            args.push("-f".to_string());
        }

        if let Some(quality) = self.max_quality {
            args.push(format!("-m{}", quality));
        }

        if self.no_action {
            args.push("-n".to_string());
        }

        match self.target_size {
            Some(TargetSize::Kilobytes(kb)) => args.push(format!("-S{}", kb)),
            Some(TargetSize::Percent(percent)) => args.push(format!("-S{}%", percent)),
            None => {}
        }

        if let Some(threshold) = self.threshold {
            args.push(format!("-T{}", threshold));
        }

        if self.preserve_timestamps {
            args.push("-p".to_string());
        }

        if self.preserve_permissions {
            args.push("-P".to_string());
        }

        match self.strip {
            Strip::Unspecified => {}
            Strip::All => args.push("-s".to_string()),
            Strip::None => args.push("--strip-none".to_string()),
            Strip::Select(markers) => {
                let flags = [
                    (markers.comments, "--strip-com"),
                    (markers.exif, "--strip-exif"),
                    (markers.icc, "--strip-icc"),
                    (markers.iptc, "--strip-iptc"),
                    (markers.xmp, "--strip-xmp"),
                ];
                args.extend(
                    flags
                        .iter()
                        .filter(|(enabled, _)| *enabled)
                        .map(|(_, flag)| flag.to_string()),
                );
            }
        }

        match self.progressive {
            ProgressiveMode::Unspecified => {}
            ProgressiveMode::ForceNormal => args.push("--all-normal".to_string()),
            ProgressiveMode::ForceProgressive => args.push("--all-progressive".to_string()),
        }

        match target {
            Target::File { path, to_stdout } => {
                args.push(utf8(path).map_err(AppError::Validation)?.to_string());
                if *to_stdout {
                    args.push("--stdout".to_string());
                }
            }
            Target::Stdin { to_stdout } => {
                args.push("--stdin".to_string());
                if *to_stdout {
                    args.push("--stdout".to_string());
                }
            }
            Target::Files(paths) => {
                for path in paths {
                    args.push(utf8(path).map_err(AppError::Validation)?.to_string());
                }
            }
        }

        Ok(args)
    }

    fn destination(&self) -> Option<&PathBuf> {
        self.destination_folder
            .as_ref()
            .filter(|folder| !folder.as_os_str().is_empty())
    }

    fn validate(&self) -> Result<()> {
        if let Some(quality) = self.max_quality {
            if quality > 100 {
                return Err(AppError::Config(format!(
                    "max_quality must be <= 100, got {}",
                    quality
                )));
            }
        }

        if let Some(threshold) = self.threshold {
            if threshold > 100 {
                return Err(AppError::Config(format!(
                    "threshold must be <= 100, got {}",
                    threshold
                )));
            }
        }

        match self.target_size {
            Some(TargetSize::Percent(percent)) if !(1..=99).contains(&percent) => {
                return Err(AppError::Config(format!(
                    "target size percent must be in 1..=99, got {}",
                    percent
                )));
            }
            Some(TargetSize::Kilobytes(0)) => {
                return Err(AppError::Config(
                    "target size in kilobytes must be > 0".to_string(),
                ));
            }
            _ => {}
        }

        if let Strip::Select(markers) = self.strip {
            if markers.is_empty() {
                return Err(AppError::Config(
                    "selective strip requires at least one marker".to_string(),
                ));
            }
        }

        if self.program.as_os_str().is_empty() {
            return Err(AppError::Config("program path is empty".to_string()));
        }

        Ok(())
    }
}

// jpegoptim takes its arguments as text; a lossy conversion would name another file
fn utf8(path: &Path) -> std::result::Result<&str, String> {
    path.to_str().ok_or_else(|| {
        format!("path is not valid UTF-8: {}", path.display())
    })
}
