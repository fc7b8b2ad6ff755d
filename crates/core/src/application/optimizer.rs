// JpegOptim Service - caller-facing optimization use cases

use super::validate;
use crate::cancel::CancelToken;
use crate::domain::OptimizationResult;
use crate::error::{AppError, Result};
use crate::options::{Options, Target};
use crate::parser::parse_status;
use crate::port::{InputStream, Invocation, OutputTarget, RawOutput, ToolRunner};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

/// Façade over one jpegoptim binary
///
/// Every call is one independent process; the service holds no per-call state
/// and can be shared across tasks.
pub struct JpegOptim {
    options: Options,
    runner: Arc<dyn ToolRunner>,
    cancel: Option<CancelToken>,
}

impl JpegOptim {
    pub fn new(options: Options, runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            options,
            runner,
            cancel: None,
        }
    }

    /// Abort in-flight invocations when `token` fires
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Optimize one file in place (or into the destination folder)
    pub async fn optimize_file(&self, path: impl AsRef<Path>) -> Result<OptimizationResult> {
        let path = path.as_ref();
        validate::source_file(path).await?;

        let args = self.options.arguments(&Target::File {
            path: path.to_path_buf(),
            to_stdout: false,
        })?;

        let (results, raw) = self.invoke(args, None, OutputTarget::StatusOnly).await?;
        single(results, raw)
    }

    /// Optimize one file, writing the image bytes to `writer`
    pub async fn optimize_file_to<W>(
        &self,
        path: impl AsRef<Path>,
        writer: &mut W,
    ) -> Result<OptimizationResult>
    where
        W: AsyncWrite + Send + Unpin,
    {
        let path = path.as_ref();
        validate::source_file(path).await?;

        let args = self.options.arguments(&Target::File {
            path: path.to_path_buf(),
            to_stdout: true,
        })?;

        let (results, raw) = self
            .invoke(args, None, OutputTarget::Writer(writer))
            .await?;
        single(results, raw)
    }

    /// Optimize one file, returning the image bytes in `output`
    pub async fn optimize_file_to_buffer(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<OptimizationResult> {
        let path = path.as_ref();
        validate::source_file(path).await?;

        let args = self.options.arguments(&Target::File {
            path: path.to_path_buf(),
            to_stdout: true,
        })?;

        let (results, raw) = self.invoke(args, None, OutputTarget::Buffer).await?;
        single(results, raw)
    }

    /// Optimize an image read from `reader`, writing the result to `writer`
    ///
    /// The tool reports the source as `stdin`.
    pub async fn optimize_stream<R, W>(
        &self,
        reader: R,
        writer: &mut W,
    ) -> Result<OptimizationResult>
    where
        R: AsyncRead + Send + Unpin,
        W: AsyncWrite + Send + Unpin,
    {
        let args = self.options.arguments(&Target::Stdin { to_stdout: true })?;

        let (results, raw) = self
            .invoke(
                args,
                Some(Box::new(reader) as InputStream<'_>),
                OutputTarget::Writer(writer),
            )
            .await?;
        single(results, raw)
    }

    /// Optimize an image read from `reader`, returning the bytes in `output`
    pub async fn optimize_stream_to_buffer<R>(&self, reader: R) -> Result<OptimizationResult>
    where
        R: AsyncRead + Send + Unpin,
    {
        let args = self.options.arguments(&Target::Stdin { to_stdout: true })?;

        let (results, raw) = self
            .invoke(
                args,
                Some(Box::new(reader) as InputStream<'_>),
                OutputTarget::Buffer,
            )
            .await?;
        single(results, raw)
    }

    /// Optimize many files in one process
    ///
    /// Results follow the order the tool reported them in.
    pub async fn optimize_batch<I, P>(&self, paths: I) -> Result<Vec<OptimizationResult>>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let paths: Vec<PathBuf> = paths
            .into_iter()
            .map(|p| p.as_ref().to_path_buf())
            .collect();
        validate::batch(&paths).await?;

        let file_count = paths.len();
        let args = self.options.arguments(&Target::Files(paths))?;

        let (results, raw) = self.invoke(args, None, OutputTarget::StatusOnly).await?;
        if results.is_empty() {
            return Err(missing_status(raw));
        }

        if results.len() != file_count {
            debug!(
                files = file_count,
                lines = results.len(),
                "Status line count differs from batch size"
            );
        }

        Ok(results)
    }

    async fn invoke<'a>(
        &self,
        args: Vec<String>,
        input: Option<InputStream<'a>>,
        output: OutputTarget<'a>,
    ) -> Result<(Vec<OptimizationResult>, RawOutput)> {
        info!(
            program = %self.options.program.display(),
            args = ?args,
            stdin = input.is_some(),
            output = output.kind(),
            "Starting jpegoptim"
        );

        let mut raw = self
            .runner
            .run(Invocation {
                program: self.options.program.clone(),
                args,
                input,
                output,
                timeout: self.options.timeout(),
                cancel: self.cancel.clone(),
            })
            .await?;

        let mut results = parse_status(&raw.status_text);

        if raw.exit_code != Some(0) {
            warn!(
                exit_code = ?raw.exit_code,
                lines = results.len(),
                diagnostics = %raw.diagnostics.trim(),
                "jpegoptim exited abnormally"
            );
        }

        if let Some(buffer) = raw.buffer.take() {
            if let Some(first) = results.first_mut() {
                first.output = Some(buffer);
            }
        }

        info!(
            results = results.len(),
            optimized = results.iter().filter(|r| r.was_optimized).count(),
            failed = results.iter().filter(|r| !r.success).count(),
            duration_ms = raw.duration_ms,
            "jpegoptim finished"
        );

        Ok((results, raw))
    }
}

// A single-file run reports one line; stray diagnostics parse as failed
// records, so the first successful record wins.
fn single(mut results: Vec<OptimizationResult>, raw: RawOutput) -> Result<OptimizationResult> {
    if results.is_empty() {
        return Err(missing_status(raw));
    }

    let index = results.iter().position(|r| r.success).unwrap_or(0);
    let mut chosen = results.swap_remove(index);
    if chosen.output.is_none() {
        chosen.output = results.into_iter().find_map(|r| r.output);
    }
    Ok(chosen)
}

fn missing_status(raw: RawOutput) -> AppError {
    let diagnostics = if raw.diagnostics.trim().is_empty() {
        raw.status_text
    } else {
        raw.diagnostics
    };
    AppError::MissingStatus {
        exit_code: raw.exit_code,
        diagnostics: diagnostics.trim().to_string(),
    }
}
