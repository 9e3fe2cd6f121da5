//! NCM batch conversion for playlist-dl
//!
//! Drives the external `ncmdump` tool over a directory of `.ncm` files and
//! gives each result its canonical name.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::BoxFuture;
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::core::error::{Error, Result};
use crate::core::naming::canonical_converted_name;
use crate::core::stream::{emit, EventCallback, RunEvent};

/// Extension of files the tool converts
pub const SOURCE_EXTENSION: &str = "ncm";

/// Extension of files the tool produces
pub const CONVERTED_EXTENSION: &str = "mp3";

/// Executable name, without platform suffix
pub const TOOL_NAME: &str = "ncmdump";

/// Captured result of one finished process
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Spawns a program, waits for it and captures its output
pub trait ProcessRunner: Send + Sync {
    fn run<'a>(&'a self, program: &'a Path, args: &'a [OsString]) -> BoxFuture<'a, std::io::Result<ProcessOutput>>;
}

/// Runs real processes through tokio
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessRunner;

impl ProcessRunner for SystemProcessRunner {
    fn run<'a>(&'a self, program: &'a Path, args: &'a [OsString]) -> BoxFuture<'a, std::io::Result<ProcessOutput>> {
        Box::pin(async move {
            debug!("Executing {} {:?}", program.display(), args);
            let output = tokio::process::Command::new(program)
                .args(args)
                .kill_on_drop(true)
                .output()
                .await?;
            Ok(ProcessOutput {
                success: output.status.success(),
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        })
    }
}

/// Places searched for the tool, in priority order
///
/// Explicit path, next to the running executable and its `app/` directory,
/// the working directory, the sibling `../app/` directory, then `PATH`.
pub fn tool_candidates(explicit: Option<&Path>) -> Vec<PathBuf> {
    let file_name = format!("{TOOL_NAME}{}", std::env::consts::EXE_SUFFIX);
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));

    let mut candidates = Vec::new();
    if let Some(path) = explicit {
        candidates.push(path.to_path_buf());
    }
    if let Some(dir) = &exe_dir {
        candidates.push(dir.join(&file_name));
        candidates.push(dir.join("app").join(&file_name));
    }
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join(&file_name));
    }
    if let Some(dir) = &exe_dir {
        candidates.push(dir.join("..").join("app").join(&file_name));
    }
    if let Some(paths) = std::env::var_os("PATH") {
        candidates.extend(std::env::split_paths(&paths).map(|dir| dir.join(&file_name)));
    }
    candidates
}

/// First candidate that is an existing file
pub fn locate_tool(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates.iter().find(|path| path.is_file()).cloned()
}

/// One file's conversion request
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionJob {
    pub source_path: PathBuf,
    pub target_dir: PathBuf,
    pub skip_if_exists: bool,
    pub flip_name_order: bool,
}

impl ConversionJob {
    /// Canonical output path, independent of what the tool writes
    pub fn target_path(&self) -> PathBuf {
        let stem = self
            .source_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.target_dir
            .join(canonical_converted_name(&stem, CONVERTED_EXTENSION, self.flip_name_order))
    }
}

/// Batch-wide switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConvertOptions {
    pub skip_if_exists: bool,
    pub flip_name_order: bool,
}

/// Result of one file in a batch
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionOutcome {
    /// Converted; `warning` is set when the canonical rename did not happen
    Converted {
        path: PathBuf,
        warning: Option<String>,
    },
    /// Canonical target already existed
    Skipped(PathBuf),
    Failed(String),
}

impl ConversionOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, ConversionOutcome::Failed(_))
    }

    pub fn detail(&self) -> String {
        match self {
            ConversionOutcome::Converted { path, warning: None } => path.display().to_string(),
            ConversionOutcome::Converted {
                path,
                warning: Some(warning),
            } => format!("{} ({warning})", path.display()),
            ConversionOutcome::Skipped(path) => {
                format!("Skipped: {} (already exists)", path.display())
            }
            ConversionOutcome::Failed(message) => message.clone(),
        }
    }
}

/// Summary of a batch run
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchReport {
    pub outcomes: Vec<(PathBuf, ConversionOutcome)>,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Stopped early by the cancellation token
    pub cancelled: bool,
}

/// `.ncm` files directly inside `dir`, sorted by name
pub fn find_source_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(SOURCE_EXTENSION));
        if matches && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Converter bound to a located tool
pub struct Converter {
    tool: PathBuf,
    runner: Arc<dyn ProcessRunner>,
}

impl Converter {
    /// Locate the tool once; fails with [`Error::ToolUnavailable`] when absent
    pub fn locate(explicit: Option<&Path>) -> Result<Self> {
        let candidates = tool_candidates(explicit);
        let tool = locate_tool(&candidates).ok_or_else(|| {
            Error::ToolUnavailable(format!(
                "{TOOL_NAME} not found (searched {} locations); provide its path",
                candidates.len()
            ))
        })?;
        info!("Using {}", tool.display());
        Ok(Self::with_runner(tool, Arc::new(SystemProcessRunner)))
    }

    /// Converter with an explicit tool path and runner
    pub fn with_runner(tool: PathBuf, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { tool, runner }
    }

    pub fn tool_path(&self) -> &Path {
        &self.tool
    }

    /// Convert one file and return where the tool put the output
    ///
    /// A zero exit code is not enough: the output must exist next to the
    /// source or inside `target_dir`.
    pub async fn convert_one(&self, source: &Path, target_dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(target_dir).await?;

        let args = vec![
            source.as_os_str().to_os_string(),
            OsString::from("-o"),
            target_dir.as_os_str().to_os_string(),
        ];
        let output = self
            .runner
            .run(&self.tool, &args)
            .await
            .map_err(|e| Error::ToolFailed(format!("cannot run {}: {e}", self.tool.display())))?;

        if !output.success {
            let stderr = output.stderr.trim();
            let detail = if stderr.is_empty() {
                match output.code {
                    Some(code) => format!("exit code {code}"),
                    None => "terminated by signal".to_string(),
                }
            } else {
                stderr.to_string()
            };
            return Err(Error::ToolFailed(detail));
        }

        let beside_source = source.with_extension(CONVERTED_EXTENSION);
        if beside_source.exists() {
            return Ok(beside_source);
        }

        let file_name = beside_source.file_name().map(PathBuf::from).unwrap_or_default();
        let in_target = target_dir.join(file_name);
        if in_target.exists() {
            return Ok(in_target);
        }

        Err(Error::ToolFailed(format!(
            "converted file not found: {}",
            in_target.display()
        )))
    }

    /// Convert one job, applying skip and canonical naming
    pub async fn convert_job(&self, job: &ConversionJob) -> ConversionOutcome {
        let target = job.target_path();

        if job.skip_if_exists && target.exists() {
            info!("Skipping existing file: {}", target.display());
            return ConversionOutcome::Skipped(target);
        }

        let produced = match self.convert_one(&job.source_path, &job.target_dir).await {
            Ok(path) => path,
            Err(e) => return ConversionOutcome::Failed(e.to_string()),
        };

        if produced == target {
            return ConversionOutcome::Converted {
                path: produced,
                warning: None,
            };
        }

        match rename_no_clobber(&produced, &target).await {
            Ok(()) => ConversionOutcome::Converted {
                path: target,
                warning: None,
            },
            Err(e) => {
                let warning = format!("converted, but rename to {} failed: {e}", target.display());
                warn!("{warning}");
                ConversionOutcome::Converted {
                    path: produced,
                    warning: Some(warning),
                }
            }
        }
    }

    /// Convert every `.ncm` file in `source_dir` into `target_dir`
    ///
    /// The token is checked before each file. Only an unreadable source
    /// directory aborts the run.
    pub async fn convert_batch(
        &self,
        source_dir: &Path,
        target_dir: &Path,
        options: ConvertOptions,
        cancel: &CancellationToken,
        events: Option<&EventCallback>,
    ) -> Result<BatchReport> {
        let sources = match find_source_files(source_dir) {
            Ok(sources) => sources,
            Err(e) => {
                emit(events, RunEvent::RunError(e.to_string()));
                return Err(e);
            }
        };

        let total = sources.len();
        info!("Found {total} {SOURCE_EXTENSION} files in {}", source_dir.display());
        let mut report = BatchReport::default();

        for (i, source) in sources.into_iter().enumerate() {
            if cancel.is_cancelled() {
                info!("Conversion cancelled after {i} of {total} files");
                report.cancelled = true;
                break;
            }

            let index = i + 1;
            let label = source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            emit(events, RunEvent::Progress { index, total, label });

            let job = ConversionJob {
                source_path: source.clone(),
                target_dir: target_dir.to_path_buf(),
                skip_if_exists: options.skip_if_exists,
                flip_name_order: options.flip_name_order,
            };
            let outcome = self.convert_job(&job).await;

            match &outcome {
                ConversionOutcome::Converted { .. } => report.success += 1,
                ConversionOutcome::Skipped(_) => report.skipped += 1,
                ConversionOutcome::Failed(message) => {
                    warn!("[{index}/{total}] {}: {message}", source.display());
                    report.failed += 1;
                }
            }
            emit(
                events,
                RunEvent::ItemOutcome {
                    index,
                    success: outcome.is_success(),
                    detail: outcome.detail(),
                },
            );
            report.outcomes.push((source, outcome));
        }

        info!(
            "Conversion finished: {} converted, {} skipped, {} failed, {total} total",
            report.success, report.skipped, report.failed
        );
        emit(
            events,
            RunEvent::RunComplete {
                success: report.success,
                failed: report.failed,
                skipped: report.skipped,
            },
        );
        Ok(report)
    }
}

/// Rename that refuses to replace an existing file
async fn rename_no_clobber(from: &Path, to: &Path) -> std::io::Result<()> {
    if tokio::fs::try_exists(to).await? {
        return Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "target already exists",
        ));
    }
    tokio::fs::rename(from, to).await
}
