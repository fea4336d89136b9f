//! Sequential job executor.
//!
//! ## Step Sequence
//!
//! ```text
//! check source exists → ensure output dir (a+rw)
//! for each operation, in order:
//!     registry lookup → transform(StepContext)
//!     Image  → save to output_dir/destination (format override) → a+rw
//!     Tiles  → already on disk; remember the grid for a later merge
//!     upload every written file (skipped when disable_network)
//! ```
//!
//! Each image transform decodes the original source itself; outputs of
//! earlier steps are never fed forward, except tiles read back by `merge`.
//!
//! ## Failure Policy
//!
//! A transform or write failure aborts the job; files from completed steps
//! stay on disk. Upload failures follow [`UploadPolicy`]: logged and recorded
//! by default, fatal with [`UploadPolicy::FailFast`].
//!
//! Progress is reported through an optional `mpsc` channel of
//! [`PipelineEvent`]s so the caller can print while the job runs.

use crate::config::RunConfig;
use crate::imaging::{BackendError, ImageBackend, ImageHandle, OutputFormat, Quality, RustBackend};
use crate::job::{JobError, JobPayload, OperationKind};
use crate::paths::{ensure_output_dir, widen_permissions};
use crate::registry::Registry;
use crate::tiling::TileGrid;
use crate::upload::{UploadError, UploadResult, Uploader, uploader_for};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Job(#[from] JobError),
    #[error("{op} failed: {source}")]
    Transform {
        op: &'static str,
        source: BackendError,
    },
    #[error("Tile grid is incomplete, missing: {}", .missing.join(", "))]
    PartialTileGrid { missing: Vec<String> },
    #[error("Upload of {key} failed: {source}")]
    Upload { key: String, source: UploadError },
    #[error("Cannot set up uploads: {0}")]
    UploaderSetup(UploadError),
    #[error("Source image not found: {0}")]
    SourceNotFound(PathBuf),
    #[error("Parameters do not match operation {0}")]
    ParamsMismatch(&'static str),
}

impl PipelineError {
    pub fn transform(kind: OperationKind, source: BackendError) -> Self {
        Self::Transform {
            op: kind.name(),
            source,
        }
    }
}

/// What the executor does when an upload fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UploadPolicy {
    /// Log the failure, record it in the report, keep going.
    #[default]
    BestEffort,
    /// Abort the job with [`PipelineError::Upload`].
    FailFast,
}

/// Per-step state handed to transforms.
pub struct StepContext<'a> {
    pub backend: &'a dyn ImageBackend,
    /// The original source image.
    pub source: &'a Path,
    pub output_dir: &'a Path,
    /// Grid written by the most recent `tile` step.
    pub tile_grid: Option<TileGrid>,
}

impl<'a> StepContext<'a> {
    pub fn new(backend: &'a dyn ImageBackend, source: &'a Path, output_dir: &'a Path) -> Self {
        Self {
            backend,
            source,
            output_dir,
            tile_grid: None,
        }
    }

    /// Decode a fresh copy of the original source for `kind`.
    pub fn open_source(&self, kind: OperationKind) -> Result<ImageHandle, PipelineError> {
        self.backend
            .open(self.source)
            .map_err(|e| PipelineError::transform(kind, e))
    }
}

/// What a transform produced.
#[derive(Debug)]
pub enum StepOutput {
    /// One image, to be written to the step's destination.
    Image(ImageHandle),
    /// Tiles already written to the output directory.
    Tiles(TileGrid),
}

/// Progress events.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    StepStarted {
        index: usize,
        op: OperationKind,
        destination: Option<String>,
    },
    ImageWritten {
        file: String,
        width: u32,
        height: u32,
    },
    TilesWritten {
        columns: u32,
        rows: u32,
    },
    Uploaded {
        file: String,
        url: String,
    },
    UploadSkipped {
        file: String,
    },
    UploadFailed {
        file: String,
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub op: OperationKind,
    /// Files written, relative to the output directory.
    pub files: Vec<String>,
    /// One entry per file, in the same order.
    pub uploads: Vec<UploadResult>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobReport {
    pub steps: Vec<StepReport>,
}

impl JobReport {
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().flat_map(|s| s.files.iter().map(String::as_str))
    }

    pub fn failed_uploads(&self) -> usize {
        self.steps
            .iter()
            .flat_map(|s| &s.uploads)
            .filter(|u| !u.success)
            .count()
    }
}

pub struct Pipeline<'a> {
    backend: &'a dyn ImageBackend,
    uploader: &'a dyn Uploader,
    registry: Registry,
    output_dir: PathBuf,
    policy: UploadPolicy,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        backend: &'a dyn ImageBackend,
        uploader: &'a dyn Uploader,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            backend,
            uploader,
            registry: Registry::builtin(),
            output_dir: output_dir.into(),
            policy: UploadPolicy::default(),
        }
    }

    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_policy(mut self, policy: UploadPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Run every operation of `job` against `source`.
    pub fn run(
        &self,
        job: &JobPayload,
        source: &Path,
        events: Option<Sender<PipelineEvent>>,
    ) -> Result<JobReport, PipelineError> {
        if !source.is_file() {
            return Err(PipelineError::SourceNotFound(source.to_path_buf()));
        }
        ensure_output_dir(&self.output_dir)?;

        let emit = |event: PipelineEvent| {
            if let Some(tx) = &events {
                tx.send(event).ok();
            }
        };

        let mut ctx = StepContext::new(self.backend, source, &self.output_dir);
        let mut report = JobReport::default();

        for (index, op) in job.operations.iter().enumerate() {
            tracing::info!(step = index + 1, op = %op.kind, "running step");
            emit(PipelineEvent::StepStarted {
                index,
                op: op.kind,
                destination: op.destination.clone(),
            });

            let transform = self.registry.lookup(op.kind.name())?;
            let files = match transform(&mut ctx, op)? {
                StepOutput::Image(handle) => {
                    let name = op
                        .output_name()
                        .ok_or(JobError::MissingDestination { op: op.kind.name() })?;
                    self.write(&handle, name, op.kind, op.format)?;
                    emit(PipelineEvent::ImageWritten {
                        file: name.to_string(),
                        width: handle.width(),
                        height: handle.height(),
                    });
                    vec![name.to_string()]
                }
                StepOutput::Tiles(grid) => {
                    emit(PipelineEvent::TilesWritten {
                        columns: grid.columns(),
                        rows: grid.rows(),
                    });
                    let files = grid.filenames();
                    ctx.tile_grid = Some(grid);
                    files
                }
            };

            let uploads = if job.disable_network || !self.uploader.is_enabled() {
                files
                    .iter()
                    .map(|file| {
                        emit(PipelineEvent::UploadSkipped { file: file.clone() });
                        UploadResult::skipped()
                    })
                    .collect()
            } else {
                self.upload_all(&files, &emit)?
            };

            report.steps.push(StepReport {
                op: op.kind,
                files,
                uploads,
            });
        }

        Ok(report)
    }

    fn write(
        &self,
        handle: &ImageHandle,
        name: &str,
        kind: OperationKind,
        format: Option<OutputFormat>,
    ) -> Result<(), PipelineError> {
        let path = self.output_dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.backend
            .save(handle, &path, format)
            .map_err(|e| PipelineError::transform(kind, e))?;
        widen_permissions(&path)?;
        Ok(())
    }

    fn upload_all(
        &self,
        files: &[String],
        emit: &impl Fn(PipelineEvent),
    ) -> Result<Vec<UploadResult>, PipelineError> {
        let mut results = Vec::with_capacity(files.len());
        for file in files {
            match self.uploader.upload(&self.output_dir.join(file), file) {
                Ok(result) => {
                    if let Some(url) = &result.public_url {
                        tracing::info!(file = %file, url = %url, "uploaded");
                        emit(PipelineEvent::Uploaded {
                            file: file.clone(),
                            url: url.clone(),
                        });
                    }
                    results.push(result);
                }
                Err(source) if self.policy == UploadPolicy::FailFast => {
                    return Err(PipelineError::Upload {
                        key: file.clone(),
                        source,
                    });
                }
                Err(e) => {
                    tracing::warn!(file = %file, error = %e, "upload failed");
                    emit(PipelineEvent::UploadFailed {
                        file: file.clone(),
                        error: e.to_string(),
                    });
                    results.push(UploadResult {
                        success: false,
                        public_url: None,
                    });
                }
            }
        }
        Ok(results)
    }
}

/// Run `job` with the production backend and the uploader the job asks for.
///
/// The source is `source_dir/<last segment of image_url>`.
pub fn run_job(
    job: &JobPayload,
    source_dir: &Path,
    output_dir: &Path,
    config: &RunConfig,
    events: Option<Sender<PipelineEvent>>,
) -> Result<JobReport, PipelineError> {
    let source = source_dir.join(job.source_filename());
    let backend = RustBackend::with_quality(Quality::new(config.images.quality));
    let uploader = uploader_for(job).map_err(PipelineError::UploaderSetup)?;
    let policy = if config.uploads.fail_on_error {
        UploadPolicy::FailFast
    } else {
        UploadPolicy::BestEffort
    };

    Pipeline::new(&backend, uploader.as_ref(), output_dir)
        .with_policy(policy)
        .run(job, &source, events)
}
