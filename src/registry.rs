//! Operation registry: the table from operation kind to transform function.
//!
//! Every built-in [`OperationKind`] has an entry in [`Registry::builtin`].
//! Names resolve through [`Registry::lookup`], which is exact and total over
//! the built-ins; anything else is [`JobError::UnknownOperation`].
//!
//! A transform receives the step's [`StepContext`] and its typed
//! [`Operation`]. Image transforms decode the original source through the
//! context and return one [`StepOutput::Image`]; `tile` writes its own files
//! and returns the grid; `merge` reads a grid back.

use crate::imaging::filters;
use crate::job::{JobError, Operation, OperationKind, OperationParams};
use crate::pipeline::{PipelineError, StepContext, StepOutput};
use crate::tiling::{self, TileGrid};
use std::collections::BTreeMap;

/// Signature shared by every transform.
pub type TransformFn = fn(&mut StepContext<'_>, &Operation) -> Result<StepOutput, PipelineError>;

/// Kind → transform table.
#[derive(Clone)]
pub struct Registry {
    entries: BTreeMap<OperationKind, TransformFn>,
}

impl Registry {
    /// A registry with no entries.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// A registry with every built-in operation.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(OperationKind::Resize, resize);
        registry.register(OperationKind::Thumbnail, thumbnail);
        registry.register(OperationKind::Sketch, sketch);
        registry.register(OperationKind::Normalize, normalize);
        registry.register(OperationKind::Charcoal, charcoal);
        registry.register(OperationKind::Level, level);
        registry.register(OperationKind::Tile, tile);
        registry.register(OperationKind::Merge, merge);
        registry
    }

    /// Install `transform` for `kind`, returning the entry it replaced.
    pub fn register(&mut self, kind: OperationKind, transform: TransformFn) -> Option<TransformFn> {
        self.entries.insert(kind, transform)
    }

    pub fn get(&self, kind: OperationKind) -> Option<TransformFn> {
        self.entries.get(&kind).copied()
    }

    /// Resolve an operation name. Matching is exact and case-sensitive.
    pub fn lookup(&self, name: &str) -> Result<TransformFn, JobError> {
        OperationKind::from_name(name)
            .and_then(|kind| self.get(kind))
            .ok_or_else(|| JobError::UnknownOperation(name.to_string()))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn mismatch(op: &Operation) -> PipelineError {
    PipelineError::ParamsMismatch(op.kind.name())
}

fn resize(ctx: &mut StepContext<'_>, op: &Operation) -> Result<StepOutput, PipelineError> {
    let OperationParams::Resize { width, height } = op.params else {
        return Err(mismatch(op));
    };
    let image = ctx.open_source(op.kind)?;
    let (w, h) = (width.unwrap_or(image.width()), height.unwrap_or(image.height()));
    image
        .try_map(|img| filters::resize_exact(img, w, h))
        .map(StepOutput::Image)
        .map_err(|e| PipelineError::transform(op.kind, e))
}

fn thumbnail(ctx: &mut StepContext<'_>, op: &Operation) -> Result<StepOutput, PipelineError> {
    let OperationParams::Thumbnail { width, height } = op.params else {
        return Err(mismatch(op));
    };
    let image = ctx.open_source(op.kind)?;
    let (w, h) = (width.unwrap_or(image.width()), height.unwrap_or(image.height()));
    image
        .try_map(|img| filters::thumbnail(img, w, h))
        .map(StepOutput::Image)
        .map_err(|e| PipelineError::transform(op.kind, e))
}

fn sketch(ctx: &mut StepContext<'_>, op: &Operation) -> Result<StepOutput, PipelineError> {
    let image = ctx.open_source(op.kind)?;
    Ok(StepOutput::Image(image.map(filters::sketch)))
}

fn normalize(ctx: &mut StepContext<'_>, op: &Operation) -> Result<StepOutput, PipelineError> {
    let image = ctx.open_source(op.kind)?;
    Ok(StepOutput::Image(image.map(filters::normalize)))
}

fn charcoal(ctx: &mut StepContext<'_>, op: &Operation) -> Result<StepOutput, PipelineError> {
    let image = ctx.open_source(op.kind)?;
    Ok(StepOutput::Image(image.map(filters::charcoal)))
}

fn level(ctx: &mut StepContext<'_>, op: &Operation) -> Result<StepOutput, PipelineError> {
    let OperationParams::Level(params) = &op.params else {
        return Err(mismatch(op));
    };
    let image = ctx.open_source(op.kind)?;
    Ok(StepOutput::Image(image.map(|img| filters::level(img, params))))
}

fn tile(ctx: &mut StepContext<'_>, op: &Operation) -> Result<StepOutput, PipelineError> {
    let OperationParams::Tile {
        num_tiles_width,
        num_tiles_height,
    } = op.params
    else {
        return Err(mismatch(op));
    };
    tiling::tile(
        ctx.backend,
        ctx.source,
        ctx.output_dir,
        num_tiles_width,
        num_tiles_height,
    )
    .map(StepOutput::Tiles)
}

/// Explicit tile counts win; otherwise the grid of the latest `tile` step.
fn merge(ctx: &mut StepContext<'_>, op: &Operation) -> Result<StepOutput, PipelineError> {
    let OperationParams::Merge { grid } = op.params else {
        return Err(mismatch(op));
    };
    let grid = match (grid, &ctx.tile_grid) {
        (Some((columns, rows)), _) => TileGrid::expected(columns, rows),
        (None, Some(previous)) => previous.clone(),
        (None, None) => {
            return Err(PipelineError::Job(JobError::InvalidParameter {
                op: op.kind.name(),
                message: "no tile grid: give num_tiles_width and num_tiles_height".into(),
            }));
        }
    };
    tiling::merge(ctx.backend, ctx.output_dir, &grid).map(StepOutput::Image)
}
