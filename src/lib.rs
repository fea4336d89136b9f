//! # imgpipe
//!
//! Batch image-transformation jobs. A job names one source image and an
//! ordered list of operations (resize, thumbnail, sketch, normalize, charcoal,
//! level, tile, merge). Each operation is applied, written to its destination
//! file, and optionally uploaded to an S3 bucket.
//!
//! # Architecture
//!
//! ```text
//! job JSON ──► job::JobPayload ──► pipeline::Pipeline ──► output_dir/
//!                (validated)          │  per step:            │
//!                                     │  registry lookup       └──► upload (S3)
//!                                     │  transform (imaging / tiling)
//!                                     └► write + widen permissions
//! ```
//!
//! Every step re-opens the **original** source image. Steps are independent
//! transforms of the same input, not a chain. The only step that consumes
//! earlier output is `merge`, which reads tiles back by filename.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`job`] | Payload parsing, typed per-operation parameters, parse-time validation |
//! | [`registry`] | Operation kind → transform function table |
//! | [`pipeline`] | Sequential executor: transform, write, permissions, upload |
//! | [`tiling`] | Grid split of one image into tiles, and the inverse merge |
//! | [`imaging`] | `ImageHandle`, backend trait, pure dimension math, pixel filters |
//! | [`upload`] | Object-storage publishing (S3 via `object_store`) or no-op |
//! | [`config`] | `imgpipe.toml` loading, merging over stock defaults, validation |
//! | [`paths`] | Output directory and permission helpers |
//! | [`output`] | CLI output formatting for pipeline progress |
//!
//! # Design Decisions
//!
//! ## Validate The Whole Job First
//!
//! Operation names and parameters are checked when the payload is parsed, so
//! a typo in step five fails the job before step one writes anything.
//! Unknown names, case variants included, are `UnknownOperation`.
//!
//! ## Fail Fast, Upload Best-Effort
//!
//! A transform failure aborts the remaining steps. An upload failure is logged
//! and the job continues, unless `uploads.fail_on_error` is set in the config.
//!
//! ## Pure-Rust Imaging
//!
//! All pixel work uses the `image` crate. There is no ImageMagick dependency
//! and no subprocess: permissions are widened through `std::fs` directly.

pub mod config;
pub mod imaging;
pub mod job;
pub mod output;
pub mod paths;
pub mod pipeline;
pub mod registry;
pub mod tiling;
pub mod upload;
