//! CLI output formatting.
//!
//! # Step-First Display
//!
//! Every step is shown by its position and operation name, with the file it
//! writes as `→` context. Details (size, tile grid, upload outcome) follow as
//! indented lines, so the output reads as a log of what the job did.
//!
//! # Output Format
//!
//! ## Run
//!
//! ```text
//! 001 resize → small.jpg
//!     Size: 100x50
//!     Upload: https://s3-us-east-1.amazonaws.com/bucket/small.jpg
//! 002 tile
//!     Tiles: 3x2
//!     Upload: filename_0_0.jpg skipped
//!
//! Wrote 7 files to tmp_images
//! ```
//!
//! ## Check
//!
//! ```text
//! Source: photos/in.jpg
//! 001 resize → small.jpg (100x50)
//! 002 level → level.png (black 10%, white 90%, gamma 1.2)
//! 003 tile (3x2)
//! 004 merge → merged_file.jpg
//! Uploads: s3://bucket (us-east-1)
//! ```
//!
//! # Architecture
//!
//! Each display has a `format_*` function (returns `Vec<String>` or `String`)
//! for testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::job::{JobPayload, Operation, OperationParams};
use crate::pipeline::{JobReport, PipelineEvent};
use std::path::Path;

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Step header: position, operation, and destination when there is one.
///
/// ```text
/// 001 resize → out.jpg
/// 002 tile
/// ```
fn step_header(index: usize, op: &str, destination: Option<&str>) -> String {
    match destination {
        Some(dest) => format!("{} {} → {}", format_index(index + 1), op, dest),
        None => format!("{} {}", format_index(index + 1), op),
    }
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{} {}", n, word)
    } else {
        format!("{} {}s", n, word)
    }
}

fn size(width: Option<u32>, height: Option<u32>) -> Option<String> {
    let side = |v: Option<u32>| v.map_or_else(|| "source".to_string(), |v| v.to_string());
    match (width, height) {
        (None, None) => None,
        _ => Some(format!("{}x{}", side(width), side(height))),
    }
}

/// Parameter summary shown after a step in `check` output.
fn op_detail(op: &Operation) -> Option<String> {
    match &op.params {
        OperationParams::Resize { width, height }
        | OperationParams::Thumbnail { width, height } => size(*width, *height),
        OperationParams::Level(level) => Some(format!(
            "black {}%, white {}%, gamma {}",
            level.black_point, level.white_point, level.gamma
        )),
        OperationParams::Tile {
            num_tiles_width,
            num_tiles_height,
        } => Some(format!("{}x{}", num_tiles_width, num_tiles_height)),
        OperationParams::Merge { grid: Some((w, h)) } => Some(format!("{}x{}", w, h)),
        OperationParams::Merge { grid: None }
        | OperationParams::Sketch
        | OperationParams::Normalize
        | OperationParams::Charcoal => None,
    }
}

// ============================================================================
// Run output
// ============================================================================

/// Format a single pipeline progress event as display lines.
pub fn format_pipeline_event(event: &PipelineEvent) -> Vec<String> {
    match event {
        PipelineEvent::StepStarted {
            index,
            op,
            destination,
        } => vec![step_header(*index, op.name(), destination.as_deref())],
        PipelineEvent::ImageWritten { width, height, .. } => {
            vec![format!("    Size: {}x{}", width, height)]
        }
        PipelineEvent::TilesWritten { columns, rows } => {
            vec![format!("    Tiles: {}x{}", columns, rows)]
        }
        PipelineEvent::Uploaded { url, .. } => vec![format!("    Upload: {}", url)],
        PipelineEvent::UploadSkipped { file } => {
            vec![format!("    Upload: {} skipped", file)]
        }
        PipelineEvent::UploadFailed { file, error } => {
            vec![format!("    Upload: {} failed: {}", file, error)]
        }
    }
}

/// Closing line of a finished job.
pub fn format_job_summary(report: &JobReport, output_dir: &Path) -> String {
    let written = report.files().count();
    let mut line = format!(
        "Wrote {} to {}",
        plural(written, "file"),
        output_dir.display()
    );
    let failed = report.failed_uploads();
    if failed > 0 {
        line.push_str(&format!(" ({} failed)", plural(failed, "upload")));
    }
    line
}

pub fn print_job_summary(report: &JobReport, output_dir: &Path) {
    println!();
    println!("{}", format_job_summary(report, output_dir));
}

// ============================================================================
// Check output
// ============================================================================

/// Describe a validated job without running it.
pub fn format_check_output(job: &JobPayload, source: &Path) -> Vec<String> {
    let mut lines = vec![format!("Source: {}", source.display())];
    for (index, op) in job.operations.iter().enumerate() {
        let header = step_header(index, op.kind.name(), op.output_name());
        let header = match op_detail(op) {
            Some(detail) => format!("{} ({})", header, detail),
            None => header,
        };
        lines.push(header);
        if let Some(format) = op.format {
            lines.push(format!("    Format: {}", format.extension()));
        }
    }
    lines.push(match (&job.aws, job.disable_network) {
        (_, true) => "Uploads: disabled".to_string(),
        (Some(aws), false) => format!("Uploads: s3://{} ({})", aws.s3_bucket_name, aws.region),
        (None, false) => "Uploads: none".to_string(),
    });
    lines
}

pub fn print_check_output(job: &JobPayload, source: &Path) {
    for line in format_check_output(job, source) {
        println!("{}", line);
    }
}

// ============================================================================
// Batch output
// ============================================================================

/// One line per batch job: name plus its outcome.
pub fn format_batch_line(name: &str, outcome: Result<&JobReport, &str>) -> String {
    match outcome {
        Ok(report) => format!("{}: {}", name, plural(report.files().count(), "file")),
        Err(error) => format!("{}: failed: {}", name, error),
    }
}
