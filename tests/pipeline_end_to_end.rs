//! End-to-end job runs through the library API with the real image backend.
//!
//! Each test writes a synthetic JPEG source into a temp dir, runs a full job
//! with `disable_network`, and inspects the decoded outputs on disk.

use image::{ImageEncoder, ImageFormat, ImageReader, Rgb, RgbImage};
use imgpipe::config::RunConfig;
use imgpipe::job::{JobError, JobPayload};
use imgpipe::pipeline::{PipelineError, PipelineEvent, run_job};
use serde_json::json;
use std::path::Path;
use tempfile::TempDir;

fn create_test_jpeg(path: &Path, width: u32, height: u32) {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let file = std::fs::File::create(path).unwrap();
    image::codecs::jpeg::JpegEncoder::new(std::io::BufWriter::new(file))
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
}

fn dimensions(path: &Path) -> (u32, u32) {
    image::image_dimensions(path).unwrap()
}

fn format_of(path: &Path) -> ImageFormat {
    ImageReader::open(path)
        .unwrap()
        .with_guessed_format()
        .unwrap()
        .format()
        .unwrap()
}

fn offline_job(operations: serde_json::Value) -> JobPayload {
    JobPayload::from_json(
        &json!({
            "image_url": "https://example.com/photos/source.jpg?v=2",
            "operations": operations,
            "disable_network": true
        })
        .to_string(),
    )
    .unwrap()
}

struct Workspace {
    _tmp: TempDir,
    source_dir: std::path::PathBuf,
    output_dir: std::path::PathBuf,
}

fn workspace(width: u32, height: u32) -> Workspace {
    let tmp = TempDir::new().unwrap();
    let source_dir = tmp.path().join("src");
    std::fs::create_dir(&source_dir).unwrap();
    create_test_jpeg(&source_dir.join("source.jpg"), width, height);
    let output_dir = tmp.path().join("tmp_images");
    Workspace {
        _tmp: tmp,
        source_dir,
        output_dir,
    }
}

#[test]
fn every_operation_in_one_job() {
    let ws = workspace(120, 80);
    let job = offline_job(json!([
        {"op": "resize", "destination": "resized.jpg", "width": 60, "height": 30},
        {"op": "thumbnail", "destination": "thumb.jpg", "width": 50, "height": 50},
        {"op": "sketch", "destination": "sketch.png", "format": "png"},
        {"op": "normalize", "destination": "normalized.jpg"},
        {"op": "charcoal", "destination": "charcoal.webp"},
        {"op": "level", "destination": "level.tiff", "black_point": 10, "white_point": 90},
        {"op": "tile", "num_tiles_width": 3, "num_tiles_height": 2},
        {"op": "merge"}
    ]));

    let report = run_job(
        &job,
        &ws.source_dir,
        &ws.output_dir,
        &RunConfig::default(),
        None,
    )
    .unwrap();

    let out = &ws.output_dir;
    assert_eq!(dimensions(&out.join("resized.jpg")), (60, 30));
    assert_eq!(dimensions(&out.join("thumb.jpg")), (50, 50));
    assert_eq!(dimensions(&out.join("sketch.png")), (120, 80));
    assert_eq!(format_of(&out.join("sketch.png")), ImageFormat::Png);
    assert_eq!(dimensions(&out.join("normalized.jpg")), (120, 80));
    assert_eq!(format_of(&out.join("charcoal.webp")), ImageFormat::WebP);
    assert_eq!(format_of(&out.join("level.tiff")), ImageFormat::Tiff);

    for row in 0..2 {
        for column in 0..3 {
            let tile = out.join(format!("filename_{row}_{column}.jpg"));
            assert_eq!(dimensions(&tile), (40, 40), "{}", tile.display());
        }
    }
    assert_eq!(dimensions(&out.join("merged_file.jpg")), (120, 80));

    assert_eq!(report.steps.len(), 8);
    assert_eq!(report.files().count(), 6 + 6 + 1);
    assert_eq!(report.failed_uploads(), 0);
}

#[test]
fn format_override_beats_extension() {
    let ws = workspace(40, 40);
    let job = offline_job(json!([
        {"op": "normalize", "destination": "actually_png.jpg", "format": "png"}
    ]));

    run_job(&job, &ws.source_dir, &ws.output_dir, &RunConfig::default(), None).unwrap();

    assert_eq!(format_of(&ws.output_dir.join("actually_png.jpg")), ImageFormat::Png);
}

#[test]
fn destination_without_extension_keeps_source_encoding() {
    let ws = workspace(32, 24);
    let job = offline_job(json!([
        {"op": "resize", "destination": "small.jpg", "width": 16, "height": 12},
        {"op": "normalize", "destination": "normalized"},
        {"op": "sketch", "destination": "sketch.result"},
        {"op": "tile", "num_tiles_width": 2, "num_tiles_height": 2},
        {"op": "merge", "destination": "whole"}
    ]));

    let report = run_job(&job, &ws.source_dir, &ws.output_dir, &RunConfig::default(), None).unwrap();

    assert_eq!(report.steps.len(), 5);
    for name in ["normalized", "sketch.result", "whole"] {
        let path = ws.output_dir.join(name);
        assert_eq!(format_of(&path), ImageFormat::Jpeg, "{name}");
    }
    assert_eq!(dimensions(&ws.output_dir.join("normalized")), (32, 24));
    assert_eq!(dimensions(&ws.output_dir.join("whole")), (32, 24));
}

#[test]
fn tile_remainder_pixels_are_dropped_on_merge() {
    let ws = workspace(101, 77);
    let job = offline_job(json!([
        {"op": "tile", "num_tiles_width": 3, "num_tiles_height": 2},
        {"op": "merge", "destination": "whole.jpg"}
    ]));

    run_job(&job, &ws.source_dir, &ws.output_dir, &RunConfig::default(), None).unwrap();

    assert_eq!(dimensions(&ws.output_dir.join("filename_0_0.jpg")), (33, 38));
    assert_eq!(dimensions(&ws.output_dir.join("whole.jpg")), (99, 76));
}

#[test]
fn events_stream_while_running() {
    let ws = workspace(30, 30);
    let job = offline_job(json!([
        {"op": "resize", "destination": "a.jpg", "width": 10, "height": 10}
    ]));
    let (tx, rx) = std::sync::mpsc::channel();

    run_job(
        &job,
        &ws.source_dir,
        &ws.output_dir,
        &RunConfig::default(),
        Some(tx),
    )
    .unwrap();

    let events: Vec<PipelineEvent> = rx.iter().collect();
    assert!(matches!(events[0], PipelineEvent::StepStarted { index: 0, .. }));
    assert!(events.contains(&PipelineEvent::ImageWritten {
        file: "a.jpg".into(),
        width: 10,
        height: 10
    }));
    assert!(events.contains(&PipelineEvent::UploadSkipped {
        file: "a.jpg".into()
    }));
}

#[test]
fn missing_source_is_reported() {
    let tmp = TempDir::new().unwrap();
    let job = offline_job(json!([{"op": "sketch", "destination": "s.jpg"}]));

    let err = run_job(
        &job,
        tmp.path(),
        &tmp.path().join("out"),
        &RunConfig::default(),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::SourceNotFound(p) if p.ends_with("source.jpg")));
}

#[test]
fn bad_job_fails_before_anything_runs() {
    let err = JobPayload::from_json(
        &json!({
            "image_url": "source.jpg",
            "operations": [
                {"op": "resize", "destination": "a.jpg", "width": 10},
                {"op": "Sketch", "destination": "b.jpg"}
            ],
            "disable_network": true
        })
        .to_string(),
    )
    .unwrap_err();
    assert!(matches!(err, JobError::UnknownOperation(name) if name == "Sketch"));
}

#[cfg(unix)]
#[test]
fn outputs_are_world_read_write() {
    use std::os::unix::fs::PermissionsExt;

    let ws = workspace(20, 20);
    let job = offline_job(json!([
        {"op": "sketch", "destination": "s.jpg"},
        {"op": "tile", "num_tiles_width": 2, "num_tiles_height": 2}
    ]));

    let report = run_job(&job, &ws.source_dir, &ws.output_dir, &RunConfig::default(), None).unwrap();

    for file in report.files() {
        let mode = std::fs::metadata(ws.output_dir.join(file))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o666, 0o666, "{file}");
    }
}
