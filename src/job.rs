//! Job payload model.
//!
//! A job is one JSON document:
//!
//! ```json
//! {
//!   "image_url": "https://example.com/photos/in.jpg",
//!   "operations": [
//!     {"op": "resize", "destination": "small.jpg", "width": 100, "height": 50},
//!     {"op": "sketch", "destination": "sketch.png", "format": "png"},
//!     {"op": "tile", "num_tiles_width": 3, "num_tiles_height": 2},
//!     {"op": "merge"}
//!   ],
//!   "aws": {"region": "us-east-1", "access_key": "…", "secret_key": "…", "s3_bucket_name": "…"},
//!   "disable_network": false
//! }
//! ```
//!
//! Each raw [`OperationSpec`] is lowered into a typed [`Operation`] when the
//! payload is parsed. Unknown operation names, bad parameters and missing
//! destinations are rejected here, before any step runs.
//!
//! ## Operations
//!
//! | `op` | Parameters | Destination |
//! |---|---|---|
//! | `resize` | `width`, `height` (default: source size) | required |
//! | `thumbnail` | `width`, `height` (default: source size) | required |
//! | `sketch` | none | required |
//! | `normalize` | none | required |
//! | `charcoal` | none | required |
//! | `level` | `black_point` (0), `white_point` (100), `gamma` (1.0) | required |
//! | `tile` | `num_tiles_width`, `num_tiles_height` | ignored; tiles are `filename_{row}_{col}.jpg` |
//! | `merge` | `num_tiles_width`, `num_tiles_height` (optional after a `tile` step) | default `merged_file.jpg` |

use crate::imaging::{LevelParams, OutputFormat};
use crate::tiling::MERGED_FILENAME;
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::io::Read;
use std::path::{Component, Path};
use thiserror::Error;

/// Environment variable that may carry the job JSON.
pub const PAYLOAD_ENV_VAR: &str = "IMGPIPE_PAYLOAD";

#[derive(Error, Debug)]
pub enum JobError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unknown operation: {0:?}")]
    UnknownOperation(String),
    #[error("Operation {op} requires a destination")]
    MissingDestination { op: &'static str },
    #[error("Invalid parameter for {op}: {message}")]
    InvalidParameter { op: &'static str, message: String },
    #[error("Unsupported output format: {0:?}")]
    UnsupportedFormat(String),
    #[error("Network is enabled but the job has no aws section")]
    MissingAwsConfig,
    #[error("Empty job payload")]
    EmptyPayload,
}

/// Names every built-in operation answers to. Matching is exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperationKind {
    Resize,
    Thumbnail,
    Sketch,
    Normalize,
    Charcoal,
    Level,
    Tile,
    Merge,
}

impl OperationKind {
    pub const ALL: [OperationKind; 8] = [
        Self::Resize,
        Self::Thumbnail,
        Self::Sketch,
        Self::Normalize,
        Self::Charcoal,
        Self::Level,
        Self::Tile,
        Self::Merge,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Resize => "resize",
            Self::Thumbnail => "thumbnail",
            Self::Sketch => "sketch",
            Self::Normalize => "normalize",
            Self::Charcoal => "charcoal",
            Self::Level => "level",
            Self::Tile => "tile",
            Self::Merge => "merge",
        }
    }

    /// Exact, case-sensitive lookup.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Credentials and target bucket for uploads.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct AwsConfig {
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub s3_bucket_name: String,
}

// Keeps secrets out of logs and error output.
impl fmt::Debug for AwsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsConfig")
            .field("region", &self.region)
            .field("s3_bucket_name", &self.s3_bucket_name)
            .finish_non_exhaustive()
    }
}

/// One operation as written in the payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OperationSpec {
    pub op: String,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    /// Every other key: the operation-specific parameters.
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

/// Typed parameters, one variant per operation kind.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationParams {
    Resize {
        width: Option<u32>,
        height: Option<u32>,
    },
    Thumbnail {
        width: Option<u32>,
        height: Option<u32>,
    },
    Sketch,
    Normalize,
    Charcoal,
    Level(LevelParams),
    Tile {
        num_tiles_width: u32,
        num_tiles_height: u32,
    },
    Merge {
        grid: Option<(u32, u32)>,
    },
}

/// A validated pipeline step.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub kind: OperationKind,
    pub destination: Option<String>,
    pub format: Option<OutputFormat>,
    pub params: OperationParams,
}

/// Pixel and tile counts may arrive as `100` or `100.0`; anything with a
/// fractional part, a sign or out of `u32` range is rejected.
fn whole_number<E: de::Error>(value: f64) -> Result<u32, E> {
    if value.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(&value) {
        Ok(value as u32)
    } else {
        Err(E::custom(format!("expected a whole number, found {value}")))
    }
}

fn count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    whole_number(f64::deserialize(deserializer)?)
}

fn optional_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    Option::<f64>::deserialize(deserializer)?
        .map(whole_number)
        .transpose()
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SizeArgs {
    #[serde(default, deserialize_with = "optional_count")]
    width: Option<u32>,
    #[serde(default, deserialize_with = "optional_count")]
    height: Option<u32>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NoArgs {}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct LevelArgs {
    #[serde(default)]
    black_point: Option<f64>,
    #[serde(default)]
    white_point: Option<f64>,
    #[serde(default)]
    gamma: Option<f64>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TileArgs {
    #[serde(deserialize_with = "count")]
    num_tiles_width: u32,
    #[serde(deserialize_with = "count")]
    num_tiles_height: u32,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct MergeArgs {
    #[serde(default, deserialize_with = "optional_count")]
    num_tiles_width: Option<u32>,
    #[serde(default, deserialize_with = "optional_count")]
    num_tiles_height: Option<u32>,
}

fn parse_args<T: DeserializeOwned>(
    kind: OperationKind,
    params: &Map<String, Value>,
) -> Result<T, JobError> {
    serde_json::from_value(Value::Object(params.clone())).map_err(|e| JobError::InvalidParameter {
        op: kind.name(),
        message: e.to_string(),
    })
}

fn invalid(kind: OperationKind, message: impl Into<String>) -> JobError {
    JobError::InvalidParameter {
        op: kind.name(),
        message: message.into(),
    }
}

fn check_size(kind: OperationKind, args: &SizeArgs) -> Result<(), JobError> {
    if args.width == Some(0) || args.height == Some(0) {
        return Err(invalid(kind, "width and height must be positive"));
    }
    Ok(())
}

fn check_level(params: &LevelParams) -> Result<(), JobError> {
    let kind = OperationKind::Level;
    let in_range = |v: f64| (0.0..=100.0).contains(&v);
    if !in_range(params.black_point) || !in_range(params.white_point) {
        return Err(invalid(kind, "black_point and white_point are percentages (0-100)"));
    }
    if params.white_point <= params.black_point {
        return Err(invalid(kind, "white_point must be above black_point"));
    }
    if !(params.gamma.is_finite() && params.gamma > 0.0) {
        return Err(invalid(kind, "gamma must be positive"));
    }
    Ok(())
}

/// Destinations are plain relative file paths inside the output directory.
fn check_destination(kind: OperationKind, destination: &str) -> Result<(), JobError> {
    let path = Path::new(destination);
    let plain = !destination.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if !plain {
        return Err(invalid(
            kind,
            format!("destination {destination:?} must be a relative path without '..'"),
        ));
    }
    Ok(())
}

impl Operation {
    /// Lower a raw [`OperationSpec`] into a typed operation.
    pub fn from_spec(spec: &OperationSpec) -> Result<Self, JobError> {
        let kind = OperationKind::from_name(&spec.op)
            .ok_or_else(|| JobError::UnknownOperation(spec.op.clone()))?;

        let params = match kind {
            OperationKind::Resize => {
                let args: SizeArgs = parse_args(kind, &spec.params)?;
                check_size(kind, &args)?;
                OperationParams::Resize {
                    width: args.width,
                    height: args.height,
                }
            }
            OperationKind::Thumbnail => {
                let args: SizeArgs = parse_args(kind, &spec.params)?;
                check_size(kind, &args)?;
                OperationParams::Thumbnail {
                    width: args.width,
                    height: args.height,
                }
            }
            OperationKind::Sketch => {
                parse_args::<NoArgs>(kind, &spec.params)?;
                OperationParams::Sketch
            }
            OperationKind::Normalize => {
                parse_args::<NoArgs>(kind, &spec.params)?;
                OperationParams::Normalize
            }
            OperationKind::Charcoal => {
                parse_args::<NoArgs>(kind, &spec.params)?;
                OperationParams::Charcoal
            }
            OperationKind::Level => {
                let args: LevelArgs = parse_args(kind, &spec.params)?;
                let defaults = LevelParams::default();
                let level = LevelParams {
                    black_point: args.black_point.unwrap_or(defaults.black_point),
                    white_point: args.white_point.unwrap_or(defaults.white_point),
                    gamma: args.gamma.unwrap_or(defaults.gamma),
                };
                check_level(&level)?;
                OperationParams::Level(level)
            }
            OperationKind::Tile => {
                let args: TileArgs = parse_args(kind, &spec.params)?;
                if args.num_tiles_width == 0 || args.num_tiles_height == 0 {
                    return Err(invalid(kind, "tile counts must be positive"));
                }
                OperationParams::Tile {
                    num_tiles_width: args.num_tiles_width,
                    num_tiles_height: args.num_tiles_height,
                }
            }
            OperationKind::Merge => {
                let args: MergeArgs = parse_args(kind, &spec.params)?;
                let grid = match (args.num_tiles_width, args.num_tiles_height) {
                    (Some(0), _) | (_, Some(0)) => {
                        return Err(invalid(kind, "tile counts must be positive"));
                    }
                    (Some(w), Some(h)) => Some((w, h)),
                    (None, None) => None,
                    _ => {
                        return Err(invalid(
                            kind,
                            "num_tiles_width and num_tiles_height go together",
                        ));
                    }
                };
                OperationParams::Merge { grid }
            }
        };

        let destination = match (kind, &spec.destination) {
            (OperationKind::Tile, _) => None,
            (OperationKind::Merge, None) => Some(MERGED_FILENAME.to_string()),
            (_, None) => return Err(JobError::MissingDestination { op: kind.name() }),
            (_, Some(dest)) => Some(dest.clone()),
        };
        if let Some(dest) = &destination {
            check_destination(kind, dest)?;
        }

        let format = spec
            .format
            .as_deref()
            .map(|f| OutputFormat::parse(f).ok_or_else(|| JobError::UnsupportedFormat(f.to_string())))
            .transpose()?;

        Ok(Self {
            kind,
            destination,
            format,
            params,
        })
    }

    /// File this step writes, relative to the output directory.
    ///
    /// `None` for steps that write several files of their own (tiling).
    pub fn output_name(&self) -> Option<&str> {
        self.destination.as_deref()
    }
}

#[derive(Debug, Deserialize)]
struct RawPayload {
    image_url: String,
    #[serde(default)]
    operations: Vec<OperationSpec>,
    #[serde(default)]
    aws: Option<AwsConfig>,
    #[serde(default)]
    disable_network: bool,
}

/// A parsed, validated job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobPayload {
    pub image_url: String,
    pub operations: Vec<Operation>,
    pub aws: Option<AwsConfig>,
    pub disable_network: bool,
}

impl JobPayload {
    /// Parse and validate a job document.
    ///
    /// Every operation is lowered before this returns, so one bad step fails
    /// the whole job up front.
    pub fn from_json(text: &str) -> Result<Self, JobError> {
        if text.trim().is_empty() {
            return Err(JobError::EmptyPayload);
        }
        let raw: RawPayload = serde_json::from_str(text)?;

        let mut operations = Vec::with_capacity(raw.operations.len());
        let mut tiled = false;
        for spec in &raw.operations {
            let op = Operation::from_spec(spec)?;
            match op.params {
                OperationParams::Tile { .. } => tiled = true,
                OperationParams::Merge { grid: None } if !tiled => {
                    return Err(invalid(
                        OperationKind::Merge,
                        "num_tiles_width and num_tiles_height are required without an earlier tile step",
                    ));
                }
                _ => {}
            }
            operations.push(op);
        }

        if !raw.disable_network && raw.aws.is_none() && !operations.is_empty() {
            return Err(JobError::MissingAwsConfig);
        }

        Ok(Self {
            image_url: raw.image_url,
            operations,
            aws: raw.aws,
            disable_network: raw.disable_network,
        })
    }

    /// Local filename of the source image: the last path segment of
    /// `image_url`, without query string or fragment.
    pub fn source_filename(&self) -> &str {
        let without_query = self
            .image_url
            .split(['?', '#'])
            .next()
            .unwrap_or(&self.image_url);
        without_query
            .rsplit('/')
            .next()
            .unwrap_or(without_query)
    }
}

/// Read the job text from, in order: an explicit file, the
/// [`PAYLOAD_ENV_VAR`] value, or `stdin` read to completion.
pub fn load_payload_text(
    file: Option<&Path>,
    env_value: Option<String>,
    mut stdin: impl Read,
) -> Result<String, JobError> {
    if let Some(path) = file {
        return Ok(std::fs::read_to_string(path)?);
    }
    if let Some(text) = env_value.filter(|v| !v.trim().is_empty()) {
        return Ok(text);
    }
    let mut text = String::new();
    stdin.read_to_string(&mut text)?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(value: Value) -> OperationSpec {
        serde_json::from_value(value).unwrap()
    }

    fn offline_job(operations: Value) -> Result<JobPayload, JobError> {
        JobPayload::from_json(
            &json!({
                "image_url": "in.jpg",
                "operations": operations,
                "disable_network": true
            })
            .to_string(),
        )
    }

    // =========================================================================
    // Operation kinds
    // =========================================================================

    #[test]
    fn kind_lookup_is_total_for_builtins() {
        for kind in OperationKind::ALL {
            assert_eq!(OperationKind::from_name(kind.name()), Some(kind));
        }
    }

    #[test]
    fn kind_lookup_is_exact() {
        assert_eq!(OperationKind::from_name("Resize"), None);
        assert_eq!(OperationKind::from_name("RESIZE"), None);
        assert_eq!(OperationKind::from_name(" resize"), None);
        assert_eq!(OperationKind::from_name(""), None);
        assert_eq!(OperationKind::from_name("blur"), None);
    }

    // =========================================================================
    // Operation lowering
    // =========================================================================

    #[test]
    fn resize_with_dimensions() {
        let op = Operation::from_spec(&spec(json!({
            "op": "resize", "destination": "out.jpg", "width": 100, "height": 50
        })))
        .unwrap();
        assert_eq!(op.kind, OperationKind::Resize);
        assert_eq!(op.output_name(), Some("out.jpg"));
        assert_eq!(
            op.params,
            OperationParams::Resize {
                width: Some(100),
                height: Some(50)
            }
        );
    }

    #[test]
    fn resize_without_dimensions_defers_to_source() {
        let op = Operation::from_spec(&spec(json!({"op": "resize", "destination": "o.jpg"})))
            .unwrap();
        assert_eq!(
            op.params,
            OperationParams::Resize {
                width: None,
                height: None
            }
        );
    }

    #[test]
    fn resize_zero_width_rejected() {
        let err = Operation::from_spec(&spec(json!({
            "op": "resize", "destination": "o.jpg", "width": 0
        })))
        .unwrap_err();
        assert!(matches!(err, JobError::InvalidParameter { op: "resize", .. }));
    }

    #[test]
    fn whole_number_floats_accepted_as_counts() {
        let op = Operation::from_spec(&spec(json!({
            "op": "resize", "destination": "o.jpg", "width": 100.0, "height": 50
        })))
        .unwrap();
        assert_eq!(
            op.params,
            OperationParams::Resize {
                width: Some(100),
                height: Some(50)
            }
        );

        let op = Operation::from_spec(&spec(json!({
            "op": "tile", "num_tiles_width": 3.0, "num_tiles_height": 2.0
        })))
        .unwrap();
        assert_eq!(
            op.params,
            OperationParams::Tile {
                num_tiles_width: 3,
                num_tiles_height: 2
            }
        );

        let op = Operation::from_spec(&spec(json!({
            "op": "merge", "num_tiles_width": 2.0, "num_tiles_height": null
        })));
        assert!(matches!(op, Err(JobError::InvalidParameter { op: "merge", .. })));
    }

    #[test]
    fn fractional_or_negative_counts_rejected() {
        for bad in [
            json!({"op": "resize", "destination": "o.jpg", "width": 100.5}),
            json!({"op": "thumbnail", "destination": "o.jpg", "height": -4}),
            json!({"op": "tile", "num_tiles_width": 2, "num_tiles_height": 1e12}),
            json!({"op": "resize", "destination": "o.jpg", "width": "100"}),
        ] {
            assert!(
                matches!(
                    Operation::from_spec(&spec(bad.clone())),
                    Err(JobError::InvalidParameter { .. })
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn unknown_parameter_rejected() {
        let err = Operation::from_spec(&spec(json!({
            "op": "sketch", "destination": "s.jpg", "radius": 3
        })))
        .unwrap_err();
        assert!(matches!(err, JobError::InvalidParameter { op: "sketch", .. }));
    }

    #[test]
    fn unknown_operation_rejected() {
        let err = Operation::from_spec(&spec(json!({"op": "Resize", "destination": "o.jpg"})))
            .unwrap_err();
        assert!(matches!(err, JobError::UnknownOperation(name) if name == "Resize"));
    }

    #[test]
    fn missing_destination_rejected() {
        let err = Operation::from_spec(&spec(json!({"op": "normalize"}))).unwrap_err();
        assert!(matches!(err, JobError::MissingDestination { op: "normalize" }));
    }

    #[test]
    fn escaping_destination_rejected() {
        for dest in ["../out.jpg", "/tmp/out.jpg", ""] {
            let err = Operation::from_spec(&spec(json!({"op": "normalize", "destination": dest})))
                .unwrap_err();
            assert!(
                matches!(err, JobError::InvalidParameter { .. }),
                "{dest:?} should be rejected"
            );
        }
    }

    #[test]
    fn format_is_parsed() {
        let op = Operation::from_spec(&spec(json!({
            "op": "charcoal", "destination": "c.out", "format": "PNG"
        })))
        .unwrap();
        assert_eq!(op.format, Some(OutputFormat::Png));

        let err = Operation::from_spec(&spec(json!({
            "op": "charcoal", "destination": "c.out", "format": "heic"
        })))
        .unwrap_err();
        assert!(matches!(err, JobError::UnsupportedFormat(f) if f == "heic"));
    }

    #[test]
    fn level_defaults_and_validation() {
        let op = Operation::from_spec(&spec(json!({
            "op": "level", "destination": "l.jpg", "black_point": 10, "gamma": 1.5
        })))
        .unwrap();
        assert_eq!(
            op.params,
            OperationParams::Level(LevelParams {
                black_point: 10.0,
                white_point: 100.0,
                gamma: 1.5
            })
        );

        for bad in [
            json!({"op": "level", "destination": "l.jpg", "black_point": 60, "white_point": 40}),
            json!({"op": "level", "destination": "l.jpg", "gamma": 0}),
            json!({"op": "level", "destination": "l.jpg", "white_point": 120}),
        ] {
            assert!(matches!(
                Operation::from_spec(&spec(bad)),
                Err(JobError::InvalidParameter { op: "level", .. })
            ));
        }
    }

    #[test]
    fn tile_needs_positive_counts_and_no_destination() {
        let op = Operation::from_spec(&spec(json!({
            "op": "tile", "num_tiles_width": 3, "num_tiles_height": 2, "destination": "ignored.jpg"
        })))
        .unwrap();
        assert_eq!(op.output_name(), None);

        let err = Operation::from_spec(&spec(json!({
            "op": "tile", "num_tiles_width": 0, "num_tiles_height": 2
        })))
        .unwrap_err();
        assert!(matches!(err, JobError::InvalidParameter { op: "tile", .. }));

        let err = Operation::from_spec(&spec(json!({"op": "tile", "num_tiles_width": 2})))
            .unwrap_err();
        assert!(matches!(err, JobError::InvalidParameter { op: "tile", .. }));
    }

    #[test]
    fn merge_defaults_destination() {
        let op = Operation::from_spec(&spec(json!({
            "op": "merge", "num_tiles_width": 2, "num_tiles_height": 2
        })))
        .unwrap();
        assert_eq!(op.output_name(), Some("merged_file.jpg"));
        assert_eq!(op.params, OperationParams::Merge { grid: Some((2, 2)) });
    }

    #[test]
    fn merge_half_grid_rejected() {
        let err = Operation::from_spec(&spec(json!({"op": "merge", "num_tiles_width": 2})))
            .unwrap_err();
        assert!(matches!(err, JobError::InvalidParameter { op: "merge", .. }));
    }

    // =========================================================================
    // Payload parsing
    // =========================================================================

    #[test]
    fn parse_offline_resize_job() {
        let job = offline_job(json!([
            {"op": "resize", "destination": "out.jpg", "width": 100, "height": 50}
        ]))
        .unwrap();
        assert_eq!(job.image_url, "in.jpg");
        assert!(job.disable_network);
        assert!(job.aws.is_none());
        assert_eq!(job.operations.len(), 1);
    }

    #[test]
    fn parse_fails_on_any_unknown_operation() {
        let err = offline_job(json!([
            {"op": "resize", "destination": "a.jpg"},
            {"op": "explode", "destination": "b.jpg"},
            {"op": "sketch", "destination": "c.jpg"}
        ]))
        .unwrap_err();
        assert!(matches!(err, JobError::UnknownOperation(name) if name == "explode"));
    }

    #[test]
    fn merge_without_grid_needs_prior_tile() {
        assert!(offline_job(json!([{"op": "merge"}])).is_err());
        assert!(
            offline_job(json!([
                {"op": "tile", "num_tiles_width": 2, "num_tiles_height": 2},
                {"op": "merge"}
            ]))
            .is_ok()
        );
    }

    #[test]
    fn network_job_requires_aws() {
        let err = JobPayload::from_json(
            &json!({
                "image_url": "in.jpg",
                "operations": [{"op": "normalize", "destination": "n.jpg"}]
            })
            .to_string(),
        )
        .unwrap_err();
        assert!(matches!(err, JobError::MissingAwsConfig));
    }

    #[test]
    fn parse_aws_section() {
        let job = JobPayload::from_json(
            &json!({
                "image_url": "https://example.com/a/b/photo.jpg",
                "operations": [{"op": "normalize", "destination": "n.jpg"}],
                "aws": {
                    "region": "eu-west-1",
                    "access_key": "AKIA",
                    "secret_key": "shh",
                    "s3_bucket_name": "bucket"
                }
            })
            .to_string(),
        )
        .unwrap();
        let aws = job.aws.as_ref().unwrap();
        assert_eq!(aws.region, "eu-west-1");
        assert_eq!(aws.s3_bucket_name, "bucket");
        assert!(!format!("{aws:?}").contains("shh"));
    }

    #[test]
    fn empty_and_malformed_payloads() {
        assert!(matches!(JobPayload::from_json("  \n"), Err(JobError::EmptyPayload)));
        assert!(matches!(JobPayload::from_json("{"), Err(JobError::Json(_))));
        assert!(matches!(
            JobPayload::from_json(r#"{"operations": []}"#),
            Err(JobError::Json(_))
        ));
    }

    #[test]
    fn source_filename_is_last_segment() {
        let mut job = offline_job(json!([])).unwrap();
        assert_eq!(job.source_filename(), "in.jpg");

        job.image_url = "https://cdn.example.com/img/cat.png?size=large#top".into();
        assert_eq!(job.source_filename(), "cat.png");
    }

    // =========================================================================
    // Payload acquisition
    // =========================================================================

    #[test]
    fn load_prefers_file_then_env_then_stdin() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("job.json");
        std::fs::write(&path, "from-file").unwrap();

        let text =
            load_payload_text(Some(path.as_path()), Some("from-env".into()), "from-stdin".as_bytes())
                .unwrap();
        assert_eq!(text, "from-file");

        let text = load_payload_text(None, Some("from-env".into()), "from-stdin".as_bytes())
            .unwrap();
        assert_eq!(text, "from-env");

        let text = load_payload_text(None, Some("   ".into()), "from-stdin".as_bytes()).unwrap();
        assert_eq!(text, "from-stdin");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let result = load_payload_text(Some(Path::new("/nonexistent/job.json")), None, std::io::empty());
        assert!(matches!(result, Err(JobError::Io(_))));
    }
}
