//! Default configuration constants for facecue.
//!
//! Shared by `config`, the worker host and the pipeline so that the same
//! numbers are used everywhere a value is not configured explicitly.

/// Expected milliseconds between classifications on the GPU (`webgl`) backend.
pub const WEBGL_INTERVAL_MS: u64 = 1000;

/// Expected milliseconds between classifications on the `cpu` backend.
///
/// CPU inference is much slower, so the worker paces itself further apart.
pub const CPU_INTERVAL_MS: u64 = 6000;

/// Wire value for a detection interval that has not been resolved yet.
pub const UNRESOLVED_INTERVAL: i64 = -1;

/// Period of the webhook delivery tick in milliseconds.
pub const WEBHOOK_TICK_MS: u64 = 15000;

/// Path appended to the webhook base URL when posting expression batches.
pub const WEBHOOK_PATH: &str = "/emotions";

/// Default base URL the worker loads its classification models from.
///
/// Empty means "relative to wherever the worker was loaded from".
pub const DEFAULT_MODELS_URL: &str = "";

/// Expression labels the classifier is known to produce.
///
/// Totals are seeded with these at zero; unknown labels are still accepted.
pub const KNOWN_EXPRESSIONS: [&str; 7] = [
    "happy",
    "neutral",
    "surprised",
    "angry",
    "fearful",
    "disgusted",
    "sad",
];

/// Backend name reported by GPU-accelerated classifiers.
pub const BACKEND_WEBGL: &str = "webgl";

/// Backend name reported by CPU classifiers.
pub const BACKEND_CPU: &str = "cpu";
