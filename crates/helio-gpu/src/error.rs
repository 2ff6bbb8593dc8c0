use thiserror::Error;

/// Errors surfaced by the caching layer.
///
/// Expected, common-case failures (caching unsupported on this driver/platform,
/// best-effort insertion failures, stale persisted binaries) are not errors;
/// those paths degrade to "construct from scratch" and report through
/// `Option`/stats instead.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GpuError {
    /// The pipeline key requests a feature this device cannot express.
    #[error("{0} is not supported by this device")]
    Unsupported(&'static str),

    /// The pipeline constructor did not produce an object.
    #[error("render pipeline construction failed")]
    PipelineConstruction,
}
