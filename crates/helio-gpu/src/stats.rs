//! Counter snapshots, suitable for profiling/telemetry.
//!
//! These are plain copies taken on the render thread; forwarding them
//! elsewhere is the caller's concern.

/// Snapshot of [`crate::pipeline_cache::PipelineCache`] counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineCacheStats {
    pub shader_module_hits: u64,
    pub shader_module_misses: u64,
    pub shader_module_evictions: u64,
    pub shader_modules: u64,

    pub render_pipeline_hits: u64,
    pub render_pipeline_misses: u64,
    pub render_pipeline_evictions: u64,
    pub render_pipelines: u64,
}

/// Snapshot of [`crate::blob_cache::ProgramBinaryCache`] counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProgramBinaryCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    /// Retrieved blobs that failed post-load validation (typically after a
    /// driver update) and forced a fallback to source compilation.
    pub stale_binaries: u64,
    /// Caching is unavailable on this driver/platform combination.
    pub disabled: bool,
}
