//! `helio-gpu` contains the GPU-side caching layer used by Helio.
//!
//! Rebuilding pipeline state or relinking program binaries costs milliseconds;
//! a renderer needs them back in microseconds once a configuration has been
//! seen. This crate provides:
//! - Centralized caching of WGSL shader modules and render pipelines, evicted
//!   by an age-based generational sweep (see [`pipeline_cache::PipelineCache`]).
//! - A best-effort persistent cache for linked program binaries backed by a
//!   platform blob store (see [`blob_cache::ProgramBinaryCache`]).

mod capabilities;
mod context;
mod error;
mod program;

pub mod blob_cache;
pub mod pipeline_cache;
pub mod pipeline_key;
pub mod stats;
pub mod store;

pub use capabilities::GpuCapabilities;
pub use context::GpuContext;
pub use error::GpuError;
