//! Centralized caching of WGSL shader modules and render pipelines.
//!
//! Pipeline construction is a driver-synchronous, millisecond-scale call; a
//! renderer asks for the same configurations every frame. The cache maps a
//! [`RenderPipelineKey`] to the previously built `wgpu::RenderPipeline` and
//! hands back a live reference in microseconds. [`PipelineCache::collect`]
//! bounds memory with an age-based generational sweep.
//!
//! All state is owned by the render thread: the cache performs no locking and
//! expects external serialization. Two racing misses for one key on separate
//! caches would only duplicate construction work, since the objects are a
//! deterministic function of the key.

use std::collections::HashMap;
use std::time::Duration;

use tracing::warn;

use crate::pipeline_key::{RenderPipelineKey, ShaderModuleId, ShaderStage, SpecConstantValue};
use crate::program;
use crate::stats::PipelineCacheStats;
use crate::store::GenerationalStore;
use crate::{GpuCapabilities, GpuError};

/// Entries untouched for more than this many generations are evicted; at one
/// `collect()` per frame this is roughly half a second of frames.
pub const DEFAULT_MAX_AGE: u64 = 30;

pub const DEFAULT_SHADER_DIAGNOSTICS_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Debug)]
pub struct PipelineCacheConfig {
    /// Generations an entry may go untouched before a sweep evicts it.
    pub max_age: u64,
    /// Deadline for the asynchronous shader compilation diagnostics wait.
    pub shader_diagnostics_timeout: Duration,
}

impl Default for PipelineCacheConfig {
    fn default() -> Self {
        Self {
            max_age: DEFAULT_MAX_AGE,
            shader_diagnostics_timeout: DEFAULT_SHADER_DIAGNOSTICS_TIMEOUT,
        }
    }
}

/// Shader modules resolved from the key's [`ShaderModuleId`]s, handed to the
/// pipeline constructor.
#[derive(Clone, Copy)]
pub struct ResolvedShaders<'a> {
    pub vertex: Option<&'a wgpu::ShaderModule>,
    pub fragment: Option<&'a wgpu::ShaderModule>,
}

pub struct PipelineCache {
    config: PipelineCacheConfig,
    capabilities: GpuCapabilities,
    shader_modules: GenerationalStore<ShaderModuleId, wgpu::ShaderModule>,
    render_pipelines: GenerationalStore<RenderPipelineKey, wgpu::RenderPipeline>,
}

impl PipelineCache {
    pub fn new(config: PipelineCacheConfig, capabilities: GpuCapabilities) -> Self {
        Self {
            shader_modules: GenerationalStore::new(config.max_age),
            render_pipelines: GenerationalStore::new(config.max_age),
            config,
            capabilities,
        }
    }

    /// Compile `source` once per distinct content and return its identity for
    /// use in [`RenderPipelineKey`]s, plus the live module.
    pub fn get_or_create_shader_module(
        &mut self,
        device: &wgpu::Device,
        stage: ShaderStage,
        source: &str,
        label: Option<&str>,
    ) -> (ShaderModuleId, &wgpu::ShaderModule) {
        let id = shader_module_id(stage, source);
        let timeout = self.config.shader_diagnostics_timeout;
        let module = self.shader_modules.get_or_create(id, |_| {
            let fallback;
            let label = match label {
                Some(label) => label,
                None => {
                    fallback = format!("helio {} shader {id:016x}", stage.as_str());
                    &fallback
                }
            };
            program::create_shader_module(device, label, source, timeout)
        });
        (id, module)
    }

    /// Look up `key`; on a miss, invoke `create` synchronously and insert the
    /// result.
    ///
    /// Once inserted, a key → pipeline mapping is never replaced. A `None`
    /// from the constructor is reported as [`GpuError::PipelineConstruction`]
    /// without occupying the slot, so the next call for the same key misses
    /// again; the cache itself never retries. Keys requesting features the
    /// device cannot express are rejected before the constructor runs.
    ///
    /// The returned reference is live until the next `&mut self` call on the
    /// cache, in particular until the next [`PipelineCache::collect`].
    pub fn get_or_create_render_pipeline<F>(
        &mut self,
        device: &wgpu::Device,
        key: RenderPipelineKey,
        create: F,
    ) -> Result<&wgpu::RenderPipeline, GpuError>
    where
        F: FnOnce(&wgpu::Device, ResolvedShaders<'_>, &RenderPipelineKey) -> Option<wgpu::RenderPipeline>,
    {
        if key.unclipped_depth && !self.capabilities.supports_unclipped_depth {
            return Err(GpuError::Unsupported("unclipped depth"));
        }
        if key.color_target_count > self.capabilities.max_color_targets {
            return Err(GpuError::Unsupported("color target count"));
        }

        let Self {
            shader_modules,
            render_pipelines,
            ..
        } = self;
        render_pipelines
            .try_get_or_create(key, |key| {
                // Pipelines built this generation keep their modules warm.
                for id in [key.vertex_shader, key.fragment_shader].into_iter().flatten() {
                    shader_modules.touch(&id);
                }
                let vertex = key.vertex_shader.and_then(|id| shader_modules.peek(&id));
                let fragment = key
                    .fragment_shader
                    .and_then(|id| shader_modules.peek(&id));
                let pipeline = create(device, ResolvedShaders { vertex, fragment }, key);
                if pipeline.is_none() {
                    warn!(
                        vertex_shader = ?key.vertex_shader,
                        fragment_shader = ?key.fragment_shader,
                        "failed to create render pipeline"
                    );
                }
                pipeline
            })
            .ok_or(GpuError::PipelineConstruction)
    }

    /// Advance the generation and evict entries unused for longer than the
    /// configured age limit. Call once per frame or every few frames; the
    /// cache never collects implicitly.
    pub fn collect(&mut self) {
        self.shader_modules.collect();
        self.render_pipelines.collect();
    }

    /// Drop every cached object unconditionally (teardown, device loss).
    pub fn clear(&mut self) {
        self.shader_modules.clear();
        self.render_pipelines.clear();
    }

    pub fn generation(&self) -> u64 {
        self.render_pipelines.generation()
    }

    pub fn stats(&self) -> PipelineCacheStats {
        let shader_modules = self.shader_modules.stats();
        let render_pipelines = self.render_pipelines.stats();
        PipelineCacheStats {
            shader_module_hits: shader_modules.hits,
            shader_module_misses: shader_modules.misses,
            shader_module_evictions: shader_modules.evictions,
            shader_modules: shader_modules.entries as u64,
            render_pipeline_hits: render_pipelines.hits,
            render_pipeline_misses: render_pipelines.misses,
            render_pipeline_evictions: render_pipelines.evictions,
            render_pipelines: render_pipelines.entries as u64,
        }
    }
}

/// Identity of a shader module: the first 64 bits of a BLAKE3 hash over the
/// stage and the WGSL source.
pub fn shader_module_id(stage: ShaderStage, source: &str) -> ShaderModuleId {
    let stage_tag: u8 = match stage {
        ShaderStage::Vertex => 0,
        ShaderStage::Fragment => 1,
    };
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[stage_tag]);
    hasher.update(source.as_bytes());
    let hash = hasher.finalize();
    let mut id = [0u8; 8];
    id.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(id)
}

/// Translate a [`RenderPipelineKey`] into a `wgpu::RenderPipelineDescriptor`
/// and build the pipeline. Suitable as the constructor body for
/// [`PipelineCache::get_or_create_render_pipeline`]; callers with exotic
/// requirements can supply their own.
///
/// Entry points are named `main` in each stage's module. The key's single
/// blend/format pair is replicated across all color targets, and depth state
/// is emitted iff the key carries a depth format. Specialization constants are
/// forwarded to both stages through wgpu's pipeline override mechanism.
pub fn build_render_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    key: &RenderPipelineKey,
    shaders: ResolvedShaders<'_>,
    label: Option<&str>,
) -> Option<wgpu::RenderPipeline> {
    let Some(vertex_module) = shaders.vertex else {
        warn!("cannot build a render pipeline without a vertex shader module");
        return None;
    };

    let mut constants = HashMap::with_capacity(key.constants.len());
    for constant in &key.constants {
        let value = match constant.value {
            SpecConstantValue::Int(v) => v as f64,
            SpecConstantValue::Float(v) => v as f64,
            SpecConstantValue::Bool(v) => {
                if v {
                    1.0
                } else {
                    0.0
                }
            }
        };
        constants.insert(constant.name.clone(), value);
    }

    let vertex_attributes: Vec<Vec<wgpu::VertexAttribute>> = key
        .vertex_buffers
        .iter()
        .map(|buffer| {
            buffer
                .attributes
                .iter()
                .map(|attribute| wgpu::VertexAttribute {
                    format: attribute.format,
                    offset: attribute.offset,
                    shader_location: attribute.shader_location,
                })
                .collect()
        })
        .collect();
    let vertex_buffers: Vec<wgpu::VertexBufferLayout> = key
        .vertex_buffers
        .iter()
        .zip(&vertex_attributes)
        .map(|(buffer, attributes)| wgpu::VertexBufferLayout {
            array_stride: buffer.array_stride,
            step_mode: buffer.step_mode,
            attributes,
        })
        .collect();

    if shaders.fragment.is_some() && key.color_format.is_none() {
        warn!("render pipeline key has a fragment shader but no color target format");
        return None;
    }

    let blend = key.blend_enable.then_some(wgpu::BlendState {
        color: key.blend_color,
        alpha: key.blend_alpha,
    });
    let fragment_targets: Vec<Option<wgpu::ColorTargetState>> = match key.color_format {
        Some(color_format) if shaders.fragment.is_some() => (0..key.color_target_count)
            .map(|_| {
                Some(wgpu::ColorTargetState {
                    format: color_format,
                    blend,
                    write_mask: key.color_write_mask,
                })
            })
            .collect(),
        _ => Vec::new(),
    };
    let fragment = shaders.fragment.map(|module| wgpu::FragmentState {
        module,
        entry_point: "main",
        targets: &fragment_targets,
        compilation_options: wgpu::PipelineCompilationOptions {
            constants: &constants,
            ..Default::default()
        },
    });

    let depth_stencil = key.depth_format.map(|format| wgpu::DepthStencilState {
        format,
        depth_write_enabled: key.depth_write_enabled,
        depth_compare: key.depth_compare,
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState {
            constant: key.depth_bias,
            slope_scale: key.depth_bias_slope_scale,
            clamp: 0.0,
        },
    });

    Some(device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label,
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: vertex_module,
            entry_point: "main",
            buffers: &vertex_buffers,
            compilation_options: wgpu::PipelineCompilationOptions {
                constants: &constants,
                ..Default::default()
            },
        },
        fragment,
        primitive: wgpu::PrimitiveState {
            topology: key.topology,
            strip_index_format: None,
            front_face: key.front_face,
            cull_mode: key.cull_mode,
            unclipped_depth: key.unclipped_depth,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
        },
        depth_stencil,
        multisample: wgpu::MultisampleState {
            count: key.sample_count,
            mask: !0,
            alpha_to_coverage_enabled: key.alpha_to_coverage,
        },
        multiview: None,
    }))
}
