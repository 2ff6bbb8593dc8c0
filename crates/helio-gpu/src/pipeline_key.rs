//! Identity of a render pipeline: every input that determines the immutable
//! `wgpu::RenderPipeline` object, gathered into one hashable key.
//!
//! Equality and hashing are written by hand, field-exhaustively: both impls
//! destructure `Self`, so adding a field without teaching both about it fails
//! to compile. The hash must be a pure function of exactly the data equality
//! examines. Hashing data equality ignores merely raises collision rates,
//! but skipping a compared field would produce false cache hits.

use std::hash::{Hash, Hasher};

/// Identity of a cached shader module, derived from a BLAKE3 content hash of
/// the WGSL source and stage by
/// [`crate::pipeline_cache::PipelineCache::get_or_create_shader_module`].
pub type ShaderModuleId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
        }
    }
}

/// One vertex attribute within a buffer layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexAttributeKey {
    pub format: wgpu::VertexFormat,
    pub offset: u64,
    pub shader_location: u32,
}

/// Per-buffer vertex layout record owning its attribute sub-range.
///
/// The Vec length is the active count: spare capacity never participates in
/// identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VertexBufferLayoutKey {
    pub array_stride: u64,
    pub step_mode: wgpu::VertexStepMode,
    pub attributes: Vec<VertexAttributeKey>,
}

/// A named scalar specialization constant bound at pipeline creation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SpecConstant {
    pub name: String,
    pub value: SpecConstantValue,
}

/// The closed set of scalar kinds a specialization constant can hold.
#[derive(Clone, Copy, Debug)]
pub enum SpecConstantValue {
    Int(i32),
    Float(f32),
    Bool(bool),
}

impl PartialEq for SpecConstantValue {
    fn eq(&self, other: &Self) -> bool {
        match (*self, *other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(_), _) | (Self::Float(_), _) | (Self::Bool(_), _) => false,
        }
    }
}

impl Eq for SpecConstantValue {}

impl Hash for SpecConstantValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match *self {
            Self::Int(v) => {
                state.write_u8(0);
                v.hash(state);
            }
            Self::Float(v) => {
                state.write_u8(1);
                v.to_bits().hash(state);
            }
            Self::Bool(v) => {
                state.write_u8(2);
                v.hash(state);
            }
        }
    }
}

/// Opaque identity of a pipeline layout: the hashes of its bind group layouts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PipelineLayoutKey {
    pub bind_group_layout_hashes: Vec<u64>,
}

impl PipelineLayoutKey {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// All currently bound state that forms an immutable render pipeline.
///
/// Two keys are equal iff every channel compares equal element-by-element,
/// including only the active elements of the variable-length lists. Float
/// channels compare and hash by bit pattern so the two stay consistent.
#[derive(Clone, Debug)]
pub struct RenderPipelineKey {
    pub vertex_shader: Option<ShaderModuleId>,
    pub fragment_shader: Option<ShaderModuleId>,
    pub vertex_buffers: Vec<VertexBufferLayoutKey>,
    pub constants: Vec<SpecConstant>,
    pub topology: wgpu::PrimitiveTopology,
    pub cull_mode: Option<wgpu::Face>,
    pub front_face: wgpu::FrontFace,
    pub blend_enable: bool,
    pub blend_color: wgpu::BlendComponent,
    pub blend_alpha: wgpu::BlendComponent,
    pub color_write_mask: wgpu::ColorWrites,
    pub sample_count: u32,
    pub alpha_to_coverage: bool,
    pub depth_write_enabled: bool,
    pub depth_compare: wgpu::CompareFunction,
    pub depth_bias: i32,
    pub depth_bias_slope_scale: f32,
    pub unclipped_depth: bool,
    pub color_format: Option<wgpu::TextureFormat>,
    pub depth_format: Option<wgpu::TextureFormat>,
    pub color_target_count: u32,
    pub layout: PipelineLayoutKey,
}

impl Default for RenderPipelineKey {
    fn default() -> Self {
        Self {
            vertex_shader: None,
            fragment_shader: None,
            vertex_buffers: Vec::new(),
            constants: Vec::new(),
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            front_face: wgpu::FrontFace::Ccw,
            blend_enable: false,
            blend_color: wgpu::BlendComponent::REPLACE,
            blend_alpha: wgpu::BlendComponent::REPLACE,
            color_write_mask: wgpu::ColorWrites::ALL,
            sample_count: 1,
            alpha_to_coverage: false,
            depth_write_enabled: false,
            depth_compare: wgpu::CompareFunction::Always,
            depth_bias: 0,
            depth_bias_slope_scale: 0.0,
            unclipped_depth: false,
            color_format: None,
            depth_format: None,
            color_target_count: 0,
            layout: PipelineLayoutKey::empty(),
        }
    }
}

impl PartialEq for RenderPipelineKey {
    fn eq(&self, other: &Self) -> bool {
        let Self {
            vertex_shader,
            fragment_shader,
            vertex_buffers,
            constants,
            topology,
            cull_mode,
            front_face,
            blend_enable,
            blend_color,
            blend_alpha,
            color_write_mask,
            sample_count,
            alpha_to_coverage,
            depth_write_enabled,
            depth_compare,
            depth_bias,
            depth_bias_slope_scale,
            unclipped_depth,
            color_format,
            depth_format,
            color_target_count,
            layout,
        } = self;
        *vertex_shader == other.vertex_shader
            && *fragment_shader == other.fragment_shader
            && *vertex_buffers == other.vertex_buffers
            && *constants == other.constants
            && *topology == other.topology
            && *cull_mode == other.cull_mode
            && *front_face == other.front_face
            && *blend_enable == other.blend_enable
            && *blend_color == other.blend_color
            && *blend_alpha == other.blend_alpha
            && *color_write_mask == other.color_write_mask
            && *sample_count == other.sample_count
            && *alpha_to_coverage == other.alpha_to_coverage
            && *depth_write_enabled == other.depth_write_enabled
            && *depth_compare == other.depth_compare
            && *depth_bias == other.depth_bias
            && depth_bias_slope_scale.to_bits() == other.depth_bias_slope_scale.to_bits()
            && *unclipped_depth == other.unclipped_depth
            && *color_format == other.color_format
            && *depth_format == other.depth_format
            && *color_target_count == other.color_target_count
            && *layout == other.layout
    }
}

impl Eq for RenderPipelineKey {}

impl Hash for RenderPipelineKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let Self {
            vertex_shader,
            fragment_shader,
            vertex_buffers,
            constants,
            topology,
            cull_mode,
            front_face,
            blend_enable,
            blend_color,
            blend_alpha,
            color_write_mask,
            sample_count,
            alpha_to_coverage,
            depth_write_enabled,
            depth_compare,
            depth_bias,
            depth_bias_slope_scale,
            unclipped_depth,
            color_format,
            depth_format,
            color_target_count,
            layout,
        } = self;
        vertex_shader.hash(state);
        fragment_shader.hash(state);
        vertex_buffers.hash(state);
        constants.hash(state);
        topology.hash(state);
        cull_mode.hash(state);
        front_face.hash(state);
        blend_enable.hash(state);
        blend_color.hash(state);
        blend_alpha.hash(state);
        color_write_mask.hash(state);
        sample_count.hash(state);
        alpha_to_coverage.hash(state);
        depth_write_enabled.hash(state);
        depth_compare.hash(state);
        depth_bias.hash(state);
        depth_bias_slope_scale.to_bits().hash(state);
        unclipped_depth.hash(state);
        color_format.hash(state);
        depth_format.hash(state);
        color_target_count.hash(state);
        layout.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(key: &RenderPipelineKey) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    fn sample_key() -> RenderPipelineKey {
        RenderPipelineKey {
            vertex_shader: Some(0x1111),
            fragment_shader: Some(0x2222),
            vertex_buffers: vec![VertexBufferLayoutKey {
                array_stride: 16,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: vec![
                    VertexAttributeKey {
                        format: wgpu::VertexFormat::Float32x3,
                        offset: 0,
                        shader_location: 0,
                    },
                    VertexAttributeKey {
                        format: wgpu::VertexFormat::Float32,
                        offset: 12,
                        shader_location: 1,
                    },
                ],
            }],
            constants: vec![SpecConstant {
                name: "sample_count".to_owned(),
                value: SpecConstantValue::Int(4),
            }],
            cull_mode: Some(wgpu::Face::Back),
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::LessEqual,
            depth_bias_slope_scale: 1.5,
            color_format: Some(wgpu::TextureFormat::Rgba8Unorm),
            depth_format: Some(wgpu::TextureFormat::Depth24PlusStencil8),
            color_target_count: 1,
            ..RenderPipelineKey::default()
        }
    }

    #[test]
    fn equal_keys_hash_identically() {
        let a = sample_key();
        let b = sample_key();
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn every_scalar_channel_participates_in_identity() {
        let base = sample_key();
        let mutations: Vec<RenderPipelineKey> = vec![
            RenderPipelineKey {
                vertex_shader: Some(0x9999),
                ..base.clone()
            },
            RenderPipelineKey {
                fragment_shader: None,
                ..base.clone()
            },
            RenderPipelineKey {
                topology: wgpu::PrimitiveTopology::LineList,
                ..base.clone()
            },
            RenderPipelineKey {
                cull_mode: Some(wgpu::Face::Front),
                ..base.clone()
            },
            RenderPipelineKey {
                front_face: wgpu::FrontFace::Cw,
                ..base.clone()
            },
            RenderPipelineKey {
                blend_enable: true,
                ..base.clone()
            },
            RenderPipelineKey {
                blend_color: wgpu::BlendComponent::OVER,
                ..base.clone()
            },
            RenderPipelineKey {
                color_write_mask: wgpu::ColorWrites::RED,
                ..base.clone()
            },
            RenderPipelineKey {
                sample_count: 4,
                ..base.clone()
            },
            RenderPipelineKey {
                alpha_to_coverage: true,
                ..base.clone()
            },
            RenderPipelineKey {
                depth_write_enabled: false,
                ..base.clone()
            },
            RenderPipelineKey {
                depth_compare: wgpu::CompareFunction::Greater,
                ..base.clone()
            },
            RenderPipelineKey {
                depth_bias: 2,
                ..base.clone()
            },
            RenderPipelineKey {
                depth_bias_slope_scale: 2.5,
                ..base.clone()
            },
            RenderPipelineKey {
                unclipped_depth: true,
                ..base.clone()
            },
            RenderPipelineKey {
                color_format: Some(wgpu::TextureFormat::Bgra8Unorm),
                ..base.clone()
            },
            RenderPipelineKey {
                depth_format: None,
                ..base.clone()
            },
            RenderPipelineKey {
                color_target_count: 2,
                ..base.clone()
            },
            RenderPipelineKey {
                layout: PipelineLayoutKey {
                    bind_group_layout_hashes: vec![42],
                },
                ..base.clone()
            },
        ];
        for mutated in mutations {
            assert_ne!(base, mutated, "mutation not reflected in equality");
            assert_ne!(
                hash_of(&base),
                hash_of(&mutated),
                "mutation not reflected in hash"
            );
        }
    }

    #[test]
    fn active_prefix_length_is_part_of_identity() {
        let buffer = |stride: u64| VertexBufferLayoutKey {
            array_stride: stride,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: Vec::new(),
        };
        let two = RenderPipelineKey {
            vertex_buffers: vec![buffer(16), buffer(32)],
            ..RenderPipelineKey::default()
        };
        // Same two leading records plus one more default-initialized record.
        let three = RenderPipelineKey {
            vertex_buffers: vec![buffer(16), buffer(32), buffer(0)],
            ..RenderPipelineKey::default()
        };
        assert_ne!(two, three);
        assert_ne!(hash_of(&two), hash_of(&three));

        // Spare capacity is not identity.
        let mut reserved = two.clone();
        reserved.vertex_buffers.reserve(16);
        assert_eq!(two, reserved);
        assert_eq!(hash_of(&two), hash_of(&reserved));
    }

    #[test]
    fn attribute_sub_ranges_participate_in_identity() {
        let base = sample_key();
        let mut shifted = base.clone();
        shifted.vertex_buffers[0].attributes[1].offset = 16;
        assert_ne!(base, shifted);
        assert_ne!(hash_of(&base), hash_of(&shifted));

        let mut truncated = base.clone();
        truncated.vertex_buffers[0].attributes.pop();
        assert_ne!(base, truncated);
        assert_ne!(hash_of(&base), hash_of(&truncated));
    }

    #[test]
    fn spec_constants_compare_by_name_kind_and_value() {
        let constant = |name: &str, value: SpecConstantValue| RenderPipelineKey {
            constants: vec![SpecConstant {
                name: name.to_owned(),
                value,
            }],
            ..RenderPipelineKey::default()
        };
        let base = constant("shadow_samples", SpecConstantValue::Int(4));
        assert_eq!(base, constant("shadow_samples", SpecConstantValue::Int(4)));

        let renamed = constant("shadow_taps", SpecConstantValue::Int(4));
        let revalued = constant("shadow_samples", SpecConstantValue::Int(8));
        // Same bit pattern, different scalar kind.
        let rekinded = constant("shadow_samples", SpecConstantValue::Float(f32::from_bits(4)));
        for other in [renamed, revalued, rekinded] {
            assert_ne!(base, other);
            assert_ne!(hash_of(&base), hash_of(&other));
        }
    }

    #[test]
    fn float_channels_compare_by_bit_pattern() {
        let mut a = sample_key();
        let mut b = sample_key();
        a.depth_bias_slope_scale = f32::NAN;
        b.depth_bias_slope_scale = f32::NAN;
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }
}
