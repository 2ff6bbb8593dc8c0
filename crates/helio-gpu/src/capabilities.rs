/// Snapshot of the device features and limits the caches consult.
///
/// Captured once at device creation so per-draw cache lookups never call back
/// into the driver.
#[derive(Clone, Copy, Debug)]
pub struct GpuCapabilities {
    /// `wgpu::Features::DEPTH_CLIP_CONTROL` is available, so pipeline keys may
    /// set `unclipped_depth`.
    pub supports_unclipped_depth: bool,
    /// Maximum number of color attachments a render pipeline may target.
    pub max_color_targets: u32,
}

impl GpuCapabilities {
    pub fn from_device(device: &wgpu::Device) -> Self {
        Self {
            supports_unclipped_depth: device
                .features()
                .contains(wgpu::Features::DEPTH_CLIP_CONTROL),
            max_color_targets: device.limits().max_color_attachments,
        }
    }
}
