//! Shader module construction.
//!
//! Compilation diagnostics arrive asynchronously in wgpu; we wait for them
//! with an explicit deadline so broken shaders are reported near their
//! creation site, and a driver that never reports stalls a frame, not the
//! process.

use std::future::Future;
use std::pin::pin;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

pub(crate) fn create_shader_module(
    device: &wgpu::Device,
    label: &str,
    source: &str,
    diagnostics_timeout: Duration,
) -> wgpu::ShaderModule {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });

    let info = block_on_with_timeout(module.get_compilation_info(), diagnostics_timeout, || {
        let _ = device.poll(wgpu::Maintain::Poll);
    });
    match info {
        Some(info) => log_compilation_messages(label, &info),
        None => warn!(
            label,
            timeout_ms = diagnostics_timeout.as_millis() as u64,
            "timed out waiting for shader compilation diagnostics"
        ),
    }
    module
}

fn log_compilation_messages(label: &str, info: &wgpu::CompilationInfo) {
    for message in &info.messages {
        let (line, line_pos, offset, length) = match &message.location {
            Some(location) => (
                location.line_number,
                location.line_position,
                location.offset,
                location.length,
            ),
            None => (0, 0, 0, 0),
        };
        match message.message_type {
            wgpu::CompilationMessageType::Error => error!(
                label,
                line,
                line_pos,
                offset,
                length,
                message = %message.message,
                "error compiling shader"
            ),
            wgpu::CompilationMessageType::Warning => warn!(
                label,
                line,
                line_pos,
                offset,
                length,
                message = %message.message,
                "warning compiling shader"
            ),
            wgpu::CompilationMessageType::Info => debug!(
                label,
                line,
                line_pos,
                offset,
                length,
                message = %message.message,
                "shader compilation note"
            ),
        }
    }
}

fn noop_raw_waker() -> RawWaker {
    fn clone(_: *const ()) -> RawWaker {
        noop_raw_waker()
    }
    fn noop(_: *const ()) {}
    static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
    RawWaker::new(std::ptr::null(), &VTABLE)
}

/// Drive `future` to completion with a deadline, calling `tick` between
/// polls. wgpu's native futures make progress when the device is polled, not
/// through waker wakeups, so a no-op waker plus a poll loop is sufficient.
pub(crate) fn block_on_with_timeout<F: Future>(
    future: F,
    timeout: Duration,
    mut tick: impl FnMut(),
) -> Option<F::Output> {
    // The vtable above does nothing, so the waker contract is trivially met.
    let waker = unsafe { Waker::from_raw(noop_raw_waker()) };
    let mut cx = Context::from_waker(&waker);
    let mut future = pin!(future);
    let deadline = Instant::now() + timeout;
    loop {
        if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
            return Some(output);
        }
        if Instant::now() >= deadline {
            return None;
        }
        tick();
        std::thread::yield_now();
    }
}
