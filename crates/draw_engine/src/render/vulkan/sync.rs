//! Host/device synchronization for one-shot upload submissions
//!
//! Uploads record into a single reusable command buffer, submit it on the
//! graphics queue guarded by a fresh fence and block until that fence signals.
//!
//! # Fence waiting
//!
//! The host never blocks indefinitely inside one driver call. Each wait is
//! bounded by [`FenceWaitPolicy::timeout_ns`] (100ms by default) and retried
//! while the driver reports `TIMEOUT`:
//!
//! ```text
//! submit(fence) -> wait(100ms) -> TIMEOUT -> wait(100ms) -> TIMEOUT -> wait(100ms) -> SUCCESS
//! ```
//!
//! Any other result ends the loop with [`VulkanError::Api`]. By default the
//! number of retries is unbounded; setting [`FenceWaitPolicy::max_attempts`]
//! turns an unsignaled fence into [`VulkanError::FenceTimeout`] instead.
//!
//! A failed wait leaves the submission possibly still executing, so the queue
//! is drained before the fence is released. If the drain fails too, the fence
//! is leaked and [`VulkanError::SubmissionStalled`] tells the caller to leak
//! everything the recorded commands reference.

use ash::vk;
use std::sync::Arc;

use crate::render::vulkan::{GpuDevice, VulkanError, VulkanResult};

/// Default per-attempt fence wait, in nanoseconds
pub const DEFAULT_FENCE_TIMEOUT_NS: u64 = 100_000_000;

/// How long to block on an upload fence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FenceWaitPolicy {
    /// Bound on a single wait call
    pub timeout_ns: u64,
    /// Maximum number of timed-out waits before giving up, `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for FenceWaitPolicy {
    fn default() -> Self {
        Self {
            timeout_ns: DEFAULT_FENCE_TIMEOUT_NS,
            max_attempts: None,
        }
    }
}

impl FenceWaitPolicy {
    /// Retry timed-out waits forever
    pub fn unbounded(timeout_ns: u64) -> Self {
        Self { timeout_ns, max_attempts: None }
    }

    /// Give up after `max_attempts` timed-out waits
    pub fn bounded(timeout_ns: u64, max_attempts: u32) -> Self {
        Self {
            timeout_ns,
            max_attempts: Some(max_attempts),
        }
    }
}

/// RAII wrapper for a Vulkan fence
pub struct Fence {
    device: Arc<dyn GpuDevice>,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence
    pub fn new(device: Arc<dyn GpuDevice>, signaled: bool) -> VulkanResult<Self> {
        let fence = device.create_fence(signaled).map_err(VulkanError::Api)?;
        Ok(Self { device, fence })
    }

    /// Block until the fence signals, retrying timed-out waits per `policy`.
    ///
    /// Returns the number of waits that timed out before success.
    pub fn wait(&self, policy: &FenceWaitPolicy) -> VulkanResult<u32> {
        let mut timeouts = 0;
        loop {
            match self.device.wait_for_fence(self.fence, policy.timeout_ns) {
                Ok(()) => return Ok(timeouts),
                Err(vk::Result::TIMEOUT) => {
                    timeouts += 1;
                    log::warn!("Fence wait timed out ({} so far)", timeouts);
                    if policy.max_attempts.is_some_and(|max| timeouts >= max) {
                        log::error!("Giving up on fence after {} timed-out waits", timeouts);
                        return Err(VulkanError::FenceTimeout { attempts: timeouts });
                    }
                }
                Err(result) => return Err(VulkanError::Api(result)),
            }
        }
    }

    /// Get fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        self.device.destroy_fence(self.fence);
    }
}

/// Command buffer and queue used for blocking uploads
pub struct UploadContext {
    device: Arc<dyn GpuDevice>,
    command_buffer: vk::CommandBuffer,
    queue: vk::Queue,
    policy: FenceWaitPolicy,
}

impl UploadContext {
    /// Wrap an allocated primary command buffer and the queue it submits to.
    /// The command pool must allow individual command buffer resets.
    pub fn new(
        device: Arc<dyn GpuDevice>,
        command_buffer: vk::CommandBuffer,
        queue: vk::Queue,
        policy: FenceWaitPolicy,
    ) -> Self {
        Self {
            device,
            command_buffer,
            queue,
            policy,
        }
    }

    /// Record with `record`, submit, and block until the GPU has finished.
    ///
    /// The fence is destroyed on every exit path except
    /// [`VulkanError::SubmissionStalled`], where it is still in use.
    pub fn submit_one_shot(
        &self,
        record: impl FnOnce(&dyn GpuDevice, vk::CommandBuffer),
    ) -> VulkanResult<()> {
        let device = self.device.as_ref();
        let cmd = self.command_buffer;

        device.reset_command_buffer(cmd).map_err(VulkanError::Api)?;
        device
            .begin_command_buffer(cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
            .map_err(VulkanError::Api)?;
        record(device, cmd);
        device.end_command_buffer(cmd).map_err(VulkanError::Api)?;

        let fence = Fence::new(Arc::clone(&self.device), false)?;
        device
            .queue_submit(self.queue, cmd, fence.handle())
            .map_err(VulkanError::Api)?;

        let timeouts = match fence.wait(&self.policy) {
            Ok(timeouts) => timeouts,
            Err(err) => {
                // The submission may still be running; drain before the fence drops
                if let Err(result) = device.queue_wait_idle(self.queue) {
                    log::error!(
                        "Queue drain failed after upload wait ({}): {:?}, leaking fence {:?}",
                        err,
                        result,
                        fence.handle()
                    );
                    std::mem::forget(fence);
                    return Err(VulkanError::SubmissionStalled { result });
                }
                return Err(err);
            }
        };
        if timeouts > 0 {
            log::debug!("Upload completed after {} timed-out waits", timeouts);
        }
        Ok(())
    }

    /// Fence wait policy applied to every submission
    pub fn policy(&self) -> &FenceWaitPolicy {
        &self.policy
    }
}
