//! Semaphores, fences and queue submission.

use ash::vk;

use super::conversion::{vk_creation_error, vk_error};
use crate::backend::BackendError;

/// Fence waits never time out; a frame may take arbitrarily long.
const FENCE_WAIT_NS: u64 = u64::MAX;

/// Create a binary semaphore.
pub fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore, BackendError> {
    let info = vk::SemaphoreCreateInfo::default();
    unsafe { device.create_semaphore(&info, None) }
        .map_err(|e| vk_creation_error("Failed to create semaphore", e))
}

/// Create a fence, optionally signaled.
pub fn create_fence(device: &ash::Device, signaled: bool) -> Result<vk::Fence, BackendError> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };
    let info = vk::FenceCreateInfo::default().flags(flags);
    unsafe { device.create_fence(&info, None) }
        .map_err(|e| vk_creation_error("Failed to create fence", e))
}

/// Block until `fence` is signaled.
pub fn wait_fence(device: &ash::Device, fence: vk::Fence) -> Result<(), BackendError> {
    unsafe { device.wait_for_fences(&[fence], true, FENCE_WAIT_NS) }
        .map_err(|e| vk_error("vkWaitForFences", e))
}

/// Submit one command buffer that waits on `wait` and signals `signal` and `fence`.
pub fn submit(
    device: &ash::Device,
    queue: vk::Queue,
    command_buffer: vk::CommandBuffer,
    wait: vk::Semaphore,
    signal: vk::Semaphore,
    fence: vk::Fence,
) -> Result<(), BackendError> {
    let command_buffers = [command_buffer];
    let wait_semaphores = [wait];
    let signal_semaphores = [signal];
    let wait_stages = [vk::PipelineStageFlags::TRANSFER
        | vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];

    let submit_info = vk::SubmitInfo::default()
        .wait_semaphores(&wait_semaphores)
        .wait_dst_stage_mask(&wait_stages)
        .command_buffers(&command_buffers)
        .signal_semaphores(&signal_semaphores);

    unsafe { device.queue_submit(queue, &[submit_info], fence) }
        .map_err(|e| vk_error("vkQueueSubmit", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fence_wait_is_unbounded() {
        assert_eq!(FENCE_WAIT_NS, u64::MAX);
    }
}
