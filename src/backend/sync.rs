// Synchronization primitives
//
// One set of semaphores and a fence per frame in flight, so the CPU can
// record frame N+1 while the GPU still works on frame N.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;
use super::VulkanDevice;

pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
    device: Arc<VulkanDevice>,
}

impl FrameSync {
    pub fn new(device: Arc<VulkanDevice>) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Signaled so the first wait on each slot returns immediately
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        let (image_available, render_finished, in_flight_fence) = unsafe {
            (
                device.device.create_semaphore(&semaphore_info, None)?,
                device.device.create_semaphore(&semaphore_info, None)?,
                device.device.create_fence(&fence_info, None)?,
            )
        };

        Ok(Self {
            image_available,
            render_finished,
            in_flight_fence,
            device,
        })
    }

    /// Block until the GPU is done with the frame that last used this slot
    pub fn wait(&self) -> Result<()> {
        unsafe {
            self.device
                .device
                .wait_for_fences(&[self.in_flight_fence], true, u64::MAX)
                .context("Failed waiting for frame fence")
        }
    }

    /// Only reset once work that signals the fence is about to be submitted
    pub fn reset(&self) -> Result<()> {
        unsafe {
            self.device
                .device
                .reset_fences(&[self.in_flight_fence])
                .context("Failed to reset frame fence")
        }
    }

    /// Build the given number of slots
    pub fn create_slots(device: &Arc<VulkanDevice>, count: usize) -> Result<Vec<Self>> {
        (0..count).map(|_| Self::new(device.clone())).collect()
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_semaphore(self.image_available, None);
            self.device.device.destroy_semaphore(self.render_finished, None);
            self.device.device.destroy_fence(self.in_flight_fence, None);
        }
    }
}
