// Buffer utilities
//
// Host-visible buffers backed by gpu-allocator. The data is small and static
// (the full-screen quad), so it lives in CPU-to-GPU memory and is written once.

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;
use super::VulkanDevice;

/// A buffer and the allocation it is bound to, freed together on drop
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    allocation: Option<Allocation>,
    device: Arc<VulkanDevice>,
}

impl GpuBuffer {
    /// Create a buffer and fill it with data
    pub fn with_data<T: bytemuck::Pod>(
        device: &Arc<VulkanDevice>,
        name: &str,
        usage: vk::BufferUsageFlags,
        data: &[T],
    ) -> Result<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let size = bytes.len() as vk::DeviceSize;

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device.device.create_buffer(&buffer_info, None)
                .context("Failed to create buffer")?
        };

        // From here on `Drop` takes care of the buffer if anything fails
        let mut gpu_buffer = Self {
            buffer,
            allocation: None,
            device: device.clone(),
        };

        let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };

        let mut allocation = device
            .allocator
            .lock()
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: MemoryLocation::CpuToGpu,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .with_context(|| format!("Failed to allocate memory for {}", name))?;

        let bind_result = unsafe {
            device.device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        };

        let copied = allocation
            .mapped_slice_mut()
            .map(|mapped| mapped[..bytes.len()].copy_from_slice(bytes))
            .is_some();

        gpu_buffer.allocation = Some(allocation);
        bind_result.context("Failed to bind buffer memory")?;

        if !copied {
            anyhow::bail!("Memory for {} is not host visible", name);
        }

        Ok(gpu_buffer)
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_buffer(self.buffer, None);
        }

        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = self.device.allocator.lock().free(allocation) {
                log::error!("Failed to free buffer memory: {}", e);
            }
        }
    }
}
