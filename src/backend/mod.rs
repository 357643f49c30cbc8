// Backend module - Vulkan abstraction layer
//
// Thin wrapper around ash: owns handles, destroys them on drop and turns
// raw Vulkan results into anyhow errors with context.

pub mod buffer;
pub mod device;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use buffer::GpuBuffer;
pub use device::VulkanDevice;
pub use swapchain::Swapchain;
pub use sync::FrameSync;
