use ash::vk;

use crate::foundation::{allocator::MemoryKey, debug_messenger::DebugType};

/// 由 allocator 分配的 buffer
///
/// 只是一个可以复制的句柄，内存由 `GfxAllocator` 持有，需要显式销毁
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AllocatedBuffer {
    pub buffer: vk::Buffer,
    pub memory: MemoryKey,
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
}
impl DebugType for AllocatedBuffer {
    fn debug_type_name() -> &'static str {
        "GfxBuffer"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.buffer
    }
}
// getters
impl AllocatedBuffer {
    #[inline]
    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.buffer,
            offset: 0,
            range: self.size,
        }
    }
}

#[derive(Clone, Debug)]
pub struct GfxBufferDesc {
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    /// host 可见并且持久映射，用于 stage buffer 以及每帧更新的 uniform buffer
    pub mapped: bool,
    pub name: String,
}
impl GfxBufferDesc {
    /// 优先使用 device memory
    pub fn new_device(size: vk::DeviceSize, usage: vk::BufferUsageFlags, name: impl Into<String>) -> Self {
        Self {
            size,
            usage,
            mapped: false,
            name: name.into(),
        }
    }

    #[inline]
    pub fn new_stage_buffer(size: vk::DeviceSize, name: impl Into<String>) -> Self {
        Self {
            size,
            usage: vk::BufferUsageFlags::TRANSFER_SRC,
            mapped: true,
            name: name.into(),
        }
    }

    #[inline]
    pub fn new_uniform_buffer(size: vk::DeviceSize, name: impl Into<String>) -> Self {
        Self {
            size,
            usage: vk::BufferUsageFlags::UNIFORM_BUFFER,
            mapped: true,
            name: name.into(),
        }
    }
}
