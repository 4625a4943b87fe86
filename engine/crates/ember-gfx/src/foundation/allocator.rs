use ash::vk::{self, Handle};
use slotmap::SlotMap;
use vk_mem::Alloc;

use crate::{
    error::{GfxError, GfxResult, VkResultExt},
    resources::{
        buffer::{AllocatedBuffer, GfxBufferDesc},
        image::{AllocatedImage, GfxImageDesc},
    },
};

slotmap::new_key_type! {
    /// allocator 内部 allocation 的索引，资源句柄只持有这个 key
    pub struct MemoryKey;
}

/// 对 vma 的封装
///
/// 所有的 `vk_mem::Allocation` 都存放在 allocator 内部，外部的资源句柄只是可以复制的 key。
/// 这样资源句柄就可以作为 tagged value 放进 deinit stack 中。
pub struct GfxAllocator {
    vma: vk_mem::Allocator,
    allocations: SlotMap<MemoryKey, vk_mem::Allocation>,
}

// new & init
impl GfxAllocator {
    /// vma 需要引用 Instance 以及 Device，并确保在其声明周期之内这两个的引用是有效的，
    /// 因此需要在 device 创建完成后再创建 allocator，并在 device 销毁之前销毁
    pub fn new(instance: &ash::Instance, pdevice: vk::PhysicalDevice, device: &ash::Device) -> GfxResult<Self> {
        let mut vma_ci = vk_mem::AllocatorCreateInfo::new(instance, device, pdevice);
        vma_ci.vulkan_api_version = vk::API_VERSION_1_3;
        vma_ci.flags = vk_mem::AllocatorCreateFlags::BUFFER_DEVICE_ADDRESS;

        let vma = unsafe { vk_mem::Allocator::new(vma_ci) }.vk_check("vmaCreateAllocator")?;

        Ok(Self {
            vma,
            allocations: SlotMap::with_key(),
        })
    }
}

// destroy
impl GfxAllocator {
    /// 通过 drop 触发 vma 的销毁，此时所有的 allocation 都应该已经释放
    pub fn destroy(self) {
        if !self.allocations.is_empty() {
            log::error!("allocator destroyed with {} live allocations", self.allocations.len());
        }
        log::info!("destroying allocator");
    }
}

// buffer
impl GfxAllocator {
    pub fn create_buffer(&mut self, desc: &GfxBufferDesc) -> GfxResult<AllocatedBuffer> {
        let buffer_ci = vk::BufferCreateInfo::default().size(desc.size).usage(desc.usage);
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: if desc.mapped {
                vk_mem::MemoryUsage::Auto
            } else {
                vk_mem::MemoryUsage::AutoPreferDevice
            },
            flags: if desc.mapped {
                vk_mem::AllocationCreateFlags::MAPPED | vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE
            } else {
                vk_mem::AllocationCreateFlags::empty()
            },
            ..Default::default()
        };

        let (buffer, allocation) =
            unsafe { self.vma.create_buffer(&buffer_ci, &alloc_ci) }.vk_check("vmaCreateBuffer")?;
        let memory = self.allocations.insert(allocation);

        Ok(AllocatedBuffer {
            buffer,
            memory,
            size: desc.size,
            usage: desc.usage,
        })
    }

    pub fn destroy_buffer(&mut self, buffer: AllocatedBuffer) {
        let Some(mut allocation) = self.allocations.remove(buffer.memory) else {
            log::error!("buffer {:?} destroyed twice", buffer.buffer);
            return;
        };
        unsafe {
            self.vma.destroy_buffer(buffer.buffer, &mut allocation);
        }
    }

    /// 通过 mem map 的方式将 data 写入到 buffer 的起始位置
    pub fn write_buffer(&mut self, buffer: &AllocatedBuffer, data: &[u8]) -> GfxResult<()> {
        debug_assert!(data.len() as vk::DeviceSize <= buffer.size);
        let allocation = live_allocation(&mut self.allocations, buffer.memory, "buffer", buffer.buffer.as_raw())?;
        unsafe {
            let ptr = self.vma.map_memory(allocation).vk_check("vmaMapMemory")?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr, data.len());
            let flushed = self.vma.flush_allocation(allocation, 0, data.len() as vk::DeviceSize);
            self.vma.unmap_memory(allocation);
            flushed.vk_check("vmaFlushAllocation")?;
        }
        Ok(())
    }
}

// image
impl GfxAllocator {
    pub fn create_image(&mut self, desc: &GfxImageDesc) -> GfxResult<AllocatedImage> {
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            required_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            ..Default::default()
        };

        let (image, allocation) =
            unsafe { self.vma.create_image(&desc.create_info(), &alloc_ci) }.vk_check("vmaCreateImage")?;
        let memory = self.allocations.insert(allocation);

        Ok(AllocatedImage {
            image,
            memory,
            extent: desc.extent,
            format: desc.format,
            usage: desc.usage,
        })
    }

    pub fn destroy_image(&mut self, image: AllocatedImage) {
        let Some(mut allocation) = self.allocations.remove(image.memory) else {
            log::error!("image {:?} destroyed twice", image.image);
            return;
        };
        unsafe {
            self.vma.destroy_image(image.image, &mut allocation);
        }
    }
}

// getters
impl GfxAllocator {
    #[inline]
    pub fn live_allocation_count(&self) -> usize {
        self.allocations.len()
    }
}

/// 资源对应的 allocation，资源已经销毁时返回 `GfxError::Destroyed`
fn live_allocation<'a, T>(
    allocations: &'a mut SlotMap<MemoryKey, T>,
    memory: MemoryKey,
    what: &'static str,
    handle: u64,
) -> GfxResult<&'a mut T> {
    allocations.get_mut(memory).ok_or_else(|| {
        log::error!("{} {:#x} used after it was destroyed", what, handle);
        GfxError::Destroyed { what, handle }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destroyed_allocation_is_an_error() {
        let mut allocations: SlotMap<MemoryKey, u32> = SlotMap::with_key();
        let memory = allocations.insert(3);
        *live_allocation(&mut allocations, memory, "buffer", 0x10).unwrap() += 1;
        assert_eq!(allocations[memory], 4);

        allocations.remove(memory);
        let err = live_allocation(&mut allocations, memory, "buffer", 0x10).unwrap_err();
        assert!(matches!(err, GfxError::Destroyed { what: "buffer", handle: 0x10 }));
    }
}
