use ash::vk;

use crate::foundation::{allocator::MemoryKey, debug_messenger::DebugType};

/// storage image 的 usage：可以作为 blit 的源和目标，可以被 compute 写入，也可以作为 color attachment
pub const STORAGE_IMAGE_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::from_raw(
    vk::ImageUsageFlags::TRANSFER_SRC.as_raw()
        | vk::ImageUsageFlags::TRANSFER_DST.as_raw()
        | vk::ImageUsageFlags::STORAGE.as_raw()
        | vk::ImageUsageFlags::COLOR_ATTACHMENT.as_raw(),
);

/// 采样纹理的 usage
pub const SAMPLED_IMAGE_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::from_raw(
    vk::ImageUsageFlags::SAMPLED.as_raw()
        | vk::ImageUsageFlags::TRANSFER_DST.as_raw()
        | vk::ImageUsageFlags::COLOR_ATTACHMENT.as_raw(),
);

/// 由 allocator 分配的 2D image
///
/// 只是一个可以复制的句柄，内存由 `GfxAllocator` 持有，需要显式销毁
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AllocatedImage {
    pub image: vk::Image,
    pub memory: MemoryKey,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
}
impl DebugType for AllocatedImage {
    fn debug_type_name() -> &'static str {
        "GfxImage"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.image
    }
}

#[derive(Clone, Debug)]
pub struct GfxImageDesc {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub name: String,
}
// new & init
impl GfxImageDesc {
    pub fn new_image_2d(
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        name: impl Into<String>,
    ) -> Self {
        Self {
            extent,
            format,
            usage,
            name: name.into(),
        }
    }

    #[inline]
    pub fn new_storage_image(extent: vk::Extent2D, format: vk::Format, name: impl Into<String>) -> Self {
        Self::new_image_2d(extent, format, STORAGE_IMAGE_USAGE, name)
    }
}
// tools
impl GfxImageDesc {
    /// 单个 mip，单个 layer，optimal tiling
    pub fn create_info(&self) -> vk::ImageCreateInfo<'static> {
        vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(self.format)
            .extent(vk::Extent3D {
                width: self.extent.width,
                height: self.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(self.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
    }
}
