use ash::vk;

/// 创建 image view 所需的参数
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxImageViewDesc {
    pub format: vk::Format,
    pub view_type: vk::ImageViewType,
    pub aspect_mask: vk::ImageAspectFlags,
}
impl GfxImageViewDesc {
    #[inline]
    pub fn new_2d(format: vk::Format, aspect_mask: vk::ImageAspectFlags) -> Self {
        Self {
            format,
            view_type: vk::ImageViewType::TYPE_2D,
            aspect_mask,
        }
    }

    #[inline]
    pub fn new_color_2d(format: vk::Format) -> Self {
        Self::new_2d(format, vk::ImageAspectFlags::COLOR)
    }

    pub fn create_info(&self, image: vk::Image) -> vk::ImageViewCreateInfo<'static> {
        vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(self.view_type)
            .format(self.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: self.aspect_mask,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            })
    }
}
