use ash::vk;
use itertools::Itertools;

use crate::{commands::barrier::GfxImageBarrier, foundation::device::GfxDevice};

/// 命令录制封装
///
/// command buffer 的分配、begin、end 以及提交由 `GpuDevice` 负责，这里只负责录制命令。
///
/// # 使用示例
/// ```ignore
/// let cmd = GfxCommandBuffer::new(gfx.gfx_device(), frame.command_buffer);
/// cmd.cmd_bind_pipeline(vk::PipelineBindPoint::COMPUTE, pipeline);
/// cmd.cmd_dispatch([16, 16, 1]);
/// ```
#[derive(Clone, Copy)]
pub struct GfxCommandBuffer<'a> {
    device: &'a GfxDevice,
    vk_handle: vk::CommandBuffer,
}
// new & init
impl<'a> GfxCommandBuffer<'a> {
    #[inline]
    pub fn new(device: &'a GfxDevice, vk_handle: vk::CommandBuffer) -> Self {
        Self { device, vk_handle }
    }
}
// getters
impl GfxCommandBuffer<'_> {
    #[inline]
    pub fn vk_handle(&self) -> vk::CommandBuffer {
        self.vk_handle
    }
}
// 数据传输类型
impl GfxCommandBuffer<'_> {
    /// - command type: action
    /// - 支持的 queue：transfer，graphics，compute
    #[inline]
    pub fn cmd_copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        unsafe {
            self.device.cmd_copy_buffer(self.vk_handle, src, dst, regions);
        }
    }

    /// 将 src image 的整个区域 blit 到 dst image 的整个区域，尺寸不同时使用 linear 缩放
    ///
    /// src 需要处于 TRANSFER_SRC_OPTIMAL，dst 需要处于 TRANSFER_DST_OPTIMAL
    ///
    /// - command type: action
    /// - 支持的 queue：graphics
    pub fn cmd_blit_image(&self, src: vk::Image, src_extent: vk::Extent2D, dst: vk::Image, dst_extent: vk::Extent2D) {
        let subresource = vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        };
        let corner = |extent: vk::Extent2D| vk::Offset3D {
            x: extent.width as i32,
            y: extent.height as i32,
            z: 1,
        };
        let regions = [vk::ImageBlit2::default()
            .src_subresource(subresource)
            .src_offsets([vk::Offset3D::default(), corner(src_extent)])
            .dst_subresource(subresource)
            .dst_offsets([vk::Offset3D::default(), corner(dst_extent)])];

        let blit_info = vk::BlitImageInfo2::default()
            .src_image(src)
            .src_image_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
            .dst_image(dst)
            .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .filter(vk::Filter::LINEAR)
            .regions(&regions);
        unsafe {
            self.device.cmd_blit_image2(self.vk_handle, &blit_info);
        }
    }

    /// image 需要处于 GENERAL 或者 TRANSFER_DST_OPTIMAL
    ///
    /// - command type: action
    /// - 支持的 queue：graphics，compute
    pub fn cmd_clear_color_image(&self, image: vk::Image, layout: vk::ImageLayout, color: [f32; 4]) {
        let range = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        };
        unsafe {
            self.device.cmd_clear_color_image(
                self.vk_handle,
                image,
                layout,
                &vk::ClearColorValue { float32: color },
                std::slice::from_ref(&range),
            );
        }
    }
}
// 状态设置类型
impl GfxCommandBuffer<'_> {
    /// - command type: state
    /// - 支持的 queue：graphics，compute
    #[inline]
    pub fn cmd_bind_pipeline(&self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe {
            self.device.cmd_bind_pipeline(self.vk_handle, bind_point, pipeline);
        }
    }

    /// - command type: state
    /// - 支持的 queue：graphics，compute
    #[inline]
    pub fn cmd_bind_descriptor_sets(
        &self,
        bind_point: vk::PipelineBindPoint,
        pipeline_layout: vk::PipelineLayout,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.vk_handle,
                bind_point,
                pipeline_layout,
                first_set,
                descriptor_sets,
                &[],
            );
        }
    }

    /// - command type: state
    /// - 支持的 queue: graphics, compute
    #[inline]
    pub fn cmd_push_constants(
        &self,
        pipeline_layout: vk::PipelineLayout,
        stage: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        unsafe {
            self.device.cmd_push_constants(self.vk_handle, pipeline_layout, stage, offset, data);
        }
    }
}
// 执行类型
impl GfxCommandBuffer<'_> {
    /// - command type: action
    /// - 支持的 queue：compute
    #[inline]
    pub fn cmd_dispatch(&self, group_count: [u32; 3]) {
        unsafe {
            self.device.cmd_dispatch(self.vk_handle, group_count[0], group_count[1], group_count[2]);
        }
    }
}
// 同步类型
impl GfxCommandBuffer<'_> {
    /// - command type: synchronize
    /// - 支持的 queue：graphics，compute，transfer
    pub fn image_memory_barrier(&self, dependency_flags: vk::DependencyFlags, barriers: &[GfxImageBarrier]) {
        let barriers = barriers.iter().map(|b| *b.inner()).collect_vec();
        let dependency_info =
            vk::DependencyInfo::default().image_memory_barriers(&barriers).dependency_flags(dependency_flags);
        unsafe {
            self.device.cmd_pipeline_barrier2(self.vk_handle, &dependency_info);
        }
    }

    /// 单个 image 的 layout 转换
    #[inline]
    pub fn transition_image(&self, image: vk::Image, old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) {
        self.image_memory_barrier(
            vk::DependencyFlags::empty(),
            &[GfxImageBarrier::new_layout_transition(image, old_layout, new_layout)],
        );
    }
}
