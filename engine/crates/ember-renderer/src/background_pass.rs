use std::path::Path;

use ash::vk;
use ember_gfx::{
    commands::command_buffer::GfxCommandBuffer,
    descriptors::bindless_table::GfxBindlessTable,
    gfx::Gfx,
    gpu_device::GpuObject,
    pipelines::shader::{create_compute_pipeline, create_shader_module},
};
use ember_render_interface::{deinit_stack::DeinitStack, error::FatalResult, swapchain_manager::DrawImage};

/// compute shader 的 workgroup 尺寸
pub const BACKGROUND_GROUP_SIZE: u32 = 16;

/// 和 shader 中的 push constant 布局一致
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BackgroundPushConstants {
    /// draw image 在 bindless storage image 数组中的下标
    pub draw_image: u32,
    pub width: u32,
    pub height: u32,
    pub _padding: u32,
}

/// 每帧用 compute shader 填充 draw image
pub struct BackgroundPass {
    pipeline: vk::Pipeline,
}

// new & init
impl BackgroundPass {
    /// shader 和 pipeline 的销毁动作放入 `deinit_stack`
    pub fn new(gfx: &Gfx, shader_path: &Path, deinit_stack: &mut DeinitStack<GpuObject>) -> FatalResult<Self> {
        let _span = tracy_client::span!("BackgroundPass::new");

        let shader_module = create_shader_module(gfx.gfx_device(), shader_path)?;
        deinit_stack.push(GpuObject::ShaderModule(shader_module));

        let pipeline = create_compute_pipeline(
            gfx.gfx_device(),
            gfx.bindless_table().pipeline_layout(),
            shader_module,
            "background",
        )?;
        deinit_stack.push(GpuObject::Pipeline(pipeline));

        log::info!("background pass created from {:?}", shader_path);
        Ok(Self { pipeline })
    }
}

// tools
impl BackgroundPass {
    /// 覆盖整个 draw image 需要的 workgroup 数量
    pub fn group_count(extent: vk::Extent2D) -> [u32; 3] {
        [
            extent.width.div_ceil(BACKGROUND_GROUP_SIZE),
            extent.height.div_ceil(BACKGROUND_GROUP_SIZE),
            1,
        ]
    }

    pub fn push_constants(draw_image: &DrawImage) -> BackgroundPushConstants {
        let extent = draw_image.extent();
        BackgroundPushConstants {
            draw_image: draw_image.storage_id.index(),
            width: extent.width,
            height: extent.height,
            _padding: 0,
        }
    }
}

// draw
impl BackgroundPass {
    /// draw image 需要处于 GENERAL layout
    pub fn draw(&self, cmd: &GfxCommandBuffer, bindless_table: &GfxBindlessTable, draw_image: &DrawImage) {
        let _span = tracy_client::span!("BackgroundPass::draw");

        cmd.cmd_bind_pipeline(vk::PipelineBindPoint::COMPUTE, self.pipeline);
        cmd.cmd_bind_descriptor_sets(
            vk::PipelineBindPoint::COMPUTE,
            bindless_table.pipeline_layout(),
            0,
            &[bindless_table.descriptor_set()],
        );
        // push constant range 对所有 stage 可见，stage flags 需要完全一致
        cmd.cmd_push_constants(
            bindless_table.pipeline_layout(),
            vk::ShaderStageFlags::ALL,
            0,
            bytemuck::bytes_of(&Self::push_constants(draw_image)),
        );
        cmd.cmd_dispatch(Self::group_count(draw_image.extent()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_gfx::descriptors::bindless_table::PUSH_CONSTANT_SIZE;

    #[test]
    fn test_group_count_covers_image() {
        assert_eq!(BackgroundPass::group_count(vk::Extent2D { width: 16, height: 16 }), [1, 1, 1]);
        assert_eq!(
            BackgroundPass::group_count(vk::Extent2D {
                width: 1280,
                height: 721
            }),
            [80, 46, 1]
        );
    }

    #[test]
    fn test_push_constants_fit() {
        assert!(size_of::<BackgroundPushConstants>() as u32 <= PUSH_CONSTANT_SIZE);
        assert_eq!(size_of::<BackgroundPushConstants>() % 4, 0);
    }
}
