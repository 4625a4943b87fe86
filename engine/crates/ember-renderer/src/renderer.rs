use ash::vk;
use ember_gfx::{
    commands::command_buffer::GfxCommandBuffer,
    gfx::{Gfx, GfxCreateInfo},
    gpu_device::GpuObject,
    resources::buffer::AllocatedBuffer,
};
use ember_render_interface::{
    bindless_registry::BindlessRegistry,
    config::RendererConfig,
    descriptor_id::{BindingKind, DescriptorId},
    error::FatalResult,
    frame_pacer::ActiveFrame,
    render_runtime::{FrameOutcome, RenderRuntime},
    swapchain_manager::{DrawImage, SwapchainManager},
};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::background_pass::BackgroundPass;

/// 交给应用录制命令时可以访问的内容
pub struct FrameRecorder<'a> {
    pub cmd: GfxCommandBuffer<'a>,
    pub frame: ActiveFrame,
    /// 处于 GENERAL layout
    pub draw_target: DrawImage,
    /// 全局的 pipeline layout，以及 set 0 的 bindless set
    pub pipeline_layout: vk::PipelineLayout,
    pub bindless_set: vk::DescriptorSet,
}

/// 渲染器
///
/// 在真实的 Vulkan 设备上驱动 `RenderRuntime`，所有方法只能在渲染线程中调用。
///
/// # 使用示例
/// ```ignore
/// let mut renderer = Renderer::new(&config, display, window, extent)?;
/// loop {
///     renderer.render_frame(|recorder| { /* 使用 recorder.cmd 录制 */ })?;
/// }
/// renderer.destroy()?;
/// ```
pub struct Renderer {
    gfx: Gfx,
    runtime: RenderRuntime,
    background: Option<BackgroundPass>,
    clear_color: [f32; 4],
}

// new & init
impl Renderer {
    pub fn new(
        config: &RendererConfig,
        raw_display_handle: RawDisplayHandle,
        raw_window_handle: RawWindowHandle,
        window_extent: vk::Extent2D,
    ) -> FatalResult<Self> {
        let _span = tracy_client::span!("Renderer::new");

        let mut gfx = Gfx::new(GfxCreateInfo {
            app_name: config.window.title.clone(),
            validation: config.validation,
            raw_display_handle,
            raw_window_handle,
            descriptor_capacities: config.descriptor_capacity.as_array(),
        })?;
        let capacities = gfx.descriptor_capacities();
        let mut runtime = RenderRuntime::new(&mut gfx, config, capacities, window_extent)?;

        let background = match &config.background_shader {
            Some(path) => Some(BackgroundPass::new(&gfx, path, runtime.global_deinit_mut())?),
            None => None,
        };

        log::info!(
            "renderer created: overlap {}, {} presentable images, capacities {:?}",
            config.frame_overlap,
            config.presentable_images,
            capacities
        );
        Ok(Self {
            gfx,
            runtime,
            background,
            clear_color: config.clear_color,
        })
    }
}

// destroy
impl Renderer {
    /// 等待设备空闲，drain 全局 deinit stack，最后销毁设备
    pub fn destroy(self) -> FatalResult<()> {
        let _span = tracy_client::span!("Renderer::destroy");
        let Self { mut gfx, runtime, .. } = self;

        runtime.destroy(&mut gfx)?;
        gfx.destroy();
        log::info!("renderer destroyed");
        Ok(())
    }
}

// getters
impl Renderer {
    #[inline]
    pub fn gfx(&self) -> &Gfx {
        &self.gfx
    }

    /// 下一帧的序号
    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.runtime.pacer().frame_id()
    }

    #[inline]
    pub fn current_draw_target(&self) -> &DrawImage {
        self.runtime.current_draw_target()
    }

    #[inline]
    pub fn registry(&self) -> &BindlessRegistry {
        self.runtime.registry()
    }
}

// resources
impl Renderer {
    /// 注册到 bindless table，返回的 id 可以直接在 shader 中使用
    ///
    /// 写入会在下一帧录制之前完成
    pub fn register<K: BindingKind>(&mut self, info: K::Info) -> FatalResult<DescriptorId<K>> {
        self.runtime.register::<K>(info)
    }

    /// id 在引用它的帧执行完成之后才会被复用
    pub fn release<K: BindingKind>(&mut self, id: DescriptorId<K>) -> FatalResult<()> {
        self.runtime.release(id)
    }

    /// 在引用它的帧执行完成之后销毁
    pub fn destroy_deferred(&mut self, object: GpuObject) {
        self.runtime.destroy_deferred(object);
    }

    /// 在渲染器销毁时销毁
    pub fn destroy_on_shutdown(&mut self, object: GpuObject) {
        self.runtime.destroy_on_shutdown(object);
    }

    /// 同步执行一次性的命令
    pub fn submit_immediate<R>(&mut self, record: impl FnOnce(&GfxCommandBuffer) -> R) -> FatalResult<R> {
        let _span = tracy_client::span!("Renderer::submit_immediate");
        self.runtime
            .submit_immediate(&mut self.gfx, |gfx, cmd| record(&GfxCommandBuffer::new(gfx.gfx_device(), cmd)))
    }

    /// 创建 device local 的 buffer，并通过 staging buffer 上传初始数据
    ///
    /// 返回的 buffer 由调用方持有，需要通过 `destroy_deferred` 或者 `destroy_on_shutdown` 销毁。
    /// 数据为空时返回 `FatalError::EmptyUpload`
    pub fn upload_buffer(
        &mut self,
        data: &[u8],
        usage: vk::BufferUsageFlags,
        name: impl Into<String>,
    ) -> FatalResult<AllocatedBuffer> {
        let _span = tracy_client::span!("Renderer::upload_buffer");
        self.runtime.upload_buffer(&mut self.gfx, data, usage, name)
    }
}

// update
impl Renderer {
    /// 窗口尺寸变化，在下一帧之前重建 swapchain
    #[inline]
    pub fn on_resize(&mut self, width: u32, height: u32) {
        self.runtime.on_resize(width, height);
    }

    /// 渲染一帧
    ///
    /// draw image 先被清屏或者由 background shader 填充，然后执行 `record`，最后 blit 到 swapchain image 并 present。
    /// 窗口最小化或者 swapchain 过期时这一帧被丢弃。
    pub fn render_frame(&mut self, record: impl FnOnce(&FrameRecorder)) -> FatalResult<FrameOutcome> {
        let _span = tracy_client::span!("Renderer::render_frame");

        let background = self.background.as_ref();
        let clear_color = self.clear_color;
        let outcome = self.runtime.render_frame(&mut self.gfx, |gfx, frame, swapchain| {
            record_frame(gfx, background, clear_color, frame, swapchain, record)
        })?;

        if matches!(outcome, FrameOutcome::Rendered { .. }) {
            tracy_client::frame_mark();
        }
        Ok(outcome)
    }
}

fn record_frame(
    gfx: &Gfx,
    background: Option<&BackgroundPass>,
    clear_color: [f32; 4],
    frame: &ActiveFrame,
    swapchain: &SwapchainManager,
    record: impl FnOnce(&FrameRecorder),
) {
    let _span = tracy_client::span!("Renderer::record_frame");

    let cmd = GfxCommandBuffer::new(gfx.gfx_device(), frame.command_buffer);
    let draw_target = *swapchain.current_draw_target();
    let draw_image = draw_target.image.image;
    let bindless_table = gfx.bindless_table();

    // 上一帧的内容不需要保留
    cmd.transition_image(draw_image, vk::ImageLayout::UNDEFINED, vk::ImageLayout::GENERAL);
    match background {
        Some(background) => background.draw(&cmd, bindless_table, &draw_target),
        None => cmd.cmd_clear_color_image(draw_image, vk::ImageLayout::GENERAL, clear_color),
    }

    record(&FrameRecorder {
        cmd,
        frame: *frame,
        draw_target,
        pipeline_layout: bindless_table.pipeline_layout(),
        bindless_set: bindless_table.descriptor_set(),
    });

    // draw image -> swapchain image
    let swapchain_image = swapchain.swapchain_image(frame.swapchain_image_index);
    cmd.transition_image(draw_image, vk::ImageLayout::GENERAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
    cmd.transition_image(swapchain_image, vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    cmd.cmd_blit_image(draw_image, draw_target.extent(), swapchain_image, swapchain.swapchain_extent());
    cmd.transition_image(swapchain_image, vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::PRESENT_SRC_KHR);
}
