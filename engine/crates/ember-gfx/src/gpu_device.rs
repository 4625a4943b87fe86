use ash::vk;

use crate::{
    commands::submit_info::GfxSubmitInfo,
    descriptors::bindless_table::GfxBindlessWrite,
    error::GfxResult,
    resources::{
        buffer::{AllocatedBuffer, GfxBufferDesc},
        image::{AllocatedImage, GfxImageDesc},
        image_view::GfxImageViewDesc,
        sampler::GfxSamplerDesc,
    },
    swapchain::render_swapchain::{AcquireOutcome, GfxSwapchainDesc, GfxSwapchainImages, PresentOutcome},
};

/// 需要延迟销毁的 GPU 对象
///
/// 创建时将对应的值放入 deinit stack，销毁时由 `GpuDevice::destroy_object` 统一处理
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GpuObject {
    Buffer(AllocatedBuffer),
    Image(AllocatedImage),
    ImageView(vk::ImageView),
    Sampler(vk::Sampler),
    Fence(vk::Fence),
    Semaphore(vk::Semaphore),
    CommandPool(vk::CommandPool),
    Swapchain(vk::SwapchainKHR),
    Pipeline(vk::Pipeline),
    ShaderModule(vk::ShaderModule),
}

/// runtime core 与 GPU 之间的边界
///
/// 所有方法都只在主线程调用。真实实现是 `Gfx`，测试中使用记录调用的 mock。
pub trait GpuDevice {
    // sync
    fn create_fence(&mut self, signaled: bool, debug_name: &str) -> GfxResult<vk::Fence>;
    fn create_semaphore(&mut self, debug_name: &str) -> GfxResult<vk::Semaphore>;
    /// 超时返回 `GfxError::Timeout`
    fn wait_fence(&mut self, fence: vk::Fence, timeout_ns: u64) -> GfxResult<()>;
    fn reset_fence(&mut self, fence: vk::Fence) -> GfxResult<()>;

    // commands
    /// 使用 gfx queue family，带有 RESET_COMMAND_BUFFER flag
    fn create_command_pool(&mut self, debug_name: &str) -> GfxResult<vk::CommandPool>;
    fn allocate_command_buffer(&mut self, pool: vk::CommandPool, debug_name: &str) -> GfxResult<vk::CommandBuffer>;
    /// 重置 command buffer 并以 ONE_TIME_SUBMIT 开始录制
    fn begin_command_buffer(&mut self, command_buffer: vk::CommandBuffer) -> GfxResult<()>;
    fn end_command_buffer(&mut self, command_buffer: vk::CommandBuffer) -> GfxResult<()>;
    fn cmd_copy_buffer(
        &mut self,
        command_buffer: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: &[vk::BufferCopy],
    );
    fn submit(&mut self, submit_info: &GfxSubmitInfo) -> GfxResult<()>;
    fn queue_wait_idle(&mut self) -> GfxResult<()>;
    fn device_wait_idle(&mut self) -> GfxResult<()>;

    // swapchain
    /// 根据 window extent 和 surface 的能力创建 swapchain，以及每个 image 的 view
    fn create_swapchain(&mut self, desc: &GfxSwapchainDesc) -> GfxResult<GfxSwapchainImages>;
    fn acquire_next_image(
        &mut self,
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
        timeout_ns: u64,
    ) -> GfxResult<AcquireOutcome>;
    fn present(
        &mut self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> GfxResult<PresentOutcome>;

    // resources
    fn create_buffer(&mut self, desc: &GfxBufferDesc) -> GfxResult<AllocatedBuffer>;
    /// 写入 host visible 的 buffer，buffer 已经销毁时返回 `GfxError::Destroyed`
    fn write_buffer(&mut self, buffer: &AllocatedBuffer, data: &[u8]) -> GfxResult<()>;
    fn create_image(&mut self, desc: &GfxImageDesc) -> GfxResult<AllocatedImage>;
    fn create_image_view(
        &mut self,
        image: vk::Image,
        desc: &GfxImageViewDesc,
        debug_name: &str,
    ) -> GfxResult<vk::ImageView>;
    fn create_sampler(&mut self, desc: &GfxSamplerDesc, debug_name: &str) -> GfxResult<vk::Sampler>;

    // bindless
    /// 一次性写入所有 pending 的 descriptor
    fn write_bindless(&mut self, writes: &[GfxBindlessWrite]) -> GfxResult<()>;

    // destroy
    fn destroy_object(&mut self, object: GpuObject);
}
