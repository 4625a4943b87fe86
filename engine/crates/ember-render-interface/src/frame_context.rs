use ash::vk;
use ember_gfx::gpu_device::{GpuDevice, GpuObject};

use crate::{
    deinit_stack::{DeinitStack, DeviceDispatcher},
    error::FatalResult,
    frame_counter::FrameLabel,
};

/// frame context 的状态：`Idle → Recording → Submitted → (fence signaled) → Idle`
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Recording,
    Submitted,
}

/// 一帧需要的同步对象和命令对象，每 overlap 帧复用一次
pub struct FrameContext {
    label: FrameLabel,

    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,

    /// swapchain image 可用时 signal，submit 时等待
    acquire_semaphore: vk::Semaphore,
    /// 渲染完成时 signal，present 时等待
    render_semaphore: vk::Semaphore,
    /// 渲染完成时 signal，CPU 在复用这个 context 之前等待
    render_fence: vk::Fence,

    /// 本帧的 GPU 工作完成之后才能执行的销毁动作
    deinit_stack: DeinitStack<GpuObject>,

    /// 最近一次使用这个 context 提交的帧
    submitted_frame: Option<u64>,
    state: FrameState,
}

// new & init
impl FrameContext {
    /// 创建的对象按创建顺序 push 到 `global_deinit`，由渲染器销毁时统一销毁
    pub fn new<D: GpuDevice>(
        device: &mut D,
        label: FrameLabel,
        global_deinit: &mut DeinitStack<GpuObject>,
    ) -> FatalResult<Self> {
        let command_pool = device.create_command_pool(&format!("frame-{label}-pool"))?;
        // command buffer 随 pool 一起释放
        global_deinit.push(GpuObject::CommandPool(command_pool));
        let command_buffer = device.allocate_command_buffer(command_pool, &format!("frame-{label}-cmd"))?;

        let acquire_semaphore = device.create_semaphore(&format!("frame-{label}-acquire"))?;
        global_deinit.push(GpuObject::Semaphore(acquire_semaphore));
        let render_semaphore = device.create_semaphore(&format!("frame-{label}-render"))?;
        global_deinit.push(GpuObject::Semaphore(render_semaphore));

        // 第一次使用时不需要等待
        let render_fence = device.create_fence(true, &format!("frame-{label}-fence"))?;
        global_deinit.push(GpuObject::Fence(render_fence));

        Ok(Self {
            label,
            command_pool,
            command_buffer,
            acquire_semaphore,
            render_semaphore,
            render_fence,
            deinit_stack: DeinitStack::new(format!("frame-{label}")),
            submitted_frame: None,
            state: FrameState::Idle,
        })
    }
}

// destroy
impl FrameContext {
    /// 执行本帧剩余的延迟销毁，调用之前需要保证 GPU 已经空闲
    ///
    /// context 自身的同步对象在全局 deinit stack 中
    pub fn destroy<D: GpuDevice>(mut self, device: &mut D) {
        self.deinit_stack.drain(&mut DeviceDispatcher(&mut *device));
    }
}

// getters
impl FrameContext {
    #[inline]
    pub fn label(&self) -> FrameLabel {
        self.label
    }
    #[inline]
    pub fn command_pool(&self) -> vk::CommandPool {
        self.command_pool
    }
    #[inline]
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }
    #[inline]
    pub fn acquire_semaphore(&self) -> vk::Semaphore {
        self.acquire_semaphore
    }
    #[inline]
    pub fn render_semaphore(&self) -> vk::Semaphore {
        self.render_semaphore
    }
    #[inline]
    pub fn render_fence(&self) -> vk::Fence {
        self.render_fence
    }
    #[inline]
    pub fn submitted_frame(&self) -> Option<u64> {
        self.submitted_frame
    }
    #[inline]
    pub fn state(&self) -> FrameState {
        self.state
    }
    #[inline]
    pub fn deinit_stack(&self) -> &DeinitStack<GpuObject> {
        &self.deinit_stack
    }
    #[inline]
    pub fn deinit_stack_mut(&mut self) -> &mut DeinitStack<GpuObject> {
        &mut self.deinit_stack
    }
}

// update
impl FrameContext {
    /// fence 已经 signal，上一次提交的工作全部完成
    pub(crate) fn mark_idle(&mut self) {
        self.state = FrameState::Idle;
    }

    pub(crate) fn mark_recording(&mut self) {
        debug_assert_eq!(self.state, FrameState::Idle);
        self.state = FrameState::Recording;
    }

    pub(crate) fn mark_submitted(&mut self, frame_id: u64) {
        debug_assert_eq!(self.state, FrameState::Recording);
        self.state = FrameState::Submitted;
        self.submitted_frame = Some(frame_id);
    }
}
