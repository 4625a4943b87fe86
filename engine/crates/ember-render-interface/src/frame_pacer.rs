use ash::vk;
use ember_gfx::{
    commands::submit_info::GfxSubmitInfo,
    error::GfxError,
    gpu_device::{GpuDevice, GpuObject},
    swapchain::render_swapchain::{AcquireOutcome, PresentOutcome},
};

use crate::{
    bindless_registry::BindlessRegistry,
    deinit_stack::{DeinitStack, DeviceDispatcher},
    error::{FatalError, FatalResult},
    frame_context::FrameContext,
    frame_counter::{FrameCounter, FrameLabel},
};

/// 正在录制的一帧
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ActiveFrame {
    pub label: FrameLabel,
    pub frame_id: u64,
    pub command_buffer: vk::CommandBuffer,
    pub swapchain_image_index: u32,
}
impl ActiveFrame {
    #[inline]
    pub fn frame_name(&self) -> String {
        format!("[F{}{}]", self.frame_id, self.label)
    }
}

/// `begin_frame` 的结果
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameBegin {
    Ready(ActiveFrame),
    /// swapchain 已经过期，这一帧被丢弃，需要重建 swapchain
    Skipped,
}

/// `end_frame` 的结果
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PresentStatus {
    Presented,
    /// present 报告 swapchain 过期或者不再最优
    NeedsRebuild,
}

/// 帧调度：管理 overlap 个 frame context，保证 CPU 最多领先 GPU overlap 帧
///
/// 第 N 帧使用第 `N % overlap` 个 context，在录制之前等待这个 context 上一次（第 N - overlap 帧）提交的 fence。
///
/// # 每帧流程
/// ```ignore
/// match pacer.begin_frame(device, &mut registry, swapchain)? {
///     FrameBegin::Ready(frame) => {
///         // 使用 frame.command_buffer 录制
///         let status = pacer.end_frame(device, swapchain)?;
///     }
///     FrameBegin::Skipped => { /* 重建 swapchain */ }
/// }
/// ```
pub struct FramePacer {
    frames: Vec<FrameContext>,
    counter: FrameCounter,
    fence_timeout_ns: u64,

    /// 已知在 GPU 上执行完成的最新一帧
    last_completed: Option<u64>,
    /// 正在录制的帧
    active: Option<ActiveFrame>,
}

// new & init
impl FramePacer {
    /// frame context 的同步对象和命令对象 push 到 `global_deinit`
    pub fn new<D: GpuDevice>(
        device: &mut D,
        overlap: usize,
        fence_timeout_ns: u64,
        global_deinit: &mut DeinitStack<GpuObject>,
    ) -> FatalResult<Self> {
        let counter = FrameCounter::new(0, overlap);
        let frames = counter
            .frame_labels()
            .map(|label| FrameContext::new(device, label, global_deinit))
            .collect::<FatalResult<Vec<_>>>()?;

        log::info!("frame pacer created, overlap: {}", overlap);
        Ok(Self {
            frames,
            counter,
            fence_timeout_ns,
            last_completed: None,
            active: None,
        })
    }
}

// destroy
impl FramePacer {
    /// 等待 GPU 空闲，执行所有帧剩余的延迟销毁
    ///
    /// frame context 自身的对象由全局 deinit stack 销毁，需要在这之后 drain
    pub fn destroy<D: GpuDevice>(self, device: &mut D) -> FatalResult<()> {
        device.device_wait_idle()?;
        for frame in self.frames {
            frame.destroy(device);
        }
        log::info!("frame pacer destroyed");
        Ok(())
    }
}

// getters
impl FramePacer {
    /// 下一帧（或者正在录制的帧）的序号
    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.counter.frame_id()
    }

    #[inline]
    pub fn overlap(&self) -> usize {
        self.counter.overlap()
    }

    #[inline]
    pub fn frame_name(&self) -> String {
        self.counter.frame_name()
    }

    #[inline]
    pub fn completed_frame(&self) -> Option<u64> {
        self.last_completed
    }

    #[inline]
    pub fn active_frame(&self) -> Option<&ActiveFrame> {
        self.active.as_ref()
    }

    #[inline]
    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    #[inline]
    pub fn frame(&self, label: FrameLabel) -> &FrameContext {
        &self.frames[*label]
    }

    /// 最新一个已经开始录制的帧，没有则为 None
    fn newest_started_frame(&self) -> Option<u64> {
        match self.active {
            Some(active) => Some(active.frame_id),
            None => self.frame_id().checked_sub(1),
        }
    }

    /// 已经开始但还不确定是否完成的帧数，不会超过 overlap
    pub fn in_flight(&self) -> u64 {
        match (self.newest_started_frame(), self.last_completed) {
            (None, _) => 0,
            (Some(newest), None) => newest + 1,
            (Some(newest), Some(completed)) => newest - completed,
        }
    }

    /// 现在 release 的资源，最后可能被哪一帧引用
    ///
    /// 正在录制时是当前帧，否则是最近提交的帧。还没有提交过任何帧时为 None
    #[inline]
    pub fn retire_frame(&self) -> Option<u64> {
        self.newest_started_frame()
    }

    /// `retire_frame` 对应的延迟销毁队列，会在那一帧的 fence signal 之后执行
    pub fn retire_stack_mut(&mut self) -> &mut DeinitStack<GpuObject> {
        let frame_id = self.newest_started_frame().unwrap_or(0);
        let label = (frame_id % self.overlap() as u64) as usize;
        self.frames[label].deinit_stack_mut()
    }
}

// update
impl FramePacer {
    /// 开始一帧
    ///
    /// 1. 等待当前 context 的 fence，超时视为 GPU hang
    /// 2. 执行当前 context 的延迟销毁，并回收已经完成的帧 release 的 descriptor id
    /// 3. acquire swapchain image，过期时返回 `FrameBegin::Skipped`，fence 保持 signal 状态
    /// 4. reset fence，开始录制 command buffer，写入 pending 的 descriptor
    pub fn begin_frame<D: GpuDevice>(
        &mut self,
        device: &mut D,
        registry: &mut BindlessRegistry,
        swapchain: vk::SwapchainKHR,
    ) -> FatalResult<FrameBegin> {
        assert!(self.active.is_none(), "begin_frame called while {} is recording", self.frame_name());

        let frame_id = self.frame_id();
        let label = self.counter.frame_label();
        let frame = &mut self.frames[*label];

        device.wait_fence(frame.render_fence(), self.fence_timeout_ns).map_err(|err| match err {
            GfxError::Timeout { timeout_ns, .. } => {
                log::error!("[F{}{}] render fence timeout", frame_id, label);
                FatalError::FenceTimeout {
                    frame: frame_id,
                    slot: *label,
                    timeout_ns,
                }
            }
            err => err.into(),
        })?;
        frame.mark_idle();

        // 同一个 queue 上的提交按顺序完成
        if let Some(submitted) = frame.submitted_frame() {
            self.last_completed = Some(self.last_completed.map_or(submitted, |completed| completed.max(submitted)));
        }
        frame.deinit_stack_mut().drain(&mut DeviceDispatcher(&mut *device));
        if let Some(completed) = self.last_completed {
            registry.reclaim(completed);
        }

        let image_index = match device.acquire_next_image(swapchain, frame.acquire_semaphore(), self.fence_timeout_ns)? {
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => {
                if suboptimal {
                    log::debug!("[F{}{}] acquired suboptimal swapchain image", frame_id, label);
                }
                image_index
            }
            AcquireOutcome::OutOfDate => {
                log::info!("[F{}{}] swapchain out of date, frame skipped", frame_id, label);
                return Ok(FrameBegin::Skipped);
            }
        };

        // acquire 成功之后才 reset fence，丢弃的帧不会让 fence 停留在 unsignaled 状态
        device.reset_fence(frame.render_fence())?;
        device.begin_command_buffer(frame.command_buffer())?;
        frame.mark_recording();

        let active = ActiveFrame {
            label,
            frame_id,
            command_buffer: frame.command_buffer(),
            swapchain_image_index: image_index,
        };
        self.active = Some(active);

        // 录制任何命令之前，bindless table 需要和已经分配的 id 一致
        registry.flush_pending(device)?;

        log::trace!("{} begin, image {}", active.frame_name(), image_index);
        Ok(FrameBegin::Ready(active))
    }

    /// 结束当前帧：提交 command buffer 并 present
    ///
    /// 无论 present 的结果如何，帧序号都会增加
    pub fn end_frame<D: GpuDevice>(&mut self, device: &mut D, swapchain: vk::SwapchainKHR) -> FatalResult<PresentStatus> {
        let Some(active) = self.active.take() else {
            panic!("end_frame called without begin_frame");
        };
        let frame = &mut self.frames[*active.label];

        device.end_command_buffer(frame.command_buffer())?;
        let submit_info = GfxSubmitInfo::new(frame.command_buffer())
            .wait(frame.acquire_semaphore(), vk::PipelineStageFlags2::ALL_COMMANDS)
            .signal(frame.render_semaphore(), vk::PipelineStageFlags2::ALL_GRAPHICS)
            .fence(frame.render_fence());
        device.submit(&submit_info)?;
        frame.mark_submitted(active.frame_id);

        let outcome = device.present(swapchain, active.swapchain_image_index, frame.render_semaphore());
        self.counter.next_frame();

        match outcome? {
            PresentOutcome::Optimal => Ok(PresentStatus::Presented),
            outcome => {
                log::info!("{} present returned {:?}", active.frame_name(), outcome);
                Ok(PresentStatus::NeedsRebuild)
            }
        }
    }
}
