use ash::vk;

/// 一次 queue submit 所需的全部信息：一个 command buffer，可选的 wait / signal semaphore 以及 fence
///
/// 只使用 binary semaphore
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct GfxSubmitInfo {
    pub command_buffer: vk::CommandBuffer,
    pub wait: Option<(vk::Semaphore, vk::PipelineStageFlags2)>,
    pub signal: Option<(vk::Semaphore, vk::PipelineStageFlags2)>,
    pub fence: Option<vk::Fence>,
}

impl GfxSubmitInfo {
    pub fn new(command_buffer: vk::CommandBuffer) -> Self {
        Self {
            command_buffer,
            ..Default::default()
        }
    }

    #[inline]
    pub fn wait(mut self, semaphore: vk::Semaphore, stage: vk::PipelineStageFlags2) -> Self {
        self.wait = Some((semaphore, stage));
        self
    }

    #[inline]
    pub fn signal(mut self, semaphore: vk::Semaphore, stage: vk::PipelineStageFlags2) -> Self {
        self.signal = Some((semaphore, stage));
        self
    }

    #[inline]
    pub fn fence(mut self, fence: vk::Fence) -> Self {
        self.fence = Some(fence);
        self
    }

    /// 转换为 vk 结构体后交给 `f`，保证其引用的数组在 `f` 执行期间有效
    pub fn with_vk_submit_info<R>(&self, f: impl FnOnce(&vk::SubmitInfo2) -> R) -> R {
        let command_buffers = [vk::CommandBufferSubmitInfo::default().command_buffer(self.command_buffer)];
        let semaphore_info = |(semaphore, stage): (vk::Semaphore, vk::PipelineStageFlags2)| {
            vk::SemaphoreSubmitInfo::default().semaphore(semaphore).stage_mask(stage)
        };
        let wait_infos: Vec<_> = self.wait.into_iter().map(semaphore_info).collect();
        let signal_infos: Vec<_> = self.signal.into_iter().map(semaphore_info).collect();

        let submit_info = vk::SubmitInfo2::default()
            .command_buffer_infos(&command_buffers)
            .wait_semaphore_infos(&wait_infos)
            .signal_semaphore_infos(&signal_infos);
        f(&submit_info)
    }
}
