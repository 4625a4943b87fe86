use ash::vk;
use ember_gfx::{
    commands::submit_info::GfxSubmitInfo,
    error::GfxError,
    gpu_device::{GpuDevice, GpuObject},
};

use crate::{
    deinit_stack::DeinitStack,
    error::{FatalError, FatalResult},
};

/// 同步执行一次性的 GPU 命令，例如初始数据上传、layout 转换
///
/// 使用独立的 command pool、command buffer 和 fence，不和帧循环共享。只能在渲染线程中使用。
pub struct ImmediateSubmitter {
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
    timeout_ns: u64,
}

// new & init
impl ImmediateSubmitter {
    /// pool 和 fence 按创建顺序 push 到 `global_deinit`
    pub fn new<D: GpuDevice>(
        device: &mut D,
        timeout_ns: u64,
        global_deinit: &mut DeinitStack<GpuObject>,
    ) -> FatalResult<Self> {
        let command_pool = device.create_command_pool("immediate-pool")?;
        global_deinit.push(GpuObject::CommandPool(command_pool));
        let command_buffer = device.allocate_command_buffer(command_pool, "immediate-cmd")?;
        let fence = device.create_fence(false, "immediate-fence")?;
        global_deinit.push(GpuObject::Fence(fence));

        Ok(Self {
            command_pool,
            command_buffer,
            fence,
            timeout_ns,
        })
    }
}

// getters
impl ImmediateSubmitter {
    #[inline]
    pub fn command_pool(&self) -> vk::CommandPool {
        self.command_pool
    }

    #[inline]
    pub fn fence(&self) -> vk::Fence {
        self.fence
    }
}

// update
impl ImmediateSubmitter {
    /// 录制 `record` 中的命令，提交到 graphics queue，并阻塞直到执行完成
    ///
    /// 超时视为 GPU hang，返回 `FatalError::ImmediateTimeout`
    pub fn submit_immediate<D, R>(
        &mut self,
        device: &mut D,
        record: impl FnOnce(&mut D, vk::CommandBuffer) -> R,
    ) -> FatalResult<R>
    where
        D: GpuDevice,
    {
        device.reset_fence(self.fence)?;
        device.begin_command_buffer(self.command_buffer)?;
        let result = record(device, self.command_buffer);
        device.end_command_buffer(self.command_buffer)?;

        device.submit(&GfxSubmitInfo::new(self.command_buffer).fence(self.fence))?;
        device.wait_fence(self.fence, self.timeout_ns).map_err(|err| match err {
            GfxError::Timeout { timeout_ns, .. } => {
                log::error!("immediate submission timeout");
                FatalError::ImmediateTimeout { timeout_ns }
            }
            err => err.into(),
        })?;

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        deinit_stack::DeviceDispatcher,
        test_utils::mock_device::{MockDevice, MockEvent},
    };

    #[test]
    fn test_submit_blocks_until_done() {
        let mut device = MockDevice::new();
        let mut global_deinit = DeinitStack::new("global");
        let mut immediate = ImmediateSubmitter::new(&mut device, 1000, &mut global_deinit).unwrap();

        let mut recorded_into = None;
        let value = immediate
            .submit_immediate(&mut device, |_, cmd| {
                recorded_into = Some(cmd);
                42
            })
            .unwrap();
        assert_eq!(value, 42);

        let cmd = recorded_into.unwrap();
        let events = device.events().to_vec();
        assert_eq!(events.len(), 5);
        assert!(matches!(events[0], MockEvent::ResetFence(_)));
        assert_eq!(events[1], MockEvent::BeginCommandBuffer(cmd));
        assert_eq!(events[2], MockEvent::EndCommandBuffer(cmd));
        assert!(matches!(events[3], MockEvent::Submit { command_buffer, fence: Some(_) } if command_buffer == cmd));
        assert!(matches!(events[4], MockEvent::WaitFence(_)));
        global_deinit.drain(&mut DeviceDispatcher(&mut device));
    }

    #[test]
    fn test_can_submit_repeatedly() {
        let mut device = MockDevice::new();
        let mut global_deinit = DeinitStack::new("global");
        let mut immediate = ImmediateSubmitter::new(&mut device, 1000, &mut global_deinit).unwrap();
        for i in 0..3 {
            let buffer = immediate
                .submit_immediate(&mut device, |device, _| {
                    device.create_buffer(&ember_gfx::resources::buffer::GfxBufferDesc::new_stage_buffer(64, "stage"))
                })
                .unwrap()
                .unwrap();
            assert_eq!(buffer.size, 64, "submission {i}");
            device.destroy_object(GpuObject::Buffer(buffer));
        }
        global_deinit.drain(&mut DeviceDispatcher(&mut device));
        assert_eq!(device.live_object_count(), 0);
        // fence 比 pool 后创建，先销毁
        assert_eq!(
            device.destroyed_objects()[3..],
            [GpuObject::Fence(immediate.fence()), GpuObject::CommandPool(immediate.command_pool())]
        );
        assert_eq!(device.live_allocation_count(), 0);
    }

    #[test]
    fn test_timeout_is_fatal() {
        let mut device = MockDevice::new();
        let mut global_deinit = DeinitStack::new("global");
        let mut immediate = ImmediateSubmitter::new(&mut device, 7, &mut global_deinit).unwrap();
        device.gpu_hang = true;

        let err = immediate.submit_immediate(&mut device, |_, _| ()).unwrap_err();
        assert!(matches!(err, FatalError::ImmediateTimeout { timeout_ns: 7 }));
        global_deinit.drain(&mut DeviceDispatcher(&mut device));
    }
}
