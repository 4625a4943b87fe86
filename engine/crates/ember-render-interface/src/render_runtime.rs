use ash::vk;
use ember_gfx::{
    descriptors::bindless_table::DescriptorKind,
    gpu_device::{GpuDevice, GpuObject},
    resources::buffer::{AllocatedBuffer, GfxBufferDesc},
};

use crate::{
    bindless_registry::BindlessRegistry,
    config::RendererConfig,
    deinit_stack::{DeinitStack, DeviceDispatcher},
    descriptor_id::{BindingKind, DescriptorId},
    error::{FatalError, FatalResult},
    frame_pacer::{ActiveFrame, FrameBegin, FramePacer, PresentStatus},
    immediate::ImmediateSubmitter,
    swapchain_manager::{DrawImage, SwapchainManager, SwapchainSettings},
};

/// `render_frame` 的结果
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// 录制并提交了一帧，present 报告过期时会在下一帧之前重建
    Rendered { frame_id: u64 },
    /// 窗口面积为 0，没有做任何事情
    Minimized,
    /// acquire 时 swapchain 已经过期，这一帧被丢弃
    Skipped,
}

/// runtime core：bindless registry、帧调度、swapchain 以及立即提交，和具体的设备无关
///
/// 所有生命周期和 runtime 相同的 GPU 对象都 push 到全局 deinit stack，
/// `destroy` 时先等待设备空闲，再按创建的逆序销毁。
///
/// 只能在渲染线程中使用。
pub struct RenderRuntime {
    registry: BindlessRegistry,
    immediate: ImmediateSubmitter,
    swapchain: SwapchainManager,
    pacer: FramePacer,

    global_deinit: DeinitStack<GpuObject>,

    window_extent: vk::Extent2D,
    need_rebuild: bool,
}

// new & init
impl RenderRuntime {
    /// 窗口最小化时先用 1x1 创建 swapchain，等窗口恢复之后再重建
    pub fn new<D: GpuDevice>(
        device: &mut D,
        config: &RendererConfig,
        capacities: [u32; DescriptorKind::COUNT],
        window_extent: vk::Extent2D,
    ) -> FatalResult<Self> {
        let mut registry = BindlessRegistry::new(capacities);
        let mut global_deinit = DeinitStack::new("global");

        let immediate = ImmediateSubmitter::new(device, config.fence_timeout_ns(), &mut global_deinit)?;

        let minimized = is_zero_area(window_extent);
        let initial_extent = vk::Extent2D {
            width: window_extent.width.max(1),
            height: window_extent.height.max(1),
        };
        let swapchain = SwapchainManager::create(
            device,
            &mut registry,
            &mut global_deinit,
            SwapchainSettings {
                image_count: config.presentable_images,
                present_mode: config.present_mode.to_vk(),
            },
            initial_extent,
        )?;

        let pacer = FramePacer::new(device, config.frame_overlap, config.fence_timeout_ns(), &mut global_deinit)?;

        if minimized {
            log::info!("window minimized at startup, swapchain created as 1x1");
        }
        Ok(Self {
            registry,
            immediate,
            swapchain,
            pacer,
            global_deinit,
            window_extent,
            need_rebuild: minimized,
        })
    }
}

// destroy
impl RenderRuntime {
    /// 等待设备空闲，执行每帧剩余的延迟销毁，最后 drain 全局 deinit stack
    pub fn destroy<D: GpuDevice>(self, device: &mut D) -> FatalResult<()> {
        let Self {
            pacer,
            mut global_deinit,
            ..
        } = self;

        pacer.destroy(device)?;
        let destroyed = global_deinit.drain(&mut DeviceDispatcher(device));
        log::info!("render runtime destroyed, {} global objects", destroyed);
        Ok(())
    }
}

// getters
impl RenderRuntime {
    #[inline]
    pub fn registry(&self) -> &BindlessRegistry {
        &self.registry
    }

    #[inline]
    pub fn pacer(&self) -> &FramePacer {
        &self.pacer
    }

    #[inline]
    pub fn swapchain(&self) -> &SwapchainManager {
        &self.swapchain
    }

    #[inline]
    pub fn current_draw_target(&self) -> &DrawImage {
        self.swapchain.current_draw_target()
    }

    #[inline]
    pub fn window_extent(&self) -> vk::Extent2D {
        self.window_extent
    }

    #[inline]
    pub fn need_rebuild(&self) -> bool {
        self.need_rebuild
    }

    /// 生命周期和 runtime 相同的对象在这里登记
    #[inline]
    pub fn global_deinit_mut(&mut self) -> &mut DeinitStack<GpuObject> {
        &mut self.global_deinit
    }

    #[inline]
    fn window_minimized(&self) -> bool {
        is_zero_area(self.window_extent)
    }
}

// resources
impl RenderRuntime {
    /// 写入会在下一帧录制之前完成
    pub fn register<K: BindingKind>(&mut self, info: K::Info) -> FatalResult<DescriptorId<K>> {
        self.registry.register::<K>(info)
    }

    /// 以 `retire_frame` 标记，引用它的帧执行完成之后 id 才会被复用
    pub fn release<K: BindingKind>(&mut self, id: DescriptorId<K>) -> FatalResult<()> {
        self.registry.release(id, self.pacer.retire_frame())
    }

    /// 在引用它的帧执行完成之后销毁
    pub fn destroy_deferred(&mut self, object: GpuObject) {
        self.pacer.retire_stack_mut().push(object);
    }

    pub fn destroy_on_shutdown(&mut self, object: GpuObject) {
        self.global_deinit.push(object);
    }

    pub fn submit_immediate<D: GpuDevice, R>(
        &mut self,
        device: &mut D,
        record: impl FnOnce(&mut D, vk::CommandBuffer) -> R,
    ) -> FatalResult<R> {
        self.immediate.submit_immediate(device, record)
    }

    /// 创建 device local 的 buffer，并通过 staging buffer 上传初始数据
    ///
    /// 返回的 buffer 由调用方持有。staging buffer 在下一次复用当前 context 时销毁。
    pub fn upload_buffer<D: GpuDevice>(
        &mut self,
        device: &mut D,
        data: &[u8],
        usage: vk::BufferUsageFlags,
        name: impl Into<String>,
    ) -> FatalResult<AllocatedBuffer> {
        let name = name.into();
        if data.is_empty() {
            log::error!("buffer upload {:?} has no data", name);
            return Err(FatalError::EmptyUpload { name });
        }

        let size = data.len() as vk::DeviceSize;
        let buffer = device.create_buffer(&GfxBufferDesc::new_device(
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            name.clone(),
        ))?;
        let stage = device.create_buffer(&GfxBufferDesc::new_stage_buffer(size, format!("{name}-stage")))?;
        self.pacer.retire_stack_mut().push(GpuObject::Buffer(stage));

        let uploaded = device.write_buffer(&stage, data).map_err(FatalError::from).and_then(|()| {
            self.immediate.submit_immediate(device, |device, cmd| {
                device.cmd_copy_buffer(
                    cmd,
                    stage.buffer,
                    buffer.buffer,
                    &[vk::BufferCopy {
                        src_offset: 0,
                        dst_offset: 0,
                        size,
                    }],
                );
            })
        });
        if let Err(err) = uploaded {
            log::error!("upload into {} failed: {}", name, err);
            self.pacer.retire_stack_mut().push(GpuObject::Buffer(buffer));
            return Err(err);
        }

        log::debug!("uploaded {} bytes into {}", size, name);
        Ok(buffer)
    }
}

// update
impl RenderRuntime {
    /// 窗口尺寸变化，在下一帧之前重建 swapchain
    pub fn on_resize(&mut self, width: u32, height: u32) {
        let extent = vk::Extent2D { width, height };
        if extent != self.window_extent {
            log::debug!("window resized: {}x{}", width, height);
            self.window_extent = extent;
            self.need_rebuild = true;
        }
    }

    fn rebuild_swapchain<D: GpuDevice>(&mut self, device: &mut D) -> FatalResult<()> {
        self.swapchain.rebuild(
            device,
            &mut self.registry,
            &mut self.global_deinit,
            self.window_extent,
            self.pacer.retire_frame(),
        )?;
        self.need_rebuild = false;
        Ok(())
    }

    /// 驱动一帧
    ///
    /// 1. 窗口面积为 0 时直接返回
    /// 2. 需要重建时先重建 swapchain
    /// 3. begin_frame 过期时丢弃这一帧，并在下一帧之前重建
    /// 4. `record` 录制命令，end_frame 提交并 present
    pub fn render_frame<D: GpuDevice>(
        &mut self,
        device: &mut D,
        record: impl FnOnce(&mut D, &ActiveFrame, &SwapchainManager),
    ) -> FatalResult<FrameOutcome> {
        if self.window_minimized() {
            return Ok(FrameOutcome::Minimized);
        }
        if self.need_rebuild {
            self.rebuild_swapchain(device)?;
        }

        let frame = match self.pacer.begin_frame(device, &mut self.registry, self.swapchain.swapchain())? {
            FrameBegin::Ready(frame) => frame,
            FrameBegin::Skipped => {
                self.need_rebuild = true;
                return Ok(FrameOutcome::Skipped);
            }
        };

        record(device, &frame, &self.swapchain);

        if self.pacer.end_frame(device, self.swapchain.swapchain())? == PresentStatus::NeedsRebuild {
            self.need_rebuild = true;
        }
        Ok(FrameOutcome::Rendered {
            frame_id: frame.frame_id,
        })
    }
}

#[inline]
fn is_zero_area(extent: vk::Extent2D) -> bool {
    extent.width == 0 || extent.height == 0
}
