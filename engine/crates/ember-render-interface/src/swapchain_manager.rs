use ash::vk;
use ember_gfx::{
    gpu_device::{GpuDevice, GpuObject},
    resources::{image::AllocatedImage, image::GfxImageDesc, image_view::GfxImageViewDesc},
    swapchain::render_swapchain::{GfxSwapchainDesc, GfxSwapchainImages},
};

use crate::{
    bindless_registry::BindlessRegistry,
    deinit_stack::{DeinitStack, DeviceDispatcher},
    descriptor_id::{StorageImageId, kind},
    error::FatalResult,
};

/// 引擎实际渲染的目标格式，和 swapchain 的格式无关
pub const DRAW_IMAGE_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;

/// 引擎渲染的中间目标，每帧最后 blit 到 swapchain image 上
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DrawImage {
    pub image: AllocatedImage,
    pub view: vk::ImageView,
    /// 以 storage image 的形式注册到 bindless table
    pub storage_id: StorageImageId,
}
impl DrawImage {
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent
    }
}

/// swapchain 创建参数中和窗口无关的部分
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SwapchainSettings {
    /// presentable image 的数量，和 frame overlap 无关
    pub image_count: u32,
    pub present_mode: vk::PresentModeKHR,
}

/// 管理 swapchain 以及 draw image
///
/// draw image 的尺寸始终等于最近一次成功 rebuild 时的窗口尺寸
pub struct SwapchainManager {
    settings: SwapchainSettings,
    swapchain: GfxSwapchainImages,
    draw_image: DrawImage,
}

// new & init
impl SwapchainManager {
    /// swapchain、image view 以及 draw image 按创建顺序 push 到 `global_deinit`
    pub fn create<D: GpuDevice>(
        device: &mut D,
        registry: &mut BindlessRegistry,
        global_deinit: &mut DeinitStack<GpuObject>,
        settings: SwapchainSettings,
        window_extent: vk::Extent2D,
    ) -> FatalResult<Self> {
        debug_assert!(window_extent.width > 0 && window_extent.height > 0);

        let swapchain = Self::create_swapchain(device, global_deinit, settings, window_extent)?;
        let draw_image = Self::create_draw_image(device, registry, global_deinit, window_extent)?;

        Ok(Self {
            settings,
            swapchain,
            draw_image,
        })
    }

    fn create_swapchain<D: GpuDevice>(
        device: &mut D,
        global_deinit: &mut DeinitStack<GpuObject>,
        settings: SwapchainSettings,
        window_extent: vk::Extent2D,
    ) -> FatalResult<GfxSwapchainImages> {
        let swapchain = device.create_swapchain(&GfxSwapchainDesc {
            window_extent,
            image_count: settings.image_count,
            present_mode: settings.present_mode,
        })?;
        // image 属于 swapchain，只需要销毁 view；view 在 swapchain 之前销毁
        global_deinit.push(GpuObject::Swapchain(swapchain.swapchain));
        for view in &swapchain.views {
            global_deinit.push(GpuObject::ImageView(*view));
        }

        log::info!(
            "swapchain created: {}x{}, {} images, {:?}",
            swapchain.extent.width,
            swapchain.extent.height,
            swapchain.images.len(),
            swapchain.format
        );
        Ok(swapchain)
    }

    fn create_draw_image<D: GpuDevice>(
        device: &mut D,
        registry: &mut BindlessRegistry,
        global_deinit: &mut DeinitStack<GpuObject>,
        extent: vk::Extent2D,
    ) -> FatalResult<DrawImage> {
        let image = device.create_image(&GfxImageDesc::new_storage_image(extent, DRAW_IMAGE_FORMAT, "draw-image"))?;
        global_deinit.push(GpuObject::Image(image));
        let view = device.create_image_view(image.image, &GfxImageViewDesc::new_color_2d(DRAW_IMAGE_FORMAT), "draw-image")?;
        global_deinit.push(GpuObject::ImageView(view));

        let storage_id = registry.register::<kind::StorageImage>(view)?;
        log::debug!("draw image created: {}x{}, {:?}", extent.width, extent.height, storage_id);

        Ok(DrawImage {
            image,
            view,
            storage_id,
        })
    }
}

// getters
impl SwapchainManager {
    #[inline]
    pub fn swapchain(&self) -> vk::SwapchainKHR {
        self.swapchain.swapchain
    }

    #[inline]
    pub fn swapchain_image(&self, image_index: u32) -> vk::Image {
        self.swapchain.images[image_index as usize]
    }

    #[inline]
    pub fn swapchain_image_count(&self) -> usize {
        self.swapchain.images.len()
    }

    #[inline]
    pub fn swapchain_extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    #[inline]
    pub fn swapchain_format(&self) -> vk::Format {
        self.swapchain.format
    }

    #[inline]
    pub fn current_draw_target(&self) -> &DrawImage {
        &self.draw_image
    }

    #[inline]
    pub fn settings(&self) -> SwapchainSettings {
        self.settings
    }

    /// 当前 swapchain 以及 draw image 在全局 deinit stack 中的对象
    fn owned_objects(&self) -> Vec<GpuObject> {
        let mut objects = vec![GpuObject::Swapchain(self.swapchain.swapchain)];
        objects.extend(self.swapchain.views.iter().map(|view| GpuObject::ImageView(*view)));
        objects.push(GpuObject::Image(self.draw_image.image));
        objects.push(GpuObject::ImageView(self.draw_image.view));
        objects
    }
}

// update
impl SwapchainManager {
    /// 窗口尺寸变化或者 present 报告过期时重建 swapchain 和 draw image
    ///
    /// resize 很少发生，等待 queue 空闲之后从 `global_deinit` 中提前销毁旧的对象，新对象重新 push。
    /// draw image 的旧 id 通过 `release` 两阶段回收，新 id 重新分配。
    ///
    /// 窗口面积为 0 时不能调用
    pub fn rebuild<D: GpuDevice>(
        &mut self,
        device: &mut D,
        registry: &mut BindlessRegistry,
        global_deinit: &mut DeinitStack<GpuObject>,
        window_extent: vk::Extent2D,
        retire_frame: Option<u64>,
    ) -> FatalResult<()> {
        debug_assert!(window_extent.width > 0 && window_extent.height > 0);
        log::info!("rebuilding swapchain: {}x{}", window_extent.width, window_extent.height);

        device.queue_wait_idle()?;

        // id 走正常的两阶段回收，等引用它的帧完成之后才会复用
        registry.release(self.draw_image.storage_id, retire_frame)?;
        let old_objects = self.owned_objects();
        let destroyed =
            global_deinit.drain_where(|object| old_objects.contains(object), &mut DeviceDispatcher(&mut *device));
        if destroyed != old_objects.len() {
            log::error!("swapchain rebuild destroyed {} of {} old objects", destroyed, old_objects.len());
        }

        self.swapchain = Self::create_swapchain(device, global_deinit, self.settings, window_extent)?;
        self.draw_image = Self::create_draw_image(device, registry, global_deinit, window_extent)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ember_gfx::descriptors::bindless_table::DescriptorKind;

    use super::*;
    use crate::test_utils::mock_device::{MockDevice, MockEvent};

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    fn settings() -> SwapchainSettings {
        SwapchainSettings {
            image_count: 3,
            present_mode: vk::PresentModeKHR::FIFO,
        }
    }

    #[test]
    fn test_create() {
        let mut device = MockDevice::new();
        let mut registry = BindlessRegistry::new([0, 0, 0, 8, 0]);
        let mut global_deinit = DeinitStack::new("global");
        let manager =
            SwapchainManager::create(&mut device, &mut registry, &mut global_deinit, settings(), extent(800, 600))
                .unwrap();

        assert_eq!(manager.swapchain_image_count(), 3);
        assert_eq!(manager.current_draw_target().extent(), extent(800, 600));
        assert_eq!(manager.current_draw_target().image.format, DRAW_IMAGE_FORMAT);
        assert!(registry.is_live(manager.current_draw_target().storage_id));
        assert_eq!(registry.pending_write_count(), 1);
        // swapchain + 3 个 view + draw image + draw image view
        assert_eq!(global_deinit.len(), 6);

        global_deinit.drain(&mut DeviceDispatcher(&mut device));
        assert_eq!(device.live_object_count(), 0);
        assert_eq!(device.live_allocation_count(), 0);
    }

    #[test]
    fn test_rebuild_replaces_draw_image() {
        let mut device = MockDevice::new();
        let mut registry = BindlessRegistry::new([0, 0, 0, 8, 0]);
        let mut global_deinit = DeinitStack::new("global");
        let mut manager =
            SwapchainManager::create(&mut device, &mut registry, &mut global_deinit, settings(), extent(800, 600))
                .unwrap();
        let old = *manager.current_draw_target();
        let old_swapchain = manager.swapchain();

        device.clear_events();
        manager.rebuild(&mut device, &mut registry, &mut global_deinit, extent(1024, 768), Some(4)).unwrap();

        // 先等待 queue 空闲，再销毁旧对象
        assert_eq!(device.events()[0], MockEvent::QueueWaitIdle);
        assert!(!device.is_live(old_swapchain));
        assert!(!device.is_live(old.view));
        assert!(!device.is_live(old.image.image));
        // view 先于 swapchain 销毁，draw image view 先于 draw image 销毁
        let destroyed = device.destroyed_objects();
        assert_eq!(destroyed.len(), 6);
        assert_eq!(destroyed[0], GpuObject::ImageView(old.view));
        assert_eq!(destroyed[1], GpuObject::Image(old.image));
        assert_eq!(destroyed[5], GpuObject::Swapchain(old_swapchain));
        assert_eq!(global_deinit.len(), 6);

        let new = *manager.current_draw_target();
        assert_eq!(new.extent(), extent(1024, 768));
        assert_eq!(manager.swapchain_extent(), extent(1024, 768));
        assert_ne!(new.storage_id, old.storage_id);
        assert!(registry.is_live(new.storage_id));
        assert!(!registry.is_live(old.storage_id));
        assert_eq!(registry.pending_release_count(DescriptorKind::StorageImage), 1);

        // 第 4 帧完成之后，旧 id 可以复用
        registry.reclaim(4);
        let reused = registry.register::<kind::StorageImage>(vk::ImageView::null()).unwrap();
        assert_eq!(reused, old.storage_id);

        global_deinit.drain(&mut DeviceDispatcher(&mut device));
    }

    #[test]
    fn test_global_drain_after_rebuild_leaves_nothing_alive() {
        let mut device = MockDevice::new();
        let mut registry = BindlessRegistry::new([0, 0, 0, 8, 0]);
        let mut global_deinit = DeinitStack::new("global");
        let mut manager =
            SwapchainManager::create(&mut device, &mut registry, &mut global_deinit, settings(), extent(320, 240))
                .unwrap();
        manager.rebuild(&mut device, &mut registry, &mut global_deinit, extent(640, 480), None).unwrap();
        manager.rebuild(&mut device, &mut registry, &mut global_deinit, extent(800, 600), None).unwrap();

        // 重建不会在全局 deinit stack 中留下已经销毁的对象
        global_deinit.drain(&mut DeviceDispatcher(&mut device));
        assert_eq!(device.live_object_count(), 0);
        assert_eq!(device.live_allocation_count(), 0);
    }
}
