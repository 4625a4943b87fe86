use ash::vk;

use crate::{
    error::{GfxResult, VkResultExt},
    foundation::debug_messenger::DebugType,
};

pub struct GfxSurface {
    pub(crate) handle: vk::SurfaceKHR,
    pub(crate) pf: ash::khr::surface::Instance,
}

// new & init
impl GfxSurface {
    pub fn new(
        vk_entry: &ash::Entry,
        instance: &ash::Instance,
        raw_display_handle: raw_window_handle::RawDisplayHandle,
        raw_window_handle: raw_window_handle::RawWindowHandle,
    ) -> GfxResult<Self> {
        let pf = ash::khr::surface::Instance::new(vk_entry, instance);
        let handle =
            unsafe { ash_window::create_surface(vk_entry, instance, raw_display_handle, raw_window_handle, None) }
                .vk_check("vkCreateSurfaceKHR")?;

        Ok(Self { handle, pf })
    }
}

// destroy
impl GfxSurface {
    pub fn destroy(self) {
        log::info!("destroying surface");
        unsafe { self.pf.destroy_surface(self.handle, None) }
    }
}

// getters
impl GfxSurface {
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    #[inline]
    pub fn pf(&self) -> &ash::khr::surface::Instance {
        &self.pf
    }

    /// 实时获取，窗口尺寸变化后会改变
    pub fn get_capabilities(&self, pdevice: vk::PhysicalDevice) -> GfxResult<vk::SurfaceCapabilitiesKHR> {
        unsafe { self.pf.get_physical_device_surface_capabilities(pdevice, self.handle) }
            .vk_check("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")
    }

    pub fn get_formats(&self, pdevice: vk::PhysicalDevice) -> GfxResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe { self.pf.get_physical_device_surface_formats(pdevice, self.handle) }
            .vk_check("vkGetPhysicalDeviceSurfaceFormatsKHR")
    }

    pub fn get_present_modes(&self, pdevice: vk::PhysicalDevice) -> GfxResult<Vec<vk::PresentModeKHR>> {
        unsafe { self.pf.get_physical_device_surface_present_modes(pdevice, self.handle) }
            .vk_check("vkGetPhysicalDeviceSurfacePresentModesKHR")
    }
}

impl DebugType for GfxSurface {
    fn debug_type_name() -> &'static str {
        "GfxSurface"
    }
    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
