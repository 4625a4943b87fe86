use ash::vk;

use crate::error::{GfxError, GfxResult};

/// 首选的 presentable image 格式，不支持时使用 surface 报告的第一个格式
pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// 创建 swapchain 所需的参数
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GfxSwapchainDesc {
    /// 窗口的物理尺寸
    pub window_extent: vk::Extent2D,
    /// 期望的 presentable image 数量，会被 clamp 到 surface 支持的范围内
    pub image_count: u32,
    pub present_mode: vk::PresentModeKHR,
}

/// 创建完成的 swapchain 以及它的 image 和 image view
///
/// image 属于 swapchain，只需要销毁 image view 和 swapchain 本身
#[derive(Clone, Debug, Default)]
pub struct GfxSwapchainImages {
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

/// acquire 的结果，OUT_OF_DATE 不是错误，而是需要重建 swapchain
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired { image_index: u32, suboptimal: bool },
    OutOfDate,
}

/// present 的结果
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Optimal,
    Suboptimal,
    OutOfDate,
}
impl PresentOutcome {
    #[inline]
    pub fn need_rebuild(self) -> bool {
        self != PresentOutcome::Optimal
    }
}

/// swapchain 创建过程中的纯计算部分
pub struct GfxSwapchainSettings;
impl GfxSwapchainSettings {
    /// 确定 swapchain 的 extent 尺寸
    ///
    /// 如果 surface_capabilities.current_extent 包含特殊值 0xFFFFFFFF，则表示可以自己设置交换链的 extent
    pub fn calculate_swapchain_extent(
        surface_capabilities: &vk::SurfaceCapabilitiesKHR,
        window_physical_extent: vk::Extent2D,
    ) -> vk::Extent2D {
        let surface_extent = surface_capabilities.current_extent;
        if surface_extent.width == 0xFFFFFFFF || surface_extent.height == 0xFFFFFFFF {
            let width = window_physical_extent
                .width
                .clamp(surface_capabilities.min_image_extent.width, surface_capabilities.max_image_extent.width);
            let height = window_physical_extent
                .height
                .clamp(surface_capabilities.min_image_extent.height, surface_capabilities.max_image_extent.height);
            vk::Extent2D { width, height }
        } else {
            surface_extent
        }
    }

    /// max_image_count == 0，表示不限制 image 数量
    pub fn calculate_image_count(surface_capabilities: &vk::SurfaceCapabilitiesKHR, desired: u32) -> u32 {
        let count = desired.max(surface_capabilities.min_image_count);
        if surface_capabilities.max_image_count == 0 {
            count
        } else {
            count.min(surface_capabilities.max_image_count)
        }
    }

    pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> GfxResult<vk::SurfaceFormatKHR> {
        formats
            .iter()
            .find(|f| **f == PREFERRED_SURFACE_FORMAT)
            .or_else(|| formats.first())
            .copied()
            .ok_or_else(|| {
                log::error!("surface reports no formats");
                GfxError::NoSurfaceFormat
            })
    }

    /// FIFO 一定受支持
    pub fn choose_present_mode(supported: &[vk::PresentModeKHR], desired: vk::PresentModeKHR) -> vk::PresentModeKHR {
        if supported.contains(&desired) {
            desired
        } else {
            log::warn!("present mode {:?} is not supported, fallback to FIFO", desired);
            vk::PresentModeKHR::FIFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(current: (u32, u32), min_count: u32, max_count: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            min_image_count: min_count,
            max_image_count: max_count,
            ..Default::default()
        }
    }

    #[test]
    fn test_extent_follows_surface() {
        let caps = caps((800, 600), 2, 8);
        let extent = GfxSwapchainSettings::calculate_swapchain_extent(
            &caps,
            vk::Extent2D {
                width: 1920,
                height: 1080,
            },
        );
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn test_extent_wildcard_uses_window_clamped() {
        let caps = caps((0xFFFFFFFF, 0xFFFFFFFF), 2, 8);
        let extent = GfxSwapchainSettings::calculate_swapchain_extent(
            &caps,
            vk::Extent2D {
                width: 8000,
                height: 720,
            },
        );
        assert_eq!((extent.width, extent.height), (4096, 720));
    }

    #[test]
    fn test_image_count_clamped() {
        assert_eq!(GfxSwapchainSettings::calculate_image_count(&caps((1, 1), 2, 8), 3), 3);
        assert_eq!(GfxSwapchainSettings::calculate_image_count(&caps((1, 1), 4, 8), 3), 4);
        assert_eq!(GfxSwapchainSettings::calculate_image_count(&caps((1, 1), 1, 2), 3), 2);
        // 0 表示不限制
        assert_eq!(GfxSwapchainSettings::calculate_image_count(&caps((1, 1), 2, 0), 5), 5);
    }

    #[test]
    fn test_choose_surface_format() {
        let other = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(
            GfxSwapchainSettings::choose_surface_format(&[other, PREFERRED_SURFACE_FORMAT]).unwrap(),
            PREFERRED_SURFACE_FORMAT
        );
        assert_eq!(GfxSwapchainSettings::choose_surface_format(&[other]).unwrap(), other);
        assert!(matches!(
            GfxSwapchainSettings::choose_surface_format(&[]),
            Err(GfxError::NoSurfaceFormat)
        ));
    }

    #[test]
    fn test_present_mode_fallback() {
        let supported = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(
            GfxSwapchainSettings::choose_present_mode(&supported, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(
            GfxSwapchainSettings::choose_present_mode(&supported, vk::PresentModeKHR::IMMEDIATE),
            vk::PresentModeKHR::IMMEDIATE
        );
    }
}
