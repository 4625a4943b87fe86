use std::panic::Location;
use std::path::PathBuf;

use ash::prelude::VkResult;
use ash::vk;

/// GFX 层的错误
///
/// 所有 Vulkan 调用的失败都会带上调用名和调用位置，方便定位
#[derive(Debug, thiserror::Error)]
pub enum GfxError {
    #[error("{call} failed at {location}: {result:?}")]
    Vulkan {
        call: &'static str,
        result: vk::Result,
        location: &'static Location<'static>,
    },

    #[error("{call} timed out at {location} after {timeout_ns}ns waiting for {what}")]
    Timeout {
        call: &'static str,
        what: &'static str,
        timeout_ns: u64,
        location: &'static Location<'static>,
    },

    /// 资源已经被销毁，内存不再有效
    #[error("{what} {handle:#x} used after it was destroyed")]
    Destroyed { what: &'static str, handle: u64 },

    #[error("surface reports no supported formats")]
    NoSurfaceFormat,

    #[error("failed to load the Vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("no suitable physical device: {0}")]
    NoSuitableDevice(String),

    #[error("required instance {kind} is missing: {name}")]
    MissingInstanceSupport { kind: &'static str, name: String },

    #[error("failed to read shader {path:?}: {source}")]
    ShaderLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type GfxResult<T> = Result<T, GfxError>;

impl GfxError {
    /// 等待超时，和 `vk_check` 一样打印调用名和调用位置
    #[track_caller]
    pub fn timeout(call: &'static str, what: &'static str, timeout_ns: u64) -> Self {
        let location = Location::caller();
        log::error!("{} timed out at {} after {}ns waiting for {}", call, location, timeout_ns, what);
        GfxError::Timeout {
            call,
            what,
            timeout_ns,
            location,
        }
    }
}

/// 把 `VkResult` 转换为 `GfxResult`，失败时打印调用名和调用位置
pub trait VkResultExt<T> {
    fn vk_check(self, call: &'static str) -> GfxResult<T>;
}

impl<T> VkResultExt<T> for VkResult<T> {
    #[track_caller]
    #[inline]
    fn vk_check(self, call: &'static str) -> GfxResult<T> {
        match self {
            Ok(value) => Ok(value),
            Err(result) => {
                let location = Location::caller();
                log::error!("{} failed at {}: {:?}", call, location, result);
                Err(GfxError::Vulkan {
                    call,
                    result,
                    location,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vk_check_records_call_site() {
        let result: VkResult<u32> = Err(vk::Result::ERROR_DEVICE_LOST);
        let line = line!() + 1;
        let err = result.vk_check("vkQueueSubmit2").unwrap_err();
        match err {
            GfxError::Vulkan {
                call,
                result,
                location,
            } => {
                assert_eq!(call, "vkQueueSubmit2");
                assert_eq!(result, vk::Result::ERROR_DEVICE_LOST);
                assert_eq!(location.line(), line);
                assert!(location.file().ends_with("error.rs"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_timeout_records_call_site() {
        let line = line!() + 1;
        let err = GfxError::timeout("vkAcquireNextImageKHR", "swapchain image", 5);
        match err {
            GfxError::Timeout {
                call,
                what,
                timeout_ns,
                location,
            } => {
                assert_eq!(call, "vkAcquireNextImageKHR");
                assert_eq!(what, "swapchain image");
                assert_eq!(timeout_ns, 5);
                assert_eq!(location.line(), line);
                assert!(location.file().ends_with("error.rs"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_vk_check_passes_value_through() {
        let result: VkResult<u32> = Ok(7);
        assert_eq!(result.vk_check("vkGetSwapchainImagesKHR").unwrap(), 7);
    }
}
