use std::path::{Path, PathBuf};

use ash::vk;
use ember_gfx::descriptors::bindless_table::DescriptorKind;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// 每种 descriptor 在全局 bindless table 中的数量
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DescriptorCapacity {
    pub uniform_buffer: u32,
    pub storage_buffer: u32,
    pub combined_sampler: u32,
    pub storage_image: u32,
    pub acceleration_structure: u32,
}
impl Default for DescriptorCapacity {
    fn default() -> Self {
        Self {
            uniform_buffer: u16::MAX as u32,
            storage_buffer: u16::MAX as u32,
            combined_sampler: u16::MAX as u32,
            storage_image: u16::MAX as u32,
            acceleration_structure: u16::MAX as u32,
        }
    }
}
impl DescriptorCapacity {
    /// 按 `DescriptorKind` 的顺序排列
    pub fn as_array(&self) -> [u32; DescriptorKind::COUNT] {
        [
            self.uniform_buffer,
            self.storage_buffer,
            self.combined_sampler,
            self.storage_image,
            self.acceleration_structure,
        ]
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresentModeConfig {
    /// 垂直同步
    #[default]
    Fifo,
    Mailbox,
    Immediate,
}
impl PresentModeConfig {
    pub fn to_vk(self) -> vk::PresentModeKHR {
        match self {
            PresentModeConfig::Fifo => vk::PresentModeKHR::FIFO,
            PresentModeConfig::Mailbox => vk::PresentModeKHR::MAILBOX,
            PresentModeConfig::Immediate => vk::PresentModeKHR::IMMEDIATE,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}
impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "ember".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

/// 渲染器配置，从 toml 文件中读取，缺省的字段使用默认值
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RendererConfig {
    /// 同时在 GPU 上执行的帧数
    pub frame_overlap: usize,
    /// swapchain 期望的 image 数量，和 frame_overlap 无关
    pub presentable_images: u32,
    pub descriptor_capacity: DescriptorCapacity,
    /// 开启 validation layer
    pub validation: bool,
    /// 等待 fence 以及 acquire image 的超时时间，超时视为 GPU hang
    pub fence_timeout_ms: u64,
    pub present_mode: PresentModeConfig,
    /// 每帧写入 draw image 的 compute shader（spv），不设置时使用 clear_color 清屏
    pub background_shader: Option<PathBuf>,
    pub clear_color: [f32; 4],
    /// `error` | `warn` | `info` | `debug` | `trace`，`RUST_LOG` 优先
    pub log_level: String,
    pub window: WindowConfig,
}
impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frame_overlap: 2,
            presentable_images: 3,
            descriptor_capacity: DescriptorCapacity::default(),
            validation: cfg!(debug_assertions),
            fence_timeout_ms: 1000,
            present_mode: PresentModeConfig::default(),
            background_shader: None,
            clear_color: [0.1, 0.1, 0.15, 1.0],
            log_level: "info".to_string(),
            window: WindowConfig::default(),
        }
    }
}

// new & init
impl RendererConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// 文件不存在时使用默认配置
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::info!("config {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        log::info!("config loaded from {:?}", path);
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_overlap == 0 {
            return Err(ConfigError::Invalid("frame_overlap must be at least 1".to_string()));
        }
        if self.presentable_images < 2 {
            return Err(ConfigError::Invalid("presentable_images must be at least 2".to_string()));
        }
        if self.fence_timeout_ms == 0 {
            return Err(ConfigError::Invalid("fence_timeout_ms must be positive".to_string()));
        }
        if self.log_level.parse::<log::LevelFilter>().is_err() {
            return Err(ConfigError::Invalid(format!("unknown log_level {:?}", self.log_level)));
        }
        Ok(())
    }
}

// getters
impl RendererConfig {
    #[inline]
    pub fn fence_timeout_ns(&self) -> u64 {
        self.fence_timeout_ms.saturating_mul(1_000_000)
    }

    #[inline]
    pub fn log_level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }
}
