use ember_gfx::{descriptors::bindless_table::DescriptorKind, error::GfxError};

use crate::config::ConfigError;

/// runtime core 的错误，全部视为致命错误：调用方记录日志后终止进程
///
/// 可以通过重建 swapchain 恢复的情况不是错误，而是 `FrameBegin::Skipped` / `PresentStatus::NeedsRebuild`
#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    #[error(transparent)]
    Gfx(#[from] GfxError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// 视为 GPU hang 或者死锁
    #[error("frame {frame} (slot {slot}) fence not signaled within {timeout_ns}ns")]
    FenceTimeout { frame: u64, slot: usize, timeout_ns: u64 },

    #[error("immediate submission fence not signaled within {timeout_ns}ns")]
    ImmediateTimeout { timeout_ns: u64 },

    #[error("{kind} descriptor table exhausted (capacity {capacity})")]
    DescriptorCapacityExceeded { kind: DescriptorKind, capacity: u32 },

    #[error("{kind} descriptor {index} released while not live")]
    DescriptorNotLive { kind: DescriptorKind, index: u32 },

    #[error("buffer upload {name:?} has no data")]
    EmptyUpload { name: String },
}

pub type FatalResult<T> = Result<T, FatalError>;
