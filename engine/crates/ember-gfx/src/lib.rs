//! Ember 的 GFX 层
//!
//! 对 ash 和 vk-mem 的薄封装。runtime core 只通过 [`gpu_device::GpuDevice`] 访问 GPU，
//! 真实的实现是 [`gfx::Gfx`]，不是单例，由 renderer 显式持有并传递。

pub mod commands;
pub mod descriptors;
pub mod error;
pub mod foundation;
pub mod gfx;
pub mod gpu_device;
pub mod pipelines;
pub mod resources;
pub mod swapchain;
