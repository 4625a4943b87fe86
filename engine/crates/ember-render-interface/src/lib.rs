pub mod bindless_registry;
pub mod config;
pub mod deinit_stack;
pub mod descriptor_id;
pub mod error;
pub mod frame_context;
pub mod frame_counter;
pub mod frame_pacer;
pub mod immediate;
pub mod render_runtime;
pub mod swapchain_manager;

#[cfg(test)]
mod test_utils;
