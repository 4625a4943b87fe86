pub mod barrier;
pub mod command_buffer;
pub mod submit_info;
