pub mod background_pass;
pub mod renderer;
