mod render;
mod serve;

pub use render::{run_render, RenderArgs};
pub use serve::run_serve;
