pub mod captions;
pub mod cli;
pub mod commands;
pub mod config;
mod export;
pub mod images;
mod probe;
pub mod render;
pub mod support;
mod validate;

pub use cli::VideoCommands;
pub use commands::handle_video_command;
