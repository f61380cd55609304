use anyhow::Result;

use super::cli::VideoCommands;
use super::export::handle_captions;
use super::probe::handle_probe;
use super::render::handle_render;
use super::validate::handle_validate;

pub fn handle_video_command(command: VideoCommands) -> Result<()> {
    match command {
        VideoCommands::Render(args) => handle_render(args).map(|_| ()),
        VideoCommands::Captions(args) => handle_captions(args).map(|_| ()),
        VideoCommands::Validate(args) => handle_validate(args),
        VideoCommands::Probe(args) => handle_probe(args),
    }
}
