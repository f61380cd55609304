mod completions;
mod ui;
mod video;

use clap::{CommandFactory, Parser, Subcommand};
use serde_json::json;

use crate::completions::CompletionCommands;
use crate::ui::prelude::{Level, OutputFormat, emit};
use crate::video::VideoCommands;
use crate::video::render::RenderError;

/// Assemble narrated short-form videos from stills, overlays and captions
#[derive(Parser, Debug)]
#[command(name = "reelsmith", author, version, about, long_about = None)]
struct Cli {
    /// Activate debug mode
    #[arg(short, long, global = true)]
    debug: bool,

    /// Output format for messages (text or json)
    #[arg(long = "format", value_enum, default_value = "text")]
    format: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(flatten)]
    Video(VideoCommands),

    /// Shell completion helpers
    Completions {
        #[command(subcommand)]
        command: CompletionCommands,
    },
}

pub(crate) fn cli_command() -> clap::Command {
    Cli::command()
}

fn handle_completions(command: CompletionCommands) -> anyhow::Result<()> {
    match command {
        CompletionCommands::Generate { shell } => {
            print!("{}", completions::generate(shell)?);
        }
        CompletionCommands::Install {
            shell,
            output,
            force,
        } => {
            let path = completions::install(shell, output, force)?;
            emit(
                Level::Success,
                "completions.installed",
                &format!(
                    "Installed {shell} completions to {}\n{}",
                    path.display(),
                    completions::instructions(shell, &path)
                ),
                Some(json!({ "path": path.display().to_string() })),
            );
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    ui::init(cli.format, !cli.no_color);
    ui::set_debug_mode(cli.debug);
    if cli.no_color {
        colored::control::set_override(false);
    }

    let result = match cli.command {
        Commands::Video(command) => video::handle_video_command(command),
        Commands::Completions { command } => handle_completions(command),
    };

    if let Err(err) = result {
        if err
            .downcast_ref::<RenderError>()
            .is_some_and(RenderError::is_timeout)
        {
            emit(
                Level::Warn,
                "error.timeout_hint",
                "Stage time budgets can be raised under [timeouts] in the project config",
                None,
            );
        }
        emit(
            Level::Error,
            "error",
            &format!("Error: {err:#}"),
            Some(json!({ "error": format!("{err:#}") })),
        );
        std::process::exit(1);
    }
}
