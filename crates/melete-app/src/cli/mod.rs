use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

/// Top-level CLI entry point.
#[derive(Debug, Parser)]
#[command(
    name = "melete",
    version,
    about = "Melete document conversion and study-aid generation service"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
    /// Increase logging verbosity (-v, -vv).
    #[arg(global = true, short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}

/// Supported subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the Melete HTTP server.
    Serve(ServeArgs),
    /// Convert a local document to plain text and print it.
    Convert(ConvertArgs),
}

#[derive(Debug, Args)]
pub struct ServeArgs;

#[derive(Debug, Args)]
pub struct ConvertArgs {
    /// Path of the document to convert.
    pub path: PathBuf,
    /// Declared media type; inferred from the file extension when omitted.
    #[arg(long)]
    pub media_type: Option<String>,
}
