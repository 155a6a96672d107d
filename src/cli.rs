use clap::{Parser, Subcommand};
use std::path::PathBuf;

use freeroute::models::Modality;

#[derive(Parser)]
#[command(name = "freeroute")]
#[command(about = "Route text and image generation across free-tier AI providers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate content once and print it
    Generate {
        /// Prompt text
        prompt: String,

        /// Kind of content to request (text, image, audio, multimodal)
        #[arg(long, default_value = "text")]
        modality: Modality,

        /// Preferred model, used by providers that offer it
        #[arg(short, long)]
        model: Option<String>,

        #[arg(long)]
        max_tokens: Option<u32>,

        #[arg(long)]
        temperature: Option<f32>,

        /// System prompt
        #[arg(short, long)]
        system: Option<String>,

        /// Write binary output to this file instead of printing base64
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Start an interactive chat on stdin
    Chat {
        /// Start with a specific model
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Show registered providers and their limits
    ///
    /// Counters start at zero on every run, so usage numbers here are always
    /// empty. Use /stats inside `freeroute chat` for live numbers.
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List models offered by registered providers
    Models {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the resolved configuration
    Config,
}
