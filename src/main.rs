use anyhow::{Context, Result};
use base64::Engine;
use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use freeroute::app::{AppConfig, AppState};
use freeroute::chat::{render_models, render_stats, ChatReply, ChatService, ChatServiceConfig};
use freeroute::models::{GeneratedContent, GenerationOptions, Modality, Orchestrator};
use freeroute::platform::AppPaths;

mod cli;

use cli::{Cli, Commands};

fn init_logging(paths: &AppPaths, debug: bool) -> Result<WorkerGuard> {
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::from_default_env().add_directive(format!("freeroute={}", level).parse()?);

    let file_appender = tracing_appender::rolling::daily(paths.logs_dir(), "freeroute.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();

    Ok(guard)
}

async fn init_app_state(cli: &Cli, paths: &AppPaths) -> Result<AppState> {
    let config_path = cli.config.clone().unwrap_or_else(|| paths.config_file());

    let config = AppConfig::load(&config_path)
        .await
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    let state = AppState::new(config, config_path).context("Failed to initialize providers")?;
    info!("Application state initialized successfully");
    Ok(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let paths = AppPaths::new()?;
    paths.ensure_dirs_exist().context("Failed to create application directories")?;
    let _guard = init_logging(&paths, cli.debug)?;

    info!("Starting FreeRoute {}", env!("CARGO_PKG_VERSION"));

    let state = init_app_state(&cli, &paths).await?;
    let orchestrator = state.orchestrator();

    let result = match cli.command.unwrap_or(Commands::Chat { model: None }) {
        Commands::Generate {
            prompt,
            modality,
            model,
            max_tokens,
            temperature,
            system,
            output,
        } => {
            let mut options = GenerationOptions::default();
            options.model = model;
            options.max_tokens = max_tokens;
            options.temperature = temperature;
            options.system_prompt = system;
            run_generate(&orchestrator, &prompt, options, modality, output.as_deref()).await
        }
        Commands::Chat { model } => run_chat(orchestrator, model).await,
        Commands::Stats { json } => {
            let stats = orchestrator.get_provider_stats();
            let cache = orchestrator.cache_stats();
            if json {
                let report = serde_json::json!({ "providers": stats, "cache": cache });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", render_stats(&stats, cache));
                eprintln!("Counters cover this process only. Use /stats inside chat for live numbers.");
            }
            Ok(())
        }
        Commands::Models { json } => {
            let models = orchestrator.list_available_models();
            if json {
                println!("{}", serde_json::to_string_pretty(&models)?);
            } else {
                print!("{}", render_models(&models));
            }
            Ok(())
        }
        Commands::Config => {
            print_config(&state);
            Ok(())
        }
    };

    state.shutdown();
    result
}

async fn run_generate(
    orchestrator: &Orchestrator,
    prompt: &str,
    options: GenerationOptions,
    modality: Modality,
    output: Option<&Path>,
) -> Result<()> {
    let response = orchestrator.generate(prompt, options, modality).await?;
    eprintln!(
        "[{} via {} in {}ms{}]",
        modality,
        response.provider,
        response.latency_ms,
        if response.cached { ", cached" } else { "" }
    );

    match response.content {
        GeneratedContent::Text(text) => match output {
            Some(path) => tokio::fs::write(path, text).await?,
            None => println!("{}", text),
        },
        GeneratedContent::Binary { mime_type, data } => match output {
            Some(path) => {
                tokio::fs::write(path, &data)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                eprintln!("Wrote {} bytes of {} to {}", data.len(), mime_type, path.display());
            }
            None => println!("{}", base64::engine::general_purpose::STANDARD.encode(&data)),
        },
    }

    Ok(())
}

async fn run_chat(orchestrator: Arc<Orchestrator>, model: Option<String>) -> Result<()> {
    if let Some(model) = model {
        orchestrator.switch_active_model(&model)?;
    }

    let service = ChatService::new(orchestrator, ChatServiceConfig::default());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("FreeRoute chat. Type /help for commands, /quit to leave.");
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match service.handle_line(&line).await {
            ChatReply::Message { text, provider, cached } => {
                println!("{}", text);
                println!("  [{}{}]", provider, if cached { ", cached" } else { "" });
            }
            ChatReply::Image {
                mime_type,
                data,
                provider,
            } => {
                let path = image_path(&mime_type);
                tokio::fs::write(&path, &data).await?;
                println!("  [{} saved {} bytes to {}]", provider, data.len(), path.display());
            }
            ChatReply::Notice(text) if text.is_empty() => {}
            ChatReply::Notice(text) => println!("{}", text.trim_end()),
            ChatReply::Quit => break,
        }
    }

    Ok(())
}

fn image_path(mime_type: &str) -> PathBuf {
    let extension = mime_type
        .split('/')
        .nth(1)
        .and_then(|subtype| subtype.split(';').next())
        .map(str::trim)
        .filter(|ext| !ext.is_empty())
        .unwrap_or("bin");
    PathBuf::from(format!("freeroute-{}.{}", uuid::Uuid::new_v4(), extension))
}

fn print_config(state: &AppState) {
    println!("Configuration: {}", state.config_path().display());

    let config = state.config();
    println!(
        "Timeout {}s, breaker threshold {}, cooldown {}s, cache {}",
        config.orchestrator.request_timeout_secs,
        config.orchestrator.failure_threshold,
        config.orchestrator.cooldown_secs,
        if config.cache.enabled { "on" } else { "off" }
    );

    for (name, provider) in config.enabled_providers() {
        let status = state
            .provider_status(name)
            .map(|status| format!("{:?}", status))
            .unwrap_or_default();
        println!(
            "  {:<14} {:<6} priority {:<4} {}",
            name,
            provider.modality.as_str(),
            provider.priority,
            status
        );
    }
}
