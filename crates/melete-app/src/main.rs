use std::process;
use std::sync::Arc;

use bytes::Bytes;
use tracing_subscriber::{filter::LevelFilter, fmt};

use melete_app::cli::{Cli, Commands, ConvertArgs};
use melete_app::config;
use melete_app::error::AppError;
use melete_app::extract::ocr::{OcrExtractor, OcrOptions};
use melete_app::extract::pdf_remote::RemotePdfExtractor;
use melete_app::extract::DocumentConverter;
use melete_app::format::DocumentFormat;
use melete_app::server;
use melete_app::services::chat::{ChatBackend, HttpChatBackend};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(log_level(cli.verbose));

    if let Err(err) = run(cli).await {
        eprintln!("{err}");
        process::exit(1);
    }
}

fn log_level(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

fn init_tracing(level: LevelFilter) {
    let subscriber = fmt().with_max_level(level).with_target(false).finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("Tracing subscriber already set; skipping re-initialization.");
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Commands::Serve(_) => {
            let config = config::load()?;
            server::serve(config).await
        }
        Commands::Convert(args) => convert_file(args).await,
    }
}

async fn convert_file(args: ConvertArgs) -> Result<(), AppError> {
    let bytes = tokio::fs::read(&args.path)
        .await
        .map_err(|source| AppError::Io {
            path: args.path.clone(),
            source,
        })?;

    let format = match &args.media_type {
        Some(media_type) => DocumentFormat::from_media_type(media_type)
            .map_err(melete_app::extract::ExtractError::from)?,
        None => args
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(DocumentFormat::from_extension)
            .ok_or_else(|| AppError::UnknownInputFormat {
                path: args.path.clone(),
            })?,
    };

    let config = config::load()?;

    // Network-backed adapters are wired in only when their configuration is
    // available; word and slide decks convert offline.
    let ocr = HttpChatBackend::from_env(config.generation.api_base.clone())
        .ok()
        .map(|backend| {
            OcrExtractor::new(
                Arc::new(backend) as Arc<dyn ChatBackend>,
                OcrOptions::builder()
                    .model(config.generation.ocr_model.as_str())
                    .build(),
            )
        });
    let pdf = config
        .convert
        .pdf_api_base
        .as_deref()
        .map(RemotePdfExtractor::new);
    let converter = DocumentConverter::new(ocr, pdf);

    let file_name = args
        .path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());

    let result = converter.convert(format, Bytes::from(bytes), &file_name).await?;

    if let Some(slide_count) = result.metadata.slide_count {
        tracing::info!(slide_count, "slide deck converted");
    }
    if let Some(page_count) = result.metadata.page_count {
        tracing::info!(page_count, "pdf converted");
    }

    println!("{}", result.text);
    Ok(())
}
