use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use clip_resolver::config::Settings;
use clip_resolver::logging::init_logging;
use clip_resolver::resolver::{extract_link, Resolver, UrlExpander};

/// Resolve a short-video link to a playable URL or a downloaded file
#[derive(Debug, Parser)]
#[command(name = "clip-resolver", version, about)]
struct Cli {
    /// Text containing the link (e.g. a pasted chat message)
    #[arg(required = true)]
    text: Vec<String>,

    /// Skip following redirects of shortened links
    #[arg(long)]
    no_expand: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Delete a downloaded file after printing its path
    #[arg(long)]
    discard: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let settings = Settings::from_env().context("Failed to load settings")?;
    init_logging(&settings.logging)?;

    let text = cli.text.join(" ");
    let link = extract_link(&text).context("No supported link found in input")?;

    let link = if cli.no_expand {
        link
    } else {
        UrlExpander::new(&settings.expander)?.expand(&link).await
    };
    tracing::info!(%link, "Resolving");

    let resolver = Resolver::from_settings(&settings)?;
    let result = resolver.resolve(&link).await;
    resolver.close_all().await;

    let media = match result {
        Ok(media) => media,
        Err(e) => {
            tracing::error!("Resolution failed: {}", e);
            eprintln!("{}", e.user_message());
            return Ok(ExitCode::FAILURE);
        }
    };

    if cli.json {
        println!("{}", serde_json::to_string(&media.summary())?);
    } else {
        println!("{}", media);
    }

    if cli.discard {
        media.cleanup().context("Failed to remove downloaded file")?;
    } else if media.is_local() {
        // The caller takes over the file
        let _ = media.keep();
    }

    Ok(ExitCode::SUCCESS)
}
