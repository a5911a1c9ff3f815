//! Blockstream CLI binary entry point.

use std::sync::Arc;

use blockstream::cli::{render_completion, render_update, Cli, Commands, WatchArgs};
use blockstream::prelude::*;
use clap::Parser;
use tokio::sync::oneshot;

#[tokio::main]
async fn main() {
    blockstream::cli::init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Watch(args) => handle_watch(args).await,
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

/// Returns whether the stream finished without error.
async fn handle_watch(args: WatchArgs) -> Result<bool> {
    let mut config = EngineConfig::load(args.config.as_deref())?;
    if let Some(base_url) = args.base_url.clone() {
        config.base_url = Some(base_url);
    }
    let transport = SseTransport::from_config(&config)?;

    let as_json = args.json;
    let engine = StreamEngine::new(config, Arc::new(transport)).with_update_sink(Arc::new(
        move |update: BlockUpdate| match render_update(&update, as_json) {
            Ok(line) => println!("{line}"),
            Err(e) => eprintln!("Error: cannot render update: {e}"),
        },
    ));

    let (done_tx, done_rx) = oneshot::channel();
    engine
        .start(args.target(), move |completion| {
            let _ = done_tx.send(completion);
        })
        .await?;

    let completion = tokio::select! {
        done = done_rx => done.map_err(|_| {
            BlockstreamError::transport("stream session ended without a completion")
        })?,
        _ = tokio::signal::ctrl_c() => {
            engine.stop().await;
            eprintln!("Interrupted");
            return Ok(false);
        }
    };

    println!("{}", render_completion(&completion, as_json)?);
    Ok(!completion.is_error)
}
