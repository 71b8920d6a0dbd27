// src/main.rs
use mt5_bridge::config::Config;
use mt5_bridge::domain::errors::AppResult;
use mt5_bridge::service::{Reply, TradeService};
use mt5_bridge::venue::paper::PaperVenue;

use futures_util::future::join_all;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal::ctrl_c;

#[tokio::main]
async fn main() -> AppResult<()> {
    // Config file path as first argument, environment otherwise
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    // Initialize logging
    config.init_logging()?;

    log::info!("Starting mt5_bridge v{}", env!("CARGO_PKG_VERSION"));

    let venue = PaperVenue::with_default_book().with_balance(config.venue.paper_balance);
    for symbol in &config.trading.allowed_symbols {
        if !venue.has_symbol(symbol) {
            log::warn!("{} is not in the paper book, quoting it at 1.0000/1.0002", symbol);
            venue.add_symbol(PaperVenue::quote(symbol, dec!(1.0000), dec!(1.0002)));
        }
    }

    let service = Arc::new(TradeService::new(Arc::new(venue), &config)?);

    log::info!("Connecting to venue...");
    if service.connect().await {
        log::info!("Connected to venue!");
    } else {
        log::warn!("Initial venue connection failed, requests will reconnect");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tasks = Vec::new();

    log::info!("Reading one command per line from stdin. Press Ctrl+C to stop.");
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line? {
                    Some(line) => line,
                    None => break,
                };

                let command = line.trim().to_string();
                if command.is_empty() {
                    continue;
                }

                let service = service.clone();
                tasks.push(tokio::spawn(async move {
                    let mut words = command.split_whitespace();
                    let body = match words.next() {
                        Some(word) if word.eq_ignore_ascii_case("health") => {
                            serde_json::to_string(&service.health().await)
                        }
                        Some(word) if word.eq_ignore_ascii_case("positions") => {
                            let symbol = words.next().map(str::to_uppercase);
                            let reply = match service.positions(symbol.as_deref()).await {
                                Ok(report) => match serde_json::to_value(report) {
                                    Ok(result) => Reply::ok("Positions retrieved", result),
                                    Err(e) => Reply::from_error(&e.into()),
                                },
                                Err(e) => Reply::from_error(&e),
                            };
                            serde_json::to_string(&reply)
                        }
                        _ => serde_json::to_string(&service.handle_webhook(&command).await),
                    };

                    match body {
                        Ok(body) => println!("{}", body),
                        Err(e) => log::error!("Failed to encode reply: {}", e),
                    }
                }));
            }
            _ = ctrl_c() => {
                log::info!("Shutting down...");
                break;
            }
        }
    }

    // Let in-flight requests finish
    for result in join_all(tasks).await {
        if let Err(e) = result {
            log::error!("Request task failed: {}", e);
        }
    }

    log::info!("Shutdown complete. Goodbye!");
    Ok(())
}
