mod config;
mod db;
mod engine;
mod ipc;

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use engine::clock::{Clock, FixedClock, SystemClock};
use engine::textgen::{HttpTextGenerator, LevelUpMessenger, OfflineTextGenerator, TextGenerator};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(filter: Option<&str>) {
    // stdout carries the protocol, so logs go to stderr.
    tracing_subscriber::registry()
        .with(EnvFilter::new(filter.unwrap_or("fitquestd=info")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn text_generator(url: Option<&str>) -> Arc<dyn TextGenerator> {
    let Some(url) = url else {
        return Arc::new(OfflineTextGenerator);
    };
    match HttpTextGenerator::new(url) {
        Ok(g) => {
            tracing::info!(url, "text service configured");
            Arc::new(g)
        }
        Err(e) => {
            tracing::warn!(
                url,
                error = %e,
                "text service client failed to build; using static copy"
            );
            Arc::new(OfflineTextGenerator)
        }
    }
}

fn main() {
    let cfg = match config::DaemonConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("fitquestd: {e:#}");
            std::process::exit(2);
        }
    };
    init_tracing(cfg.log_filter.as_deref());

    let clock: Arc<dyn Clock> = match cfg.today_override {
        Some(date) => {
            tracing::info!(%date, "clock pinned");
            Arc::new(FixedClock::new(date))
        }
        None => Arc::new(SystemClock),
    };
    let mut state = ipc::AppState {
        workspace: None,
        db: None,
        clock,
        messenger: LevelUpMessenger::new(text_generator(cfg.text_service_url.as_deref())),
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to echo back.
                tracing::warn!(error = %e, "unparseable request line");
                let reply = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() },
                });
                let _ = writeln!(stdout, "{}", reply);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    tracing::info!("stdin closed, exiting");
}
