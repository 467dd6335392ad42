use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use loqa_converse::audio::{AudioBackendFactory, AudioSource, RodioSink};
use loqa_converse::config::DEFAULT_CONFIG_PATH;
use loqa_converse::http::{create_router, AppState};
use loqa_converse::session::{
    SessionComponents, SessionController, SessionHandle, SessionPhase, SessionView,
};
use loqa_converse::{Config, HistoryStore, HttpFetcher, JsonFileStore, WsTransport};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

/// Duplex voice conversation client
#[derive(Debug, Parser)]
#[command(name = "loqa-converse", version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Conversation service WebSocket URL (overrides config)
    #[arg(long)]
    server_url: Option<String>,

    /// Replay a WAV file instead of capturing from the microphone
    #[arg(long)]
    input_file: Option<PathBuf>,

    /// Do not start the HTTP control API
    #[arg(long)]
    no_http: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut cfg = Config::load(&cli.config)?;
    if let Some(url) = cli.server_url {
        cfg.server.url = url;
    }

    info!("Loqa Converse v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);
    info!("Conversation service: {}", cfg.server.url);

    let source = match cli.input_file {
        Some(path) => {
            info!("Replaying audio from {}", path.display());
            AudioSource::File(path)
        }
        None => AudioSource::Microphone,
    };

    let history: Option<Box<dyn HistoryStore>> = if cfg.history.persist {
        info!("Conversation history: {}", cfg.history.path.display());
        Some(Box::new(JsonFileStore::new(cfg.history.path.clone())))
    } else {
        None
    };

    let components = SessionComponents {
        transport: Box::new(WsTransport::new(cfg.server.url.clone(), cfg.connect_timeout())),
        capture: AudioBackendFactory::create(source, cfg.audio_backend_config()),
        sink: Box::new(RodioSink::spawn().context("Failed to open audio output")?),
        fetcher: Arc::new(HttpFetcher::new(cfg.fetch_timeout())?),
        history,
    };

    let (session, controller) = SessionController::spawn(components, cfg.session_options());

    if cfg.service.http.enabled && !cli.no_http {
        let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind HTTP API to {}", addr))?;
        info!("HTTP API listening on {}", addr);

        let app = create_router(AppState::new(session.clone()));
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("HTTP server failed: {}", e);
            }
        });
    }

    tokio::spawn(render(session.clone()));

    println!("[Enter]/r: toggle recording   h: toggle history   q: quit");

    tokio::select! {
        result = read_keys(session.clone()) => {
            if let Err(e) = result {
                warn!("Keyboard input failed: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    session.shutdown();
    controller.await.context("Session controller panicked")?;

    info!("Goodbye");
    Ok(())
}

/// Map stdin lines to intents until `q` or end of input
async fn read_keys(session: SessionHandle) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" | "r" => {
                session.toggle_recording();
            }
            "h" => {
                session.toggle_history_view();
            }
            "q" => break,
            other => println!("Unknown key {:?}", other),
        }
    }

    Ok(())
}

/// Print the view whenever it changes
async fn render(session: SessionHandle) {
    let mut views = session.subscribe();
    let mut last_printed: Option<String> = None;

    loop {
        let view = views.borrow_and_update().clone();
        let frame = format_view(&view);

        // Stats change on every chunk; only print what a user would notice
        if last_printed.as_deref() != Some(frame.as_str()) {
            println!("{}", frame);
            last_printed = Some(frame);
        }

        if views.changed().await.is_err() {
            break;
        }
    }
}

fn format_view(view: &SessionView) -> String {
    let recording = match view.phase {
        SessionPhase::Active if view.is_recording => "● REC",
        SessionPhase::Starting => "… connecting",
        SessionPhase::Stopping => "… stopping",
        _ => "○ idle",
    };
    let speaking = if view.is_speaking { "  ♪ speaking" } else { "" };

    let mut out = format!("[{}{}]", recording, speaking);

    if view.disconnected {
        out.push_str("  disconnected");
    }
    if let Some(err) = &view.last_error {
        out.push_str(&format!("  ({})", err));
    }
    if !view.live_transcript.is_empty() {
        out.push_str(&format!("\n  > {}", view.live_transcript));
    }
    if view.history_visible {
        out.push_str("\n  ── history ──");
        for turn in &view.history {
            out.push_str(&format!("\n  {:?}: {}", turn.role, turn.content));
        }
    }

    out
}
