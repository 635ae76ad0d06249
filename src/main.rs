//! Voice Chat - terminal client for a conversational assistant
//!
//! Text chat plus a hands-free voice mode: speech capture with silence
//! detection, spoken replies, and a typewriter rendering of every response.

mod backend;
mod config;
mod debounce;
mod orchestrator;
mod runtime;
mod speech;
mod store;
mod terminal;
mod typewriter;
mod voice;

use backend::{ChatBackend, HttpBackend};
use config::Config;
use orchestrator::OrchestratorConfig;
use runtime::{ClientEvent, Command, RuntimeConfig, RuntimeHandle, VoiceRuntime};
use speech::{ProcessSpeechEngine, SpeechCommand, SpeechEngine, UnsupportedSpeechEngine};
use std::sync::Arc;
use store::{InMemoryStore, MessageStore};
use terminal::{parse_line, Input, Renderer, HELP};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use typewriter::TypewriterConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so they never interleave with the conversation
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voice_chat=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        backend = %config.backend_url,
        streaming = config.streaming,
        conversation_id = ?config.conversation_id,
        "Starting voice chat"
    );

    let backend: Arc<dyn ChatBackend> =
        Arc::new(HttpBackend::new(&config.backend_url, config.api_token.clone())?);
    let store: Arc<dyn MessageStore> = Arc::new(InMemoryStore::new());
    let runtime_config = RuntimeConfig {
        greeting: config.greeting.clone(),
        silence_window: config.silence_window,
        orchestrator: OrchestratorConfig {
            streaming: config.streaming,
            idle_timeout: config.stream_idle_timeout,
            conversation_id: config.conversation_id.clone(),
            typewriter: TypewriterConfig::default().with_tick(config.tick),
        },
    };

    let stt = config.stt_command.clone().and_then(SpeechCommand::resolve);
    let tts = config.tts_command.clone().and_then(SpeechCommand::resolve);
    if stt.is_none() && tts.is_none() {
        tracing::info!("No speech commands configured, voice mode unavailable");
        run(UnsupportedSpeechEngine::new(), backend, store, runtime_config).await
    } else {
        run(ProcessSpeechEngine::new(stt, tts), backend, store, runtime_config).await
    }
}

async fn run<E: SpeechEngine + 'static>(
    engine: E,
    backend: Arc<dyn ChatBackend>,
    store: Arc<dyn MessageStore>,
    config: RuntimeConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let (runtime, handle) = VoiceRuntime::new(engine, backend, store, config);
    let render_task = tokio::spawn(render(handle.subscribe()));
    let runtime_task = tokio::spawn(runtime.run());

    println!("{HELP}");
    read_input(&handle).await?;

    handle.send(Command::Shutdown).await;
    runtime_task.await?;
    render_task.abort();
    Ok(())
}

/// Forward stdin lines to the runtime until `/quit` or end of input
async fn read_input(handle: &RuntimeHandle) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            Ok(Input::Command(Command::Shutdown)) => break,
            Ok(Input::Command(command)) => {
                if !handle.send(command).await {
                    break;
                }
            }
            Ok(Input::Help) => println!("{HELP}"),
            Ok(Input::Nothing) => {}
            Err(message) => println!("! {message}"),
        }
    }
    Ok(())
}

async fn render(mut events: broadcast::Receiver<ClientEvent>) {
    let mut renderer = Renderer::new(std::io::stdout());
    loop {
        match events.recv().await {
            Ok(event) => {
                if let Err(e) = renderer.render(&event) {
                    tracing::error!(error = %e, "Failed to write to terminal");
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Terminal fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}
