//! voice-turn sidecar.
//!
//! Runs the turn controller for a host UI, speaking JSON lines over
//! stdin/stdout. The host also plays the chat runtime: it receives
//! `user_reply` events and answers with `chat_reply`.

use std::sync::Arc;

use tracing::info;

use voice_turn::audio::CpalMicrophone;
use voice_turn::config::paths::get_log_dir;
use voice_turn::config::{get_config_path, read_config, VoiceTurnConfig};
use voice_turn::ipc::bridge::{emit_event, spawn_stdin_reader, Emitter, IpcChatRuntime};
use voice_turn::ipc::host::{ControllerFactory, Host};
use voice_turn::ipc::VoiceEvent;
use voice_turn::stt::HttpTranscriber;
use voice_turn::tts::{HttpSynthesizer, RodioSink};
use voice_turn::{Collaborators, TurnController};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = voice_turn::logging::init(&get_log_dir()) {
        eprintln!("Failed to initialize logging: {e}");
    }

    // Let the host know we're alive before anything slow happens.
    emit_event(&VoiceEvent::Starting {});

    let config = read_config();
    info!(?config, "Configuration loaded");

    let emit: Emitter = Arc::new(|event| emit_event(&event));
    let chat = Arc::new(IpcChatRuntime::with_emitter(emit.clone()));
    let factory: ControllerFactory = {
        let chat = Arc::clone(&chat);
        Box::new(move |config| build_controller(config, Arc::clone(&chat)))
    };
    let mut host = Host::new(config, chat, factory, emit, get_config_path());
    let mut cmd_rx = spawn_stdin_reader();

    emit_event(&VoiceEvent::Ready {});
    info!("Voice turn controller ready");

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(command) => {
                    if !host.handle_command(command).await {
                        break;
                    }
                }
                None => {
                    info!("stdin closed, shutting down");
                    break;
                }
            },
            event = host.next_event() => host.forward(event),
        }
    }

    host.shutdown().await;
    info!("Voice turn controller shutting down");
    Ok(())
}

fn build_controller(config: VoiceTurnConfig, chat: Arc<IpcChatRuntime>) -> TurnController {
    let parts = Collaborators {
        microphone: Arc::new(CpalMicrophone::new(
            config.input_device.clone(),
            config.sample_rate,
        )),
        transcriber: Arc::new(HttpTranscriber::new(
            &config.backend_url,
            config.transcribe_mode,
        )),
        chat,
        synthesizer: Arc::new(HttpSynthesizer::new(&config.backend_url)),
        sink: Arc::new(RodioSink::new(config.playback_volume)),
    };
    TurnController::new(config, parts)
}
