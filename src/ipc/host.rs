//! Command handling for the sidecar: routes host commands to the
//! controller and controller events back to the host.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use super::bridge::{Emitter, IpcChatRuntime};
use super::{AudioDeviceInfo, VoiceCommand, VoiceEvent};
use crate::audio::{list_input_devices, list_output_devices};
use crate::config::{merge_config, write_config_to, VoiceTurnConfig};
use crate::error::VoiceError;
use crate::turn::{TurnController, TurnEvent, TurnState};

/// Builds a controller for a given configuration.
pub type ControllerFactory = Box<dyn Fn(VoiceTurnConfig) -> TurnController + Send>;

pub struct Host {
    controller: TurnController,
    events: broadcast::Receiver<TurnEvent>,
    chat: Arc<IpcChatRuntime>,
    factory: ControllerFactory,
    emit: Emitter,
    config_path: PathBuf,
    /// Accepted while a turn was running; applied once the controller is
    /// Idle. In continuous mode re-arming is suspended so that happens after
    /// the current turn, and the conversation restarts on the new controller.
    deferred_config: Option<VoiceTurnConfig>,
    resume_after_rebuild: bool,
}

impl Host {
    pub fn new(
        config: VoiceTurnConfig,
        chat: Arc<IpcChatRuntime>,
        factory: ControllerFactory,
        emit: Emitter,
        config_path: PathBuf,
    ) -> Self {
        let controller = factory(config);
        let events = controller.subscribe();
        Self {
            controller,
            events,
            chat,
            factory,
            emit,
            config_path,
            deferred_config: None,
            resume_after_rebuild: false,
        }
    }

    pub fn controller(&self) -> &TurnController {
        &self.controller
    }

    pub fn has_deferred_config(&self) -> bool {
        self.deferred_config.is_some()
    }

    /// Next event from the current controller.
    pub async fn next_event(&mut self) -> TurnEvent {
        loop {
            match self.events.recv().await {
                Ok(event) => return event,
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "Event forwarder lagged"),
                Err(RecvError::Closed) => self.events = self.controller.subscribe(),
            }
        }
    }

    /// Send a controller event to the host and apply any deferred config
    /// once the controller has settled.
    pub fn forward(&mut self, event: TurnEvent) {
        let completed = matches!(event, TurnEvent::Completed { .. });
        let back_to_idle = matches!(
            event,
            TurnEvent::StateChanged {
                state: TurnState::Idle
            }
        );
        self.send(VoiceEvent::from(event));

        if completed && self.deferred_config.is_some() && self.controller.config().continuous_mode
        {
            self.resume_after_rebuild = true;
        }

        // The Idle event may be stale: a begin_turn handled after the turn
        // ended but before this event was forwarded has already re-armed.
        if back_to_idle && self.controller.state().is_idle() {
            if let Some(config) = self.deferred_config.take() {
                let resume = std::mem::take(&mut self.resume_after_rebuild);
                self.rebuild(config);
                if resume && self.controller.config().continuous_mode {
                    info!("Resuming continuous conversation");
                    if let Err(e) = self.controller.begin_turn() {
                        self.send_error(&e);
                    }
                }
            }
        }
    }

    /// Handle a single command from the host.
    /// Returns `false` if the main loop should exit.
    pub async fn handle_command(&mut self, cmd: VoiceCommand) -> bool {
        match cmd {
            VoiceCommand::Ping {} => self.send(VoiceEvent::Pong {}),

            VoiceCommand::Stop {} => {
                self.send(VoiceEvent::Stopping {});
                return false;
            }

            VoiceCommand::BeginTurn {} => {
                if let Err(e) = self.controller.begin_turn() {
                    self.send_error(&e);
                }
            }

            VoiceCommand::StopRecording {} => {
                if !self.controller.stop_recording() {
                    debug!("stop_recording ignored, not recording");
                }
            }

            VoiceCommand::PauseRecording {} => {
                if !self.controller.pause_recording() {
                    debug!("pause_recording ignored, not recording");
                }
            }

            VoiceCommand::ResumeRecording {} => {
                if !self.controller.resume_recording() {
                    debug!("resume_recording ignored, not recording");
                }
            }

            VoiceCommand::CancelTurn {} => {
                // A cancel ends continuous conversation too.
                self.resume_after_rebuild = false;
                if !self.controller.cancel_turn().await {
                    debug!("cancel_turn had nothing to cancel");
                }
            }

            VoiceCommand::ChatReply { text, request_id } => {
                if !self.chat.deliver(text, request_id.as_deref()) {
                    debug!("chat_reply arrived with no request waiting");
                }
            }

            VoiceCommand::ChatError {
                message,
                request_id,
            } => {
                if !self.chat.fail(message, request_id.as_deref()) {
                    debug!("chat_error arrived with no request waiting");
                }
            }

            VoiceCommand::ConfigUpdate { config } => self.update_config(&config),

            VoiceCommand::ListAudioDevices {} => {
                self.send(VoiceEvent::AudioDevices {
                    input: AudioDeviceInfo::from_names(list_input_devices()),
                    output: AudioDeviceInfo::from_names(list_output_devices()),
                });
            }

            VoiceCommand::GetState {} => {
                let state = self.controller.state();
                self.send(VoiceEvent::StateChange { state });
            }
        }

        true
    }

    /// Cancel whatever is running before exit.
    pub async fn shutdown(&mut self) {
        self.controller.cancel_turn().await;
    }

    fn update_config(&mut self, patch: &serde_json::Value) {
        info!("Config update received");
        let base = self
            .deferred_config
            .as_ref()
            .unwrap_or_else(|| self.controller.config());
        let config = match merge_config(base, patch) {
            Ok(config) => config,
            Err(e) => {
                self.send_error(&e);
                return;
            }
        };
        if let Err(e) = write_config_to(&self.config_path, &config) {
            self.send_error(&e);
            return;
        }

        match serde_json::to_value(&config) {
            Ok(value) => self.send(VoiceEvent::ConfigUpdated { config: value }),
            Err(e) => warn!("Failed to serialize config: {}", e),
        }

        if self.controller.state().is_idle() {
            self.rebuild(config);
        } else {
            info!("Turn in progress, config will apply when it ends");
            self.controller.stop_rearming();
            self.deferred_config = Some(config);
        }
    }

    fn rebuild(&mut self, config: VoiceTurnConfig) {
        // Flush what the old controller already published.
        while let Ok(event) = self.events.try_recv() {
            self.send(VoiceEvent::from(event));
        }
        self.controller = (self.factory)(config);
        self.events = self.controller.subscribe();
        info!("Controller rebuilt with new configuration");
    }

    fn send(&self, event: VoiceEvent) {
        (self.emit)(event);
    }

    fn send_error(&self, e: &VoiceError) {
        warn!(kind = %e.kind(), "{}", e);
        self.send(VoiceEvent::Error {
            message: e.to_string(),
            kind: Some(e.kind()),
        });
    }
}
