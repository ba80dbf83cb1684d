use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use fable_core::backend::{GenerationOptions, NarrationBackend};
use fable_core::events::SessionEvent;
use fable_core::ids::SessionId;
use fable_core::stream::StreamEvent;
use fable_core::turn::{Role, Turn};
use fable_llm::ReliableBackend;
use fable_telemetry::RequestLog;

use crate::command::{parse, Command, Input};
use crate::config::SessionConfig;
use crate::context::ContextStore;
use crate::error::EngineError;
use crate::modes::ModeState;
use crate::scenario::Scenario;
use crate::tts::TtsClient;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Phase of the session loop. Only the loop itself moves between phases.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    AwaitingInput,
    Dispatching,
    Generating,
    Appending,
    Terminated,
}

/// Whether the caller should keep reading input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopOutcome {
    Continue,
    Exit,
}

/// Top-level driver for one adventure: owns the transcript, the mode state,
/// and the backend, and processes one input line at a time. At most one
/// generation is in flight; everything the presentation layer needs to show
/// is published as [`SessionEvent`]s.
pub struct SessionLoop<B: NarrationBackend> {
    session_id: SessionId,
    created_at: DateTime<Utc>,
    store: ContextStore,
    modes: ModeState,
    backend: ReliableBackend<B>,
    config: SessionConfig,
    events: broadcast::Sender<SessionEvent>,
    tts: Option<TtsClient>,
    requests: Option<RequestLog>,
    state: LoopState,
}

impl<B: NarrationBackend> SessionLoop<B> {
    pub fn new(backend: B, modes: ModeState, config: SessionConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let backend = ReliableBackend::new(backend, config.retry.clone());
        Self {
            session_id: SessionId::new(),
            created_at: Utc::now(),
            store: ContextStore::new(config.budget_chars),
            modes,
            backend,
            config,
            events,
            tts: None,
            requests: None,
            state: LoopState::AwaitingInput,
        }
    }

    pub fn with_tts(mut self, tts: TtsClient) -> Self {
        self.tts = Some(tts);
        self
    }

    pub fn with_request_log(mut self, requests: RequestLog) -> Self {
        self.requests = Some(requests);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn store(&self) -> &ContextStore {
        &self.store
    }

    pub fn modes(&self) -> &ModeState {
        &self.modes
    }

    /// Seed a fresh session: the pinned scenario prompt plus the opening
    /// narration.
    pub fn start(&mut self, scenario: &Scenario) -> Result<(), EngineError> {
        let result = (|| {
            self.store.append(Role::System, scenario.system_prompt())?;
            self.store.append(Role::Narrator, scenario.opening())?;
            Ok(())
        })();
        self.check_fatal(result)
    }

    /// Process one line of player input. `cancel` aborts an in-flight
    /// generation without committing any turn.
    pub async fn handle_line(
        &mut self,
        line: &str,
        cancel: &CancellationToken,
    ) -> Result<LoopOutcome, EngineError> {
        if self.state == LoopState::Terminated {
            return Ok(LoopOutcome::Exit);
        }

        self.state = LoopState::Dispatching;
        let result = self.dispatch(line, cancel).await;
        if self.state != LoopState::Terminated {
            self.state = LoopState::AwaitingInput;
        }
        match self.check_fatal(result) {
            Ok(outcome) => Ok(outcome),
            Err(e) => Err(e),
        }
    }

    async fn dispatch(
        &mut self,
        line: &str,
        cancel: &CancellationToken,
    ) -> Result<LoopOutcome, EngineError> {
        let input = parse(line)?;
        match input {
            Input::Narrative(text) => {
                self.generate(Some(text), cancel).await?;
            }
            Input::Command(Command::Help) => {
                self.emit(SessionEvent::HelpRequested {
                    session_id: self.session_id.clone(),
                });
            }
            Input::Command(Command::ToggleCensor) => {
                let censored = self.modes.toggle_censor();
                info!(session_id = %self.session_id, censored, "censor flag toggled");
                self.emit(SessionEvent::CensorToggled {
                    session_id: self.session_id.clone(),
                    censored,
                });
            }
            Input::Command(Command::Status) => {
                self.emit(SessionEvent::StatusReport {
                    session_id: self.session_id.clone(),
                    model: self.modes.active_model().to_string(),
                    censored: self.modes.censored(),
                    turns: self.store.len(),
                    chars: self.store.used_chars(),
                    created_at: self.created_at,
                });
            }
            Input::Command(Command::Redo) => {
                // Remove the last narration and tell the story again from the
                // same point. Nothing to remove is fine.
                self.store.remove_last(Role::Narrator);
                self.generate(None, cancel).await?;
            }
            Input::Command(Command::Save { path }) => {
                let path = path
                    .map(PathBuf::from)
                    .unwrap_or_else(|| self.config.default_save_path.clone());
                fable_store::save_turns(&path, self.store.turns(), self.modes.active_model())?;
                info!(session_id = %self.session_id, path = %path.display(), "session saved");
                self.emit(SessionEvent::Saved {
                    session_id: self.session_id.clone(),
                    path: path.display().to_string(),
                    turns: self.store.len(),
                });
            }
            Input::Command(Command::Load { path }) => {
                let path = path
                    .map(PathBuf::from)
                    .unwrap_or_else(|| self.config.default_save_path.clone());
                let outcome = fable_store::load_turns(&path)?;
                let turns = outcome.turns.len();
                self.store.replace(outcome.turns);
                info!(session_id = %self.session_id, path = %path.display(), turns, "session loaded");
                self.emit(SessionEvent::Loaded {
                    session_id: self.session_id.clone(),
                    path: path.display().to_string(),
                    turns,
                    skipped: outcome.skipped,
                });
            }
            Input::Command(Command::ChangeModel { model }) => match model {
                None => {
                    let models = self.backend.list_models().await?;
                    self.emit(SessionEvent::AvailableModels {
                        session_id: self.session_id.clone(),
                        models,
                    });
                }
                Some(model) => {
                    let available = self.backend.list_models().await?;
                    self.modes.select_model(&model, &available)?;
                    info!(session_id = %self.session_id, model = %model, "active model changed");
                    self.emit(SessionEvent::ModelChanged {
                        session_id: self.session_id.clone(),
                        model,
                    });
                }
            },
            Input::Command(Command::Exit) => {
                self.terminate("exit");
                return Ok(LoopOutcome::Exit);
            }
        }
        Ok(LoopOutcome::Continue)
    }

    /// Run one generation. `user_input` is the player's new narrative line,
    /// if any (`/redo` regenerates without one). The Context Store is only
    /// touched after the stream completes, so failures and cancellation
    /// leave the transcript exactly as it was.
    async fn generate(
        &mut self,
        user_input: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        self.state = LoopState::Generating;

        let mut prompt = self.store.prompt_context(self.modes.policy());
        if let Some(text) = &user_input {
            prompt
                .turns
                .push(Turn::new(Role::User, text.clone(), self.store.len() as u64));
        }
        let prompt_chars: usize = prompt.turns.iter().map(|t| t.chars()).sum();

        let options = GenerationOptions {
            model: self.modes.active_model().to_string(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            request_timeout: self.config.request_timeout,
        };

        self.emit(SessionEvent::GenerationStart {
            session_id: self.session_id.clone(),
            turn: self.store.len() as u64,
        });

        let started = Instant::now();

        let opened = tokio::select! {
            _ = cancel.cancelled() => None,
            result = self.backend.stream(&prompt, &options) => Some(result),
        };
        let mut stream = match opened {
            None => return self.cancelled(&options, started, prompt_chars),
            Some(Ok(stream)) => stream,
            Some(Err(e)) => {
                self.record_request(&options, started, prompt_chars, 0, e.error_kind());
                return Err(e.into());
            }
        };

        let narration = loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return self.cancelled(&options, started, prompt_chars);
                }
                event = stream.next() => {
                    match event {
                        Some(StreamEvent::Start) => {}
                        Some(StreamEvent::Delta { text }) => {
                            self.emit(SessionEvent::NarrationDelta {
                                session_id: self.session_id.clone(),
                                delta: text,
                            });
                        }
                        Some(StreamEvent::Done { text }) => break text.trim().to_string(),
                        Some(StreamEvent::Error { error }) => {
                            warn!(session_id = %self.session_id, error = %error, "generation failed mid-stream");
                            self.record_request(&options, started, prompt_chars, 0, error.error_kind());
                            return Err(error.into());
                        }
                        None => {
                            let error = fable_core::errors::BackendError::StreamInterrupted(
                                "stream ended without completing".into(),
                            );
                            self.record_request(&options, started, prompt_chars, 0, error.error_kind());
                            return Err(error.into());
                        }
                    }
                }
            }
        };

        self.state = LoopState::Appending;
        if let Some(text) = user_input {
            self.store.append(Role::User, text)?;
        }
        self.store.append(Role::Narrator, narration.clone())?;

        let chars = narration.chars().count();
        self.record_request(&options, started, prompt_chars, chars, "ok");
        self.emit(SessionEvent::TurnComplete {
            session_id: self.session_id.clone(),
            turn: self.store.len() as u64 - 1,
            chars,
        });

        if let Some(tts) = &self.tts {
            tts.speak(&narration);
        }
        Ok(())
    }

    fn cancelled(
        &mut self,
        options: &GenerationOptions,
        started: Instant,
        prompt_chars: usize,
    ) -> Result<(), EngineError> {
        info!(session_id = %self.session_id, "generation cancelled");
        self.record_request(options, started, prompt_chars, 0, "cancelled");
        self.emit(SessionEvent::GenerationCancelled {
            session_id: self.session_id.clone(),
        });
        Err(EngineError::Cancelled)
    }

    fn record_request(
        &self,
        options: &GenerationOptions,
        started: Instant,
        prompt_chars: usize,
        reply_chars: usize,
        outcome: &str,
    ) {
        if let Some(requests) = &self.requests {
            requests.record(
                self.session_id.as_str(),
                &options.model,
                self.backend.name(),
                started.elapsed(),
                prompt_chars,
                reply_chars,
                outcome,
            );
        }
    }

    /// Fatal errors end the session: best-effort autosave, then terminate.
    fn check_fatal<T>(&mut self, result: Result<T, EngineError>) -> Result<T, EngineError> {
        if let Err(e) = &result {
            if e.is_fatal() {
                error!(session_id = %self.session_id, error = %e, "fatal error, terminating session");
                if let Err(save_err) = fable_store::save_turns(
                    &self.config.autosave_path,
                    self.store.turns(),
                    self.modes.active_model(),
                ) {
                    warn!(error = %save_err, "autosave failed during termination");
                }
                self.terminate("fatal error");
            }
        }
        result
    }

    fn terminate(&mut self, reason: &str) {
        self.state = LoopState::Terminated;
        self.emit(SessionEvent::Terminated {
            session_id: self.session_id.clone(),
            reason: reason.to_string(),
        });
    }

    fn emit(&self, event: SessionEvent) {
        // Nobody listening is fine; events are advisory.
        let _ = self.events.send(event);
    }
}
