use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tokio_util::sync::CancellationToken;

use super::executor::{execute_stream, StreamEvent};
use super::keys::KeyRotation;
use super::payload::{build_request, PayloadInput};
use super::settings::AppSettings;
use super::sidecall;
use crate::models::{Attachment, Conversation, Message, Persona, Role, ToolConfig};
use crate::providers::traits::GenerativeBackend;

/// How a generation ended. The orchestrator is back in the idle state by the
/// time a caller sees one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationOutcome {
    Completed,
    Cancelled,
    Failed,
}

/// Drives one conversation's generations: send, regenerate, edit-and-resubmit,
/// cancel, and the chunk-merge loop in between.
///
/// The conversation lives behind a shared handle owned by the caller; the UI
/// may delete or edit other messages while a stream is in flight, so every
/// merge locates its target by id and silently no-ops when the id is gone.
/// Only one generation runs at a time; starting a new one cancels the active
/// one first, and each generation writes solely to the placeholder it created.
pub struct ChatOrchestrator {
    backend: Arc<dyn GenerativeBackend>,
    keys: Arc<KeyRotation>,
    session: Arc<RwLock<Option<Conversation>>>,
    settings: RwLock<AppSettings>,
    persona: RwLock<Option<Persona>>,
    cancel: Mutex<Option<CancellationToken>>,
    generating: AtomicBool,
    /// Monotonic generation id; a superseded run must not clear the flag of
    /// the run that replaced it.
    epoch: AtomicU64,
    suggestions: RwLock<Vec<String>>,
}

impl ChatOrchestrator {
    pub fn new(
        backend: Arc<dyn GenerativeBackend>,
        keys: Arc<KeyRotation>,
        session: Arc<RwLock<Option<Conversation>>>,
        settings: AppSettings,
    ) -> Self {
        Self {
            backend,
            keys,
            session,
            settings: RwLock::new(settings),
            persona: RwLock::new(None),
            cancel: Mutex::new(None),
            generating: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            suggestions: RwLock::new(Vec::new()),
        }
    }

    pub fn set_settings(&self, settings: AppSettings) {
        *self.settings.write().unwrap() = settings;
    }

    pub fn set_persona(&self, persona: Option<Persona>) {
        *self.persona.write().unwrap() = persona;
    }

    pub fn is_generating(&self) -> bool {
        self.generating.load(Ordering::SeqCst)
    }

    /// Reply suggestions from the most recent completed exchange.
    pub fn suggestions(&self) -> Vec<String> {
        self.suggestions.read().unwrap().clone()
    }

    /// Append a user message and stream the model's reply. Creates the
    /// conversation on first use, with a provisional title that a best-effort
    /// auto-title call replaces asynchronously.
    pub async fn send(
        &self,
        text: String,
        attachments: Vec<Attachment>,
        tools: ToolConfig,
    ) -> GenerationOutcome {
        self.cancel_active();

        let created_id = {
            let mut guard = self.session.write().unwrap();
            if guard.is_none() {
                let settings = self.settings.read().unwrap();
                let conv = Conversation::new(
                    sidecall::truncate_title(&text),
                    settings.default_model.clone(),
                );
                let id = conv.id.clone();
                *guard = Some(conv);
                Some(id)
            } else {
                None
            }
        };

        if let Some(conversation_id) = created_id {
            self.spawn_auto_title(conversation_id, text.clone());
        }

        {
            let mut guard = self.session.write().unwrap();
            if let Some(conv) = guard.as_mut() {
                conv.messages.push(Message::user(text, attachments));
            }
        }

        self.run_generation(tools).await
    }

    /// Drop the trailing model message and replay the history before it.
    /// A no-op unless the conversation ends with a model message directly
    /// preceded by a user message.
    pub async fn regenerate(&self) -> Option<GenerationOutcome> {
        self.cancel_active();

        {
            let mut guard = self.session.write().unwrap();
            let conv = guard.as_mut()?;
            let n = conv.messages.len();
            if n < 2
                || conv.messages[n - 1].role != Role::Model
                || conv.messages[n - 2].role != Role::User
            {
                return None;
            }
            conv.messages.pop();
        }

        // Replay with the defaults of a fresh search-enabled send
        let tools = ToolConfig::default().with_web_search(true);
        Some(self.run_generation(tools).await)
    }

    /// Replace a message's text, drop everything after it, and replay the
    /// truncated history. Editing a model message is a plain content edit:
    /// nothing is truncated and no generation starts.
    pub async fn edit_and_resubmit(
        &self,
        message_id: &str,
        new_text: String,
    ) -> Option<GenerationOutcome> {
        self.cancel_active();

        {
            let mut guard = self.session.write().unwrap();
            let conv = guard.as_mut()?;
            let idx = conv.messages.iter().position(|m| m.id == message_id)?;
            conv.messages[idx].content = new_text;
            if conv.messages[idx].role == Role::Model {
                return None;
            }
            conv.messages.truncate(idx + 1);
        }

        Some(self.run_generation(ToolConfig::default()).await)
    }

    /// Stop consuming the active stream at the next chunk boundary. Partial
    /// content already merged stays in place.
    pub fn cancel(&self) {
        if !self.is_generating() {
            return;
        }
        if let Some(token) = self.cancel.lock().unwrap().as_ref() {
            token.cancel();
        }
    }

    fn cancel_active(&self) {
        if let Some(token) = self.cancel.lock().unwrap().take() {
            token.cancel();
        }
    }

    fn spawn_auto_title(&self, conversation_id: String, text: String) {
        let backend = self.backend.clone();
        let keys = self.keys.clone();
        let session = self.session.clone();
        let model = self.settings.read().unwrap().utility_model.clone();
        tokio::spawn(async move {
            let Some(title) = sidecall::generate_title(&backend, &keys, &model, &text).await
            else {
                return;
            };
            let mut guard = session.write().unwrap();
            if let Some(conv) = guard.as_mut() {
                if conv.id == conversation_id {
                    conv.title = title;
                }
            }
        });
    }

    /// Apply a mutation to a message by id; no-op when the conversation or
    /// the message has gone away under a concurrent edit.
    fn with_message<F>(&self, id: &str, f: F)
    where
        F: FnOnce(&mut Message),
    {
        let mut guard = self.session.write().unwrap();
        if let Some(msg) = guard.as_mut().and_then(|c| c.message_mut(id)) {
            f(msg);
        }
    }

    async fn run_generation(&self, tools: ToolConfig) -> GenerationOutcome {
        let settings = self.settings.read().unwrap().clone();
        let persona = self.persona.read().unwrap().clone();

        let Some((history, model, study_mode)) = ({
            let guard = self.session.read().unwrap();
            guard
                .as_ref()
                .map(|c| (c.messages.clone(), c.model.clone(), c.study_mode))
        }) else {
            return GenerationOutcome::Failed;
        };

        let request = build_request(PayloadInput {
            messages: &history,
            persona: persona.as_ref(),
            settings: &settings,
            tools,
            study_mode,
            model: &model,
        });
        let thoughts_requested = request.include_thoughts;

        let placeholder_id = {
            let mut guard = self.session.write().unwrap();
            let Some(conv) = guard.as_mut() else {
                return GenerationOutcome::Failed;
            };
            let placeholder = Message::placeholder();
            let id = placeholder.id.clone();
            conv.messages.push(placeholder);
            id
        };

        let token = CancellationToken::new();
        *self.cancel.lock().unwrap() = Some(token.clone());
        let my_epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.generating.store(true, Ordering::SeqCst);

        let backend = self.backend.clone();
        let mut rx = execute_stream(self.keys.clone(), move |key| {
            let backend = backend.clone();
            let request = request.clone();
            async move { backend.stream_generate(&key, &request).await }
        });

        let outcome = loop {
            tokio::select! {
                _ = token.cancelled() => {
                    break GenerationOutcome::Cancelled;
                }
                event = rx.recv() => {
                    match event {
                        Some(StreamEvent::Opened) => {
                            // Fresh attempt: discard partial accumulation
                            self.with_message(&placeholder_id, |m| {
                                m.content.clear();
                                m.thoughts = None;
                                m.grounding = None;
                            });
                        }
                        Some(StreamEvent::Text(delta)) => {
                            self.with_message(&placeholder_id, |m| m.content.push_str(&delta));
                        }
                        Some(StreamEvent::Thought(delta)) => {
                            if thoughts_requested {
                                self.with_message(&placeholder_id, |m| {
                                    m.thoughts.get_or_insert_with(String::new).push_str(&delta);
                                });
                            }
                        }
                        Some(StreamEvent::Grounding(info)) => {
                            self.with_message(&placeholder_id, |m| m.grounding = Some(info));
                        }
                        Some(StreamEvent::Done) => {
                            break GenerationOutcome::Completed;
                        }
                        Some(StreamEvent::Failed(error)) => {
                            self.with_message(&placeholder_id, |m| m.content = error.clone());
                            break GenerationOutcome::Failed;
                        }
                        None => {
                            tracing::error!("Stream channel closed without a terminal event");
                            self.with_message(&placeholder_id, |m| {
                                m.content = "Stream ended unexpectedly".to_string();
                            });
                            break GenerationOutcome::Failed;
                        }
                    }
                }
            }
        };

        self.with_message(&placeholder_id, |m| m.pending = false);
        if self.epoch.load(Ordering::SeqCst) == my_epoch {
            self.generating.store(false, Ordering::SeqCst);
        }

        if outcome == GenerationOutcome::Completed && settings.suggest_replies {
            self.refresh_suggestions(&placeholder_id, &settings).await;
        }

        outcome
    }

    async fn refresh_suggestions(&self, placeholder_id: &str, settings: &AppSettings) {
        let exchange = {
            let guard = self.session.read().unwrap();
            guard.as_ref().and_then(|conv| {
                let reply = conv.message(placeholder_id)?.content.clone();
                let prompt = conv
                    .messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.clone())?;
                Some((prompt, reply))
            })
        };
        let Some((user_text, model_text)) = exchange else {
            return;
        };

        let replies = sidecall::suggest_replies(
            &self.backend,
            &self.keys,
            &settings.utility_model,
            &user_text,
            &model_text,
        )
        .await;
        *self.suggestions.write().unwrap() = replies;
    }
}
