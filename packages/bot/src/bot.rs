//! The bot: routes user messages and runs generation requests through the
//! request queue.

use std::sync::Arc;
use std::time::Duration;

use bot_core::{GenerationSettings, JobError, ModelKind, ModelRef, Parameter, SettingsError};
use request_queue::{Job, JobResult, QueueError, RequestQueue};
use storage::{Storage, StorageError, StoredGeneration};
use tokio::sync::Mutex;

use crate::backend::{BackendError, ImageBackend};
use crate::commands::Command;
use crate::config::BotConfig;
use crate::replies;
use crate::resources::ResourceScanner;
use crate::session::SessionStore;
use crate::transport::{ChatTransport, IncomingMessage, MessageId, MessageRef, TransportError, UserId};

/// Name under which generation requests appear in the queue.
pub const GENERATE_JOB: &str = "generate_image";

#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to list resources: {0}")]
    Resources(#[from] std::io::Error),
}

/// Everything a queued generation needs to report its own result.
#[derive(Debug, Clone)]
struct GenerationRequest {
    user: UserId,
    /// The message that asked for the image; names the output files.
    message: MessageId,
    settings: GenerationSettings,
}

struct Inner<T, B> {
    allowed_user: UserId,
    default_model_kind: ModelKind,
    status_poll: Duration,
    transport: T,
    /// Held for the whole of a generation; `/clear` waits for it.
    backend: Mutex<B>,
    queue: RequestQueue,
    storage: Storage,
    sessions: SessionStore,
    scanner: ResourceScanner,
}

/// Image generation bot for a single authorized user. Cheap to clone.
pub struct ImageBot<T, B> {
    inner: Arc<Inner<T, B>>,
}

impl<T, B> Clone for ImageBot<T, B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: ChatTransport, B: ImageBackend> ImageBot<T, B> {
    pub fn new(
        config: &BotConfig,
        transport: T,
        backend: B,
        queue: RequestQueue,
        storage: Storage,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                allowed_user: config.allowed_user_id,
                default_model_kind: config.default_model_kind.clone(),
                status_poll: config.status_poll,
                transport,
                backend: Mutex::new(backend),
                queue,
                storage,
                sessions: SessionStore::new(config.default_settings()),
                scanner: ResourceScanner::new(config),
            }),
        }
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    pub fn queue(&self) -> &RequestQueue {
        &self.inner.queue
    }

    pub fn storage(&self) -> &Storage {
        &self.inner.storage
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.inner.sessions
    }

    /// Handle one incoming message. Generation requests return once queued.
    pub async fn handle_message(&self, message: IncomingMessage) -> Result<(), BotError> {
        let user = message.user;
        if user != self.inner.allowed_user {
            tracing::warn!("Unauthorized access attempt from user {}", user);
            return self.reply(user, replies::ACCESS_DENIED).await;
        }

        let sessions = &self.inner.sessions;
        match Command::parse(&message.text) {
            Command::Start => self.show_panel(user).await?,
            Command::Generate => {
                let settings = sessions.start_generation(user).await;
                self.start_generation(user, message.id, settings).await?;
            }
            Command::Help => self.reply(user, replies::HELP).await?,
            Command::Clear => {
                self.inner.backend.lock().await.unload();
                self.reply(user, replies::MODEL_UNLOADED).await?;
            }
            Command::ApplyDefault => {
                sessions.apply_default(user).await;
                self.show_panel(user).await?;
            }
            Command::ApplyLast => {
                if sessions.apply_last(user).await.is_none() {
                    self.reply(user, replies::NO_LAST_SETTINGS).await?;
                }
                self.show_panel(user).await?;
            }
            Command::Repeat => match sessions.last(user).await {
                Some(settings) => self.start_generation(user, message.id, settings).await?,
                None => self.reply(user, replies::NOTHING_TO_REPEAT).await?,
            },
            Command::Status => {
                let status = self.inner.queue.status();
                self.reply(user, &replies::queue_status(&status)).await?;
            }
            Command::Set { param, value } => {
                if value.is_empty() {
                    return self.reply(user, &replies::missing_value(param)).await;
                }
                match sessions.set(user, param, &value).await {
                    Ok(_) => {
                        self.reply(user, &replies::parameter_set(param, &value)).await?;
                        self.show_panel(user).await?;
                    }
                    Err(e) => self.reply(user, &replies::invalid_value(&e)).await?,
                }
            }
            Command::List(kind) => {
                let items = self.inner.scanner.scan(kind).await?;
                self.reply(user, &replies::resource_list(kind, &items)).await?;
            }
            Command::Prompt(text) => {
                sessions.set(user, Parameter::Prompt, &text).await?;
                self.show_panel(user).await?;
            }
            Command::Unknown(command) => {
                self.reply(user, &replies::unknown_command(&command)).await?;
            }
        }

        Ok(())
    }

    async fn reply(&self, chat: UserId, text: &str) -> Result<(), BotError> {
        self.inner.transport.send_text(chat, text).await?;
        Ok(())
    }

    async fn show_panel(&self, user: UserId) -> Result<(), BotError> {
        let sessions = &self.inner.sessions;
        let settings = sessions.current(user).await;
        let has_last = sessions.last(user).await.is_some();
        self.reply(user, &replies::settings_panel(&settings, has_last))
            .await
    }

    async fn start_generation(
        &self,
        user: UserId,
        message: MessageId,
        settings: GenerationSettings,
    ) -> Result<(), BotError> {
        let request = GenerationRequest {
            user,
            message,
            settings,
        };
        // Acknowledge first so the reply never trails the job's own messages.
        let status_message = self.inner.transport.send_text(user, replies::QUEUED).await?;

        let bot = self.clone();
        let job_id = self.inner.queue.enqueue(Job::new(GENERATE_JOB, move || async move {
            bot.generate_and_send(request).await
        }))?;
        tracing::debug!("Queued generation {} for user {}", job_id, user);

        self.spawn_status_updates(status_message);
        Ok(())
    }

    /// Keep a queued request's status message current while anything is
    /// still waiting in the queue.
    fn spawn_status_updates(&self, message: MessageRef) {
        let bot = self.clone();
        tokio::spawn(async move {
            let queue = &bot.inner.queue;
            while queue.size() > 0 {
                let text = replies::queue_position(&queue.status());
                if let Err(e) = bot.inner.transport.edit_text(message, &text).await {
                    tracing::error!("Error updating queue status: {}", e);
                    break;
                }
                tokio::time::sleep(bot.inner.status_poll).await;
            }
        });
    }

    /// Body of a queued generation job. Failures are reported to the user
    /// and returned so the queue records them.
    async fn generate_and_send(&self, request: GenerationRequest) -> JobResult {
        match self.generate(&request).await {
            Ok(stored) => {
                tracing::info!(
                    "Image generated for user {} ({})",
                    request.user,
                    stored.image_key
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!("Error during image generation for user {}: {}", request.user, e);
                let text = replies::job_error(&e);
                if let Err(send_err) = self.inner.transport.send_text(request.user, &text).await {
                    tracing::error!("Failed to report generation error: {}", send_err);
                }
                Err(JobError::failed(e.to_string()))
            }
        }
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<StoredGeneration, BotError> {
        let inner = &self.inner;
        let chat = request.user;
        let settings = &request.settings;

        let status_message = inner.transport.send_text(chat, replies::PREPARING).await?;
        let model = ModelRef::parse(&settings.model, &inner.default_model_kind)?;
        let vae = settings.vae.as_deref();

        let mut backend = inner.backend.lock().await;
        let reusable = backend
            .loaded()
            .is_some_and(|loaded| loaded.matches(&model, vae));
        if !reusable {
            let text = replies::model_loading(&model.name, model.kind.as_str());
            self.update_status(status_message, &text).await;
            backend.load_model(&model, vae).await?;
        }
        if let Some(lora) = settings.lora.as_deref() {
            self.update_status(status_message, replies::LORA_LOADING).await;
            backend.load_lora(lora).await?;
        }

        self.update_status(status_message, replies::GENERATING).await;
        let png = backend.generate(settings).await?;
        drop(backend);
        self.update_status(status_message, replies::FINISHED).await;

        let stem = format!("{}_{}", request.user, request.message);
        let stored = inner
            .storage
            .store_generation(&stem, png.clone(), settings)
            .await?;

        let caption = replies::image_caption(&serde_json::to_string_pretty(settings)?);
        inner.transport.send_photo(chat, png, &caption).await?;
        Ok(stored)
    }

    /// Best-effort progress edit; a failed edit never fails the job.
    async fn update_status(&self, message: MessageRef, stage: &str) {
        let text = replies::progress(stage, &self.inner.queue.status());
        if let Err(e) = self.inner.transport.edit_text(message, &text).await {
            tracing::error!("Error updating status: {}", e);
        }
    }
}
