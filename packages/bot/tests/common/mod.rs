//! Test doubles for the chat transport and the image backend.

#![allow(dead_code)]
#![allow(clippy::disallowed_methods)]

use std::collections::HashMap;
use std::error::Error;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bot::{
    BackendError, BotConfig, ChatTransport, ImageBackend, ImageBot, IncomingMessage,
    LoadedModel, MessageId, MessageRef, TransportError, UserId,
};
use bot_core::{GenerationSettings, ModelRef};
use bytes::Bytes;
use request_queue::RequestQueue;
use storage::{Storage, StorageConfig};

pub const OWNER: UserId = UserId(42);
pub const STRANGER: UserId = UserId(7);
pub const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake";

/// Something the bot sent.
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text { chat: UserId, id: MessageId, text: String },
    Edit { id: MessageId, text: String },
    Photo { chat: UserId, bytes: usize, caption: String },
}

/// Records every outgoing message.
#[derive(Clone, Default)]
pub struct MockTransport {
    sent: Arc<Mutex<Vec<Sent>>>,
    next_id: Arc<AtomicI64>,
}

impl MockTransport {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().expect("transport log").clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Text { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn photos(&self) -> Vec<(UserId, usize, String)> {
        self.sent()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Photo { chat, bytes, caption } => Some((chat, bytes, caption)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, sent: Sent) {
        self.sent.lock().expect("transport log").push(sent);
    }

    fn allocate(&self) -> MessageId {
        MessageId(1000 + self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

impl ChatTransport for MockTransport {
    fn send_text(
        &self,
        chat: UserId,
        text: &str,
    ) -> impl Future<Output = Result<MessageRef, TransportError>> + Send {
        let id = self.allocate();
        self.record(Sent::Text {
            chat,
            id,
            text: text.to_string(),
        });
        std::future::ready(Ok(MessageRef { chat, id }))
    }

    fn edit_text(
        &self,
        message: MessageRef,
        text: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        self.record(Sent::Edit {
            id: message.id,
            text: text.to_string(),
        });
        std::future::ready(Ok(()))
    }

    fn send_photo(
        &self,
        chat: UserId,
        png: Bytes,
        caption: &str,
    ) -> impl Future<Output = Result<MessageRef, TransportError>> + Send {
        let id = self.allocate();
        self.record(Sent::Photo {
            chat,
            bytes: png.len(),
            caption: caption.to_string(),
        });
        std::future::ready(Ok(MessageRef { chat, id }))
    }
}

/// Backend that records calls and returns a fixed image.
#[derive(Clone, Default)]
pub struct MockBackend {
    calls: Arc<Mutex<Vec<String>>>,
    /// Generation fails while set.
    failure: Arc<Mutex<Option<String>>>,
    /// Extra time every generation takes.
    delay: Arc<Mutex<Duration>>,
    loaded: Option<LoadedModel>,
}

impl MockBackend {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("backend log").clone()
    }

    pub fn fail_with(&self, message: Option<&str>) {
        *self.failure.lock().expect("failure flag") = message.map(str::to_string);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().expect("delay") = delay;
    }

    fn record(&self, call: String) {
        self.calls.lock().expect("backend log").push(call);
    }
}

impl ImageBackend for MockBackend {
    async fn load_model(&mut self, model: &ModelRef, vae: Option<&str>) -> Result<(), BackendError> {
        self.record(format!("load_model {model}"));
        self.loaded = Some(LoadedModel {
            model: model.clone(),
            vae: vae.map(str::to_string),
            loras: Vec::new(),
        });
        Ok(())
    }

    async fn load_lora(&mut self, lora: &str) -> Result<(), BackendError> {
        self.record(format!("load_lora {lora}"));
        Ok(())
    }

    async fn generate(&mut self, settings: &GenerationSettings) -> Result<Bytes, BackendError> {
        self.record(format!("generate {}", settings.prompt));
        let delay = *self.delay.lock().expect("delay");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let failure = self.failure.lock().expect("failure flag").clone();
        match failure {
            Some(stderr) => Err(BackendError::Process {
                status: "exit status: 1".to_string(),
                stderr,
            }),
            None => Ok(Bytes::from_static(FAKE_PNG)),
        }
    }

    fn unload(&mut self) {
        self.record("unload".to_string());
        self.loaded = None;
    }

    fn loaded(&self) -> Option<&LoadedModel> {
        self.loaded.as_ref()
    }
}

pub struct Harness {
    pub bot: ImageBot<MockTransport, MockBackend>,
    pub transport: MockTransport,
    pub backend: MockBackend,
    pub queue: RequestQueue,
    next_message: AtomicI64,
}

impl Harness {
    /// Bot with a running queue, in-memory storage and resource
    /// directories under `dir`.
    pub async fn start(dir: &Path) -> Result<Self, Box<dyn Error>> {
        let vars: HashMap<&str, String> = HashMap::from([
            ("ALLOWED_USER_ID", OWNER.0.to_string()),
            ("MODELS_PATH", dir.join("models").display().to_string()),
            ("LORA_PATH", dir.join("lora").display().to_string()),
            ("VAE_PATH", dir.join("vae").display().to_string()),
            ("DEFAULT_MODEL", "xl#base.safetensors".to_string()),
            ("STATUS_POLL_SECS", "1".to_string()),
            ("STORAGE_BACKEND", "memory".to_string()),
        ]);
        let config = BotConfig::from_lookup(|name| vars.get(name).cloned())?;

        let transport = MockTransport::default();
        let backend = MockBackend::default();
        let (queue, _worker) = RequestQueue::start().await?;
        let storage = Storage::new(StorageConfig::memory())?;
        let bot = ImageBot::new(
            &config,
            transport.clone(),
            backend.clone(),
            queue.clone(),
            storage,
        );

        Ok(Self {
            bot,
            transport,
            backend,
            queue,
            next_message: AtomicI64::new(1),
        })
    }

    /// Deliver `text` from `user` and return the message id it was given.
    pub async fn send_from(&self, user: UserId, text: &str) -> Result<MessageId, Box<dyn Error>> {
        let id = MessageId(self.next_message.fetch_add(1, Ordering::SeqCst));
        self.bot
            .handle_message(IncomingMessage {
                user,
                id,
                text: text.to_string(),
            })
            .await?;
        Ok(id)
    }

    pub async fn send(&self, text: &str) -> Result<MessageId, Box<dyn Error>> {
        self.send_from(OWNER, text).await
    }

    pub fn last_text(&self) -> String {
        self.transport.texts().pop().unwrap_or_default()
    }
}

/// Poll `check` until it holds or a few seconds pass.
pub async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
