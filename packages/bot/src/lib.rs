//! Chat bot front end for queued image generation.
//!
//! A single authorized user edits generation settings through chat
//! commands; every generation request becomes a job on the
//! [`request_queue::RequestQueue`], so the GPU runs one image at a time.
//!
//! # Seams
//!
//! - [`ChatTransport`] - Sends, edits and delivers messages to the user
//! - [`ImageBackend`] - Loads models and renders PNGs

mod backend;
mod bot;
mod commands;
mod config;
pub mod replies;
mod resources;
mod session;
mod transport;

pub use backend::{BackendError, ImageBackend, LoadedModel, ProcessBackend};
pub use bot::{BotError, GENERATE_JOB, ImageBot};
pub use commands::Command;
pub use config::{BotConfig, ConfigError};
pub use resources::{ResourceKind, ResourceScanner};
pub use session::SessionStore;
pub use transport::{
    ChatTransport, ConsoleTransport, IncomingMessage, MessageId, MessageRef, TransportError,
    UserId,
};
