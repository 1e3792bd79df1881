//! Core domain types for the image generation bot.
//!
//! This crate contains shared types used across all packages:
//! - Job identity, outcome and execution snapshots for the request queue
//! - Events emitted by the request queue
//! - Generation settings and their validation

mod events;
mod job;
mod settings;

pub use events::QueueEvent;
pub use job::{ExecutionSnapshot, JobError, JobId, JobName, JobOutcome, QueueStatus};
pub use settings::{
    GenerationSettings, ImageSize, ModelKind, ModelRef, Parameter, Precision, SAMPLERS, Sampler,
    SettingsError,
};
