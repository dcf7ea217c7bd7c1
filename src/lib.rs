//! Shared configuration for the sourceprep sandbox preparation pipeline.
//!
//! The pipeline itself lives in `sourceprep-preparer`; this crate owns the
//! `sourceprep.toml` schema read by every consumer.

pub mod config;

pub use config::{
    ConfigError, DEFAULT_CONFIG_FILE, ExtractionConfig, MismatchAction, MissingEntryPolicy,
    PrepConfig, ResourcesConfig, SubstitutionConfig, VerificationConfig,
};
