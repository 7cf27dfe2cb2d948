//! pgferry Library
//!
//! This module exposes the pgferry components for use in integration
//! tests and as a library.

pub mod adapters;
pub mod application;
pub mod cli;
pub mod config;
pub mod domain;

// Re-export commonly used types
pub use application::{
    CheckService, CreateOptions, DropOptions, Probe, ReplicationError, ReplicationService,
    SequenceService, StartOptions, StopOptions, SyncMode, SyncOptions,
};
pub use config::{
    Config, ConnectionSettings, DEFAULT_PUBLICATION_NAME, DEFAULT_SUBSCRIPTION_NAME,
    REPLICATION_APPLICATION_NAME, REPLICATION_ROLE,
};
pub use domain::entities::{CheckResult, Severity, StatusReport};
pub use domain::ports::{
    Database, DatabaseError, DiffRenderer, SchemaDumper, SecretStore,
};
