mod check_service;
mod replication_service;
mod sequence_service;

pub use check_service::{CheckService, Probe};
pub use replication_service::{
    CreateOptions, DropOptions, ReplicationError, ReplicationService, StartOptions, StopOptions,
};
pub use sequence_service::{
    SequenceService, SyncMode, SyncOptions, SyncReport, SyncedSequence,
};
