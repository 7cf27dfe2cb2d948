//! Sequence Service - Sequence-value synchronization
//!
//! Logical replication excludes sequence state, so after a switchover the
//! target's sequences would hand out values the source already consumed.
//! This service copies each source sequence's value over, either exactly
//! (equal mode) or projected past in-flight consumption with a measured
//! drift offset plus a fixed safety margin (offset mode).
//!
//! Sampling a sequence consumes a value on the source: the only way to
//! read a sequence's position is `nextval`, and that cannot be undone.
//! Dry runs still consume.

use crate::domain::ports::{Database, DatabaseError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Set target sequences to exactly the sampled source values,
    /// assuming the source will no longer move.
    Equal,
    /// Pause, resample, and project past concurrent consumption.
    Offset,
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub mode: SyncMode,
    /// Safety margin added on top of the measured drift (offset mode).
    pub fixed_offset: i64,
    /// Explicit per-sequence offsets; these skip the second sample.
    pub sequence_offsets: HashMap<String, i64>,
    /// Wall-clock pause between the two samples.
    pub sample_pause: Duration,
    pub dry_run: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            mode: SyncMode::Offset,
            fixed_offset: 100,
            sequence_offsets: HashMap::new(),
            sample_pause: Duration::from_secs(1),
            dry_run: false,
        }
    }
}

/// One applied (or dry-run) sequence value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedSequence {
    pub name: String,
    pub value: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub sequences: Vec<SyncedSequence>,
    pub dry_run: bool,
}

/// Sequence synchronizer.
pub struct SequenceService {
    source: Arc<dyn Database>,
    target: Arc<dyn Database>,
}

impl SequenceService {
    pub fn new(source: Arc<dyn Database>, target: Arc<dyn Database>) -> Self {
        Self { source, target }
    }

    /// Synchronize sequence values from the source to the target.
    pub async fn run(&self, options: &SyncOptions) -> Result<SyncReport, DatabaseError> {
        let names = self.source.sequence_names().await?;
        if names.is_empty() {
            tracing::warn!("no sequences found");
            return Ok(SyncReport {
                sequences: Vec::new(),
                dry_run: options.dry_run,
            });
        }

        let mut first_samples = Vec::with_capacity(names.len());
        for name in names {
            let value = self.source.next_sequence_value(&name).await?;
            tracing::debug!("last value of sequence `{name}` on first sample is {value}");
            first_samples.push((name, value));
        }

        let mut report = SyncReport {
            sequences: Vec::new(),
            dry_run: options.dry_run,
        };

        match options.mode {
            SyncMode::Equal => {
                for (name, value) in first_samples {
                    // `is_called = false`: the copied value itself is the
                    // next one the target hands out.
                    self.apply(&name, value, false, options.dry_run).await?;
                    report.sequences.push(SyncedSequence { name, value });
                }
            }
            SyncMode::Offset => {
                tokio::time::sleep(options.sample_pause).await;

                let mut offsets = options.sequence_offsets.clone();
                for (name, first_value) in &first_samples {
                    if offsets.contains_key(name) {
                        continue;
                    }
                    let second_value = self.source.next_sequence_value(name).await?;
                    let offset = second_value - first_value;
                    tracing::debug!(
                        "last value of sequence `{name}` on second sample is {second_value}, \
                         offset at {offset}"
                    );
                    offsets.insert(name.clone(), offset);
                }

                for (name, first_value) in first_samples {
                    let value = first_value + offsets[&name] + options.fixed_offset;
                    self.apply(&name, value, true, options.dry_run).await?;
                    report.sequences.push(SyncedSequence { name, value });
                }
            }
        }

        Ok(report)
    }

    async fn apply(
        &self,
        sequence: &str,
        value: i64,
        is_called: bool,
        dry_run: bool,
    ) -> Result<(), DatabaseError> {
        if dry_run {
            tracing::info!("would set target sequence `{sequence}` value to {value}");
            return Ok(());
        }
        self.target
            .set_sequence_value(sequence, value, is_called)
            .await?;
        tracing::debug!("set target sequence `{sequence}` value to {value}");
        Ok(())
    }
}
