// crates/promstore-core/src/runtime/ingest.rs
// ============================================================================
// Module: Promstore Batch Ingestor
// Description: Partitions write requests by metric and commits each group.
// Purpose: Turn push-protocol writes into per-metric transactions with exact accounting.
// Dependencies: crate::{core, interfaces, runtime, telemetry}, thiserror, tracing
// ============================================================================

//! ## Overview
//! [`Ingestor::ingest`] validates every series and sample, partitions what
//! survives by metric, and commits one transaction per metric group after
//! resolving the group's catalog entry and series ids. Accounting is exact:
//! every received sample ends up either inserted or failed.
//!
//! Failure scope follows the error kind:
//! - invalid labels or timestamps drop only the offending series or sample;
//! - authorization, provisioning, and storage failures fail only their group;
//! - pool exhaustion (after retries) and cancellation abort every group not
//!   yet committed, and those samples are reported failed.
//!
//! Metadata is upserted independently of samples. Metrics provisioned during
//! the batch are finalized once at the end of the batch.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use thiserror::Error;

use crate::core::Interrupted;
use crate::core::MetadataEntry;
use crate::core::MetricName;
use crate::core::RawSample;
use crate::core::RequestContext;
use crate::core::Sample;
use crate::core::SeriesKey;
use crate::core::TimeSeries;
use crate::core::WriteRequest;
use crate::core::validation::validate_timestamp;
use crate::interfaces::CatalogStore;
use crate::interfaces::LeaseStore;
use crate::interfaces::SampleStore;
use crate::interfaces::StoreError;
use crate::runtime::provision::ProvisionError;
use crate::runtime::provision::Provisioner;
use crate::runtime::retry::RetryError;
use crate::runtime::retry::RetryPolicy;
use crate::runtime::retry::Retryable;
use crate::telemetry::AdapterMetrics;
use crate::telemetry::CounterKind;
use crate::telemetry::DurationKind;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Ingestor configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestConfig {
    /// Retry policy for transient store failures.
    pub retry: RetryPolicy,
    /// Deadline applied when the caller supplied none.
    pub default_timeout: Option<Duration>,
}

// ============================================================================
// SECTION: Reports
// ============================================================================

/// Failure classification for a metric group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Permission verification rejected a relation.
    Authorization,
    /// Metric or series could not be provisioned.
    Provisioning,
    /// Leadership was lost mid-provisioning.
    LeaseLost,
    /// Store failed after bounded retries.
    Storage,
    /// Group never ran because the request stopped.
    Interrupted,
    /// Group never ran because connections were exhausted.
    ResourceExhausted,
}

impl FailureKind {
    /// Returns a stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Authorization => "authorization",
            Self::Provisioning => "provisioning",
            Self::LeaseLost => "lease_lost",
            Self::Storage => "storage",
            Self::Interrupted => "interrupted",
            Self::ResourceExhausted => "resource_exhausted",
        }
    }
}

/// Failure record for one metric group, or for the series of a group that
/// could not be resolved while the rest of the group committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricFailure {
    /// Metric name.
    pub metric: MetricName,
    /// Failure classification.
    pub kind: FailureKind,
    /// Whether resubmitting the samples later may succeed.
    pub retryable: bool,
    /// Samples that were not committed because of this failure.
    pub samples: u64,
    /// Failure detail.
    pub message: String,
}

/// Outcome counts for one write request.
///
/// # Invariants
/// - `samples_inserted + samples_failed == samples_received`.
/// - `metadata_inserted + metadata_failed == metadata_received`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Samples in the request.
    pub samples_received: u64,
    /// Samples committed.
    pub samples_inserted: u64,
    /// Samples dropped or not committed.
    pub samples_failed: u64,
    /// Metadata entries in the request.
    pub metadata_received: u64,
    /// Metadata entries committed.
    pub metadata_inserted: u64,
    /// Metadata entries not committed.
    pub metadata_failed: u64,
    /// Per-metric group failures.
    pub metric_failures: Vec<MetricFailure>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Systemic ingest failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    /// One or more metric groups failed; see the report.
    #[error("{failed} metric group(s) failed")]
    MetricGroups {
        /// Failed group count.
        failed: usize,
    },
    /// Connections exhausted; remaining groups were not attempted.
    #[error("store connections exhausted: {0}")]
    ResourceExhausted(String),
    /// Request stopped; remaining groups were not attempted.
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
    /// Metadata upsert failed.
    #[error("metadata upsert failed: {0}")]
    Metadata(String),
}

impl IngestError {
    /// Returns true when resubmitting the request may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::MetricGroups { .. })
    }
}

/// Ingest failure carrying the accounting gathered before the failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{error}")]
pub struct IngestFailure {
    /// Counts for the request.
    pub report: IngestReport,
    /// Systemic error.
    pub error: IngestError,
}

/// Error raised while writing one metric group.
#[derive(Debug, Clone)]
enum GroupError {
    /// Resolution or provisioning failed.
    Provision(ProvisionError),
    /// Sample insert failed.
    Store(StoreError),
}

impl GroupError {
    /// Returns true when the store ran out of pooled connections.
    const fn is_exhausted(&self) -> bool {
        match self {
            Self::Provision(ProvisionError::Store(err)) | Self::Store(err) => err.is_exhausted(),
            Self::Provision(_) => false,
        }
    }
}

impl Retryable for GroupError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Provision(err) => err.is_retryable(),
            Self::Store(err) => err.is_retryable(),
        }
    }
}

impl fmt::Display for GroupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provision(err) => fmt::Display::fmt(err, f),
            Self::Store(err) => fmt::Display::fmt(err, f),
        }
    }
}

impl From<ProvisionError> for GroupError {
    fn from(err: ProvisionError) -> Self {
        Self::Provision(err)
    }
}

/// Result of writing one metric group.
#[derive(Debug, Default)]
struct GroupWrite {
    /// Samples committed.
    inserted: u64,
    /// Samples of series that could not be resolved.
    skipped_samples: u64,
    /// First error among the skipped series.
    skipped_error: Option<ProvisionError>,
}

/// Series group for one metric.
type MetricGroup = Vec<(SeriesKey, Vec<RawSample>)>;

/// Reason the remaining groups were abandoned.
enum Abort {
    /// Request stopped.
    Interrupted(Interrupted),
    /// Connections exhausted.
    Exhausted(String),
}

// ============================================================================
// SECTION: Ingestor
// ============================================================================

/// Batch ingestor.
pub struct Ingestor<S> {
    /// Backing store.
    store: Arc<S>,
    /// Shared provisioner.
    provisioner: Arc<Provisioner<S>>,
    /// Metrics sink.
    metrics: Arc<dyn AdapterMetrics>,
    /// Ingestor configuration.
    config: IngestConfig,
}

impl<S> Ingestor<S>
where
    S: CatalogStore + SampleStore + LeaseStore,
{
    /// Creates an ingestor.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        provisioner: Arc<Provisioner<S>>,
        metrics: Arc<dyn AdapterMetrics>,
        config: IngestConfig,
    ) -> Self {
        Self {
            store,
            provisioner,
            metrics,
            config,
        }
    }

    /// Ingests a write request.
    ///
    /// # Errors
    ///
    /// Returns [`IngestFailure`] when any metric group failed, metadata could
    /// not be stored, or the request was aborted. The report inside is exact.
    pub fn ingest(
        &self,
        ctx: &RequestContext,
        request: WriteRequest,
    ) -> Result<IngestReport, IngestFailure> {
        let started = Instant::now();
        let ctx = ctx.or_timeout(self.config.default_timeout);
        let mut report = IngestReport {
            samples_received: request.sample_count(),
            metadata_received: u64::try_from(request.metadata.len()).unwrap_or(u64::MAX),
            ..IngestReport::default()
        };
        self.metrics.record_count(CounterKind::ReceivedSamples, report.samples_received);
        self.metrics.record_count(CounterKind::ReceivedMetadata, report.metadata_received);

        let WriteRequest {
            timeseries,
            metadata,
        } = request;
        let series_count = timeseries.len();
        let (groups, invalid_series) = partition(timeseries, &mut report);
        if series_count > 0 && invalid_series == series_count {
            self.metrics.record_count(CounterKind::InvalidWriteRequests, 1);
        }

        let mut abort = None;
        let mut remaining = groups.into_iter();
        for (metric, group) in remaining.by_ref() {
            let group_samples = count_samples(&group);
            if let Err(reason) = ctx.check() {
                report.samples_failed += group_samples;
                abort = Some(Abort::Interrupted(reason));
                break;
            }
            let outcome = self.config.retry.run(&ctx, "insert_samples", || {
                self.write_group(&ctx, &metric, &group)
            });
            match outcome {
                Ok(written) => {
                    report.samples_inserted += written.inserted;
                    report.samples_failed += group_samples.saturating_sub(written.inserted);
                    if let Some(error) = written.skipped_error {
                        let error = GroupError::Provision(error);
                        let failure = metric_failure(&metric, written.skipped_samples, &error);
                        tracing::warn!(
                            metric = %metric,
                            kind = failure.kind.as_str(),
                            samples = written.skipped_samples,
                            error = %error,
                            "series left unresolved; committed the rest of the group"
                        );
                        report.metric_failures.push(failure);
                    }
                }
                Err(RetryError::Interrupted(reason)) => {
                    report.samples_failed += group_samples;
                    abort = Some(Abort::Interrupted(reason));
                    break;
                }
                Err(RetryError::Failed {
                    error, ..
                }) if error.is_exhausted() => {
                    report.samples_failed += group_samples;
                    abort = Some(Abort::Exhausted(error.to_string()));
                    break;
                }
                Err(RetryError::Failed {
                    error,
                    attempts,
                }) => {
                    report.samples_failed += group_samples;
                    let failure = metric_failure(&metric, group_samples, &error);
                    tracing::warn!(
                        metric = %metric,
                        kind = failure.kind.as_str(),
                        attempts,
                        error = %error,
                        "metric group write failed"
                    );
                    report.metric_failures.push(failure);
                }
            }
        }
        for (_, group) in remaining {
            report.samples_failed += count_samples(&group);
        }

        let metadata_error = if abort.is_some() {
            report.metadata_failed = report.metadata_received;
            None
        } else {
            self.write_metadata(&ctx, &metadata, &mut report)
        };

        if self.provisioner.has_pending()
            && let Err(err) = self.provisioner.complete_provisioning(&ctx)
        {
            tracing::warn!(error = %err, "metric creation finalization deferred");
        }

        self.metrics.record_count(CounterKind::IngestedSamples, report.samples_inserted);
        self.metrics.record_count(CounterKind::FailedSamples, report.samples_failed);
        self.metrics.record_count(CounterKind::SentMetadata, report.metadata_inserted);
        self.metrics.record_count(CounterKind::FailedMetadata, report.metadata_failed);
        self.metrics.observe_duration(DurationKind::SentBatch, started.elapsed());

        let error = match abort {
            Some(Abort::Interrupted(reason)) => Some(IngestError::Interrupted(reason)),
            Some(Abort::Exhausted(message)) => Some(IngestError::ResourceExhausted(message)),
            None if !report.metric_failures.is_empty() => Some(IngestError::MetricGroups {
                failed: report.metric_failures.len(),
            }),
            None => metadata_error,
        };
        match error {
            Some(error) => Err(IngestFailure {
                report,
                error,
            }),
            None => Ok(report),
        }
    }

    /// Finalizes metric creation for every tentative catalog entry.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] when finalization cannot run.
    pub fn complete_metric_creation(
        &self,
        ctx: &RequestContext,
    ) -> Result<Vec<MetricName>, ProvisionError> {
        self.provisioner.complete_provisioning(ctx)
    }

    /// Resolves and commits one metric group.
    ///
    /// A series that cannot be resolved for a reason local to it (a new
    /// label set on a standby, a lost lease) is left out; the remaining
    /// series still commit in one transaction. Transient store failures
    /// fail the group so the retry loop runs it again.
    fn write_group(
        &self,
        ctx: &RequestContext,
        metric: &MetricName,
        group: &MetricGroup,
    ) -> Result<GroupWrite, GroupError> {
        let entry = self.provisioner.resolve_metric(ctx, metric)?;
        let mut written = GroupWrite::default();
        let mut rows = Vec::with_capacity(group.iter().map(|(_, samples)| samples.len()).sum());
        for (key, samples) in group {
            let series_id = match self.provisioner.resolve_series(&entry, key) {
                Ok(series_id) => series_id,
                Err(err) if series_local(&err) => {
                    written.skipped_samples += samples.len() as u64;
                    if written.skipped_error.is_none() {
                        written.skipped_error = Some(err);
                    }
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            rows.extend(samples.iter().map(|sample| Sample {
                series_id,
                timestamp_ms: sample.timestamp_ms,
                value: sample.value,
            }));
        }
        if !rows.is_empty() {
            written.inserted = self.store.insert_samples(&entry, &rows).map_err(GroupError::Store)?;
        }
        Ok(written)
    }

    /// Upserts metadata with retries, updating the report.
    fn write_metadata(
        &self,
        ctx: &RequestContext,
        metadata: &[MetadataEntry],
        report: &mut IngestReport,
    ) -> Option<IngestError> {
        if metadata.is_empty() {
            return None;
        }
        match self.config.retry.run(ctx, "upsert_metadata", || self.store.upsert_metadata(metadata)) {
            Ok(written) => {
                report.metadata_inserted = written.min(report.metadata_received);
                report.metadata_failed = report.metadata_received - report.metadata_inserted;
                None
            }
            Err(RetryError::Interrupted(reason)) => {
                report.metadata_failed = report.metadata_received;
                Some(IngestError::Interrupted(reason))
            }
            Err(RetryError::Failed {
                error, ..
            }) => {
                report.metadata_failed = report.metadata_received;
                tracing::warn!(error = %error, "metadata upsert failed");
                Some(IngestError::Metadata(error.to_string()))
            }
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Validates series and samples and groups survivors by metric.
///
/// Returns the groups and the number of series rejected outright.
fn partition(
    timeseries: Vec<TimeSeries>,
    report: &mut IngestReport,
) -> (BTreeMap<MetricName, MetricGroup>, usize) {
    let mut groups: BTreeMap<MetricName, MetricGroup> = BTreeMap::new();
    let mut invalid_series = 0;
    for series in timeseries {
        let (metric, key) = match SeriesKey::from_labels(&series.labels) {
            Ok(parts) => parts,
            Err(err) => {
                invalid_series += 1;
                report.samples_failed += series.samples.len() as u64;
                tracing::debug!(error = %err, "dropped invalid series");
                continue;
            }
        };
        let mut valid = Vec::with_capacity(series.samples.len());
        for sample in series.samples {
            if validate_timestamp(sample.timestamp_ms).is_ok() {
                valid.push(sample);
            } else {
                report.samples_failed += 1;
            }
        }
        if valid.is_empty() {
            continue;
        }
        groups.entry(metric).or_default().push((key, valid));
    }
    (groups, invalid_series)
}

/// Returns true when a series resolution failure affects only that series.
const fn series_local(err: &ProvisionError) -> bool {
    matches!(
        err,
        ProvisionError::NotLeader(_) | ProvisionError::LeaseLost(_) | ProvisionError::Authorization(_)
    )
}

/// Counts samples in a metric group.
fn count_samples(group: &MetricGroup) -> u64 {
    group.iter().map(|(_, samples)| samples.len() as u64).sum()
}

/// Builds the failure record for a group error.
fn metric_failure(metric: &MetricName, samples: u64, error: &GroupError) -> MetricFailure {
    let (kind, retryable) = match error {
        GroupError::Provision(ProvisionError::Authorization(err)) => {
            (FailureKind::Authorization, err.is_retryable())
        }
        GroupError::Provision(ProvisionError::LeaseLost(_)) => (FailureKind::LeaseLost, true),
        GroupError::Provision(ProvisionError::Store(err)) | GroupError::Store(err) => {
            (FailureKind::Storage, err.is_retryable())
        }
        GroupError::Provision(ProvisionError::Interrupted(_)) => (FailureKind::Interrupted, true),
        GroupError::Provision(err) => (FailureKind::Provisioning, err.caller_may_retry()),
    };
    MetricFailure {
        metric: metric.clone(),
        kind,
        retryable,
        samples,
        message: error.to_string(),
    }
}
