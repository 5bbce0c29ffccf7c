// crates/promstore-core/src/core/samples.rs
// ============================================================================
// Module: Promstore Samples
// Description: Write requests, samples, metadata, and read results.
// Purpose: Model the push-protocol payload and what stores return on read.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`WriteRequest`] carries raw time series (labels plus samples) and
//! metric metadata. After partitioning and series resolution, samples become
//! [`Sample`] rows keyed by series id. Values are plain `f64`; NaN and
//! infinities are legal and must survive storage bit for bit.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::MetricName;
use crate::core::identifiers::SeriesId;
use crate::core::labels::Label;
use crate::core::labels::SeriesKey;
use crate::core::validation::ValidationError;

// ============================================================================
// SECTION: Write Payload
// ============================================================================

/// Raw sample as received on the write path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Sample timestamp (unix ms).
    pub timestamp_ms: i64,
    /// Sample value.
    pub value: f64,
}

impl RawSample {
    /// Creates a raw sample.
    #[must_use]
    pub const fn new(timestamp_ms: i64, value: f64) -> Self {
        Self {
            timestamp_ms,
            value,
        }
    }
}

/// One labelled series with its samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Raw labels, including `__name__`.
    pub labels: Vec<Label>,
    /// Samples for this series.
    pub samples: Vec<RawSample>,
}

/// Metric type carried by metadata entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    /// Type not reported.
    #[default]
    Unknown,
    /// Monotonic counter.
    Counter,
    /// Gauge.
    Gauge,
    /// Histogram.
    Histogram,
    /// Gauge histogram.
    GaugeHistogram,
    /// Summary.
    Summary,
    /// Info metric.
    Info,
    /// State set.
    StateSet,
}

impl MetricType {
    /// Returns the stable storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Histogram => "histogram",
            Self::GaugeHistogram => "gauge_histogram",
            Self::Summary => "summary",
            Self::Info => "info",
            Self::StateSet => "state_set",
        }
    }

    /// Parses a storage label; unknown labels map to [`MetricType::Unknown`].
    #[must_use]
    pub fn parse(label: &str) -> Self {
        match label {
            "counter" => Self::Counter,
            "gauge" => Self::Gauge,
            "histogram" => Self::Histogram,
            "gauge_histogram" => Self::GaugeHistogram,
            "summary" => Self::Summary,
            "info" => Self::Info,
            "state_set" => Self::StateSet,
            _ => Self::Unknown,
        }
    }
}

/// Metric metadata entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    /// Metric family name.
    pub metric_name: MetricName,
    /// Metric type.
    pub metric_type: MetricType,
    /// Unit string (may be empty).
    pub unit: String,
    /// Help text (may be empty).
    pub help: String,
}

/// Push-protocol write request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteRequest {
    /// Series with samples.
    pub timeseries: Vec<TimeSeries>,
    /// Metadata entries.
    pub metadata: Vec<MetadataEntry>,
}

impl WriteRequest {
    /// Returns the total number of raw samples in the request.
    #[must_use]
    pub fn sample_count(&self) -> u64 {
        self.timeseries.iter().map(|series| series.samples.len() as u64).sum()
    }
}

// ============================================================================
// SECTION: Stored Samples
// ============================================================================

/// Sample bound to a resolved series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Owning series.
    pub series_id: SeriesId,
    /// Sample timestamp (unix ms).
    pub timestamp_ms: i64,
    /// Sample value.
    pub value: f64,
}

/// Inclusive time range used on the read path.
///
/// # Invariants
/// - `start_ms <= end_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Range start (unix ms, inclusive).
    start_ms: i64,
    /// Range end (unix ms, inclusive).
    end_ms: i64,
}

impl TimeRange {
    /// Creates an inclusive range.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTimeRange`] when `start_ms > end_ms`.
    pub const fn new(start_ms: i64, end_ms: i64) -> Result<Self, ValidationError> {
        if start_ms > end_ms {
            return Err(ValidationError::InvalidTimeRange {
                start: start_ms,
                end: end_ms,
            });
        }
        Ok(Self {
            start_ms,
            end_ms,
        })
    }

    /// Returns a range covering every representable timestamp.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            start_ms: i64::MIN,
            end_ms: i64::MAX,
        }
    }

    /// Returns the range start.
    #[must_use]
    pub const fn start_ms(self) -> i64 {
        self.start_ms
    }

    /// Returns the range end.
    #[must_use]
    pub const fn end_ms(self) -> i64 {
        self.end_ms
    }

    /// Returns true when the timestamp falls inside the range.
    #[must_use]
    pub const fn contains(self, timestamp_ms: i64) -> bool {
        timestamp_ms >= self.start_ms && timestamp_ms <= self.end_ms
    }
}

/// Timestamp/value pair returned on read.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StoredSample {
    /// Sample timestamp (unix ms).
    pub timestamp_ms: i64,
    /// Sample value.
    pub value: f64,
}

/// Samples for one series returned on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSamples {
    /// Series identifier.
    pub series_id: SeriesId,
    /// Canonical labels for the series.
    pub key: SeriesKey,
    /// Samples ordered by timestamp.
    pub samples: Vec<StoredSample>,
}
