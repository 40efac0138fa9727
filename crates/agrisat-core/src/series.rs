//! NDVI time series.
//!
//! An [`NdviSeries`] is built from raw per-image [`NdviSample`]s. Construction
//! drops samples whose region reduction produced no value (no zero-filling),
//! discards values outside the NDVI range, sorts by acquisition time, and
//! merges samples that share a timestamp (overlapping granules of the same
//! pass) by averaging them.

use std::sync::Arc;

use arrow::array::{Float64Array, TimestampMillisecondArray};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CoreError, Result};
use crate::schema::ndvi_series_schema;

/// Minimum series length accepted by the yield model.
pub const MIN_USABLE_SAMPLES: usize = 10;

/// One region reduction over one source image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NdviSample {
    pub timestamp: DateTime<Utc>,
    /// `None` when the reduction yielded no valid pixels.
    pub value: Option<f64>,
}

impl NdviSample {
    pub fn new(timestamp: DateTime<Utc>, value: Option<f64>) -> Self {
        Self { timestamp, value }
    }
}

/// Time-ordered NDVI values with unique timestamps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NdviSeries {
    timestamps: Vec<DateTime<Utc>>,
    values: Vec<f64>,
}

impl NdviSeries {
    pub fn from_samples<I>(samples: I) -> Self
    where
        I: IntoIterator<Item = NdviSample>,
    {
        let mut present: Vec<(DateTime<Utc>, f64)> = Vec::new();
        for sample in samples {
            let Some(value) = sample.value else {
                continue;
            };
            if !value.is_finite() || !(-1.0..=1.0).contains(&value) {
                warn!(timestamp = %sample.timestamp, value, "dropping out-of-range NDVI sample");
                continue;
            }
            present.push((sample.timestamp, value));
        }

        // Stable sort keeps source order among equal timestamps.
        present.sort_by_key(|(ts, _)| *ts);

        let mut timestamps = Vec::with_capacity(present.len());
        let mut values = Vec::with_capacity(present.len());
        let mut i = 0;
        while i < present.len() {
            let ts = present[i].0;
            let mut sum = 0.0;
            let mut n = 0usize;
            while i < present.len() && present[i].0 == ts {
                sum += present[i].1;
                n += 1;
                i += 1;
            }
            timestamps.push(ts);
            values.push(sum / n as f64);
        }

        Self { timestamps, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    /// Iterate `(timestamp, value)` pairs in time order.
    pub fn iter(&self) -> impl Iterator<Item = (DateTime<Utc>, f64)> + '_ {
        self.timestamps.iter().copied().zip(self.values.iter().copied())
    }

    /// Fail with [`CoreError::InsufficientData`] if the series is shorter than `min_len`.
    pub fn ensure_usable(&self, min_len: usize) -> Result<()> {
        if self.len() < min_len {
            return Err(CoreError::InsufficientData {
                found: self.len(),
                required: min_len,
            });
        }
        Ok(())
    }

    pub fn mean(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        Some(self.values.iter().sum::<f64>() / self.len() as f64)
    }

    /// Sample with the highest NDVI (first one on ties).
    pub fn peak(&self) -> Option<(DateTime<Utc>, f64)> {
        self.iter()
            .fold(None, |best: Option<(DateTime<Utc>, f64)>, (ts, v)| match best {
                Some((_, bv)) if bv >= v => best,
                _ => Some((ts, v)),
            })
    }

    /// Arrow batch with `timestamp` and `ndvi` columns.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let ts: Vec<i64> = self.timestamps.iter().map(|t| t.timestamp_millis()).collect();
        let batch = RecordBatch::try_new(
            Arc::new(ndvi_series_schema()),
            vec![
                Arc::new(TimestampMillisecondArray::from(ts).with_timezone("UTC")),
                Arc::new(Float64Array::from(self.values.clone())),
            ],
        )?;
        Ok(batch)
    }
}
