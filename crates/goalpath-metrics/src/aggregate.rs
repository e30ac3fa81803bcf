//! Aggregate functions over metric values.
//!
//! Snapshots of aggregating metrics carry helper values so a new measurement
//! can be folded into the previous aggregate without reading history back.
//! Meta metrics compute their aggregate over a complete list of values instead.

use goalpath_core::{AggregateFunction, AggregateHelpers, MetricsError, RecordValue, Result};

/// Helpers of the first snapshot of an aggregate.
///
/// The measurement count always starts at one. Running values are only
/// initialised from raw measurements, never from precomputed aggregates.
pub fn initial_helpers(operation: AggregateFunction, value: RecordValue, value_is_aggregate: bool) -> AggregateHelpers {
    let mut helpers = AggregateHelpers {
        number_of_measurements: Some(1),
        ..Default::default()
    };
    if value_is_aggregate {
        return helpers;
    }
    match operation {
        AggregateFunction::Min => helpers.last_min = Some(value),
        AggregateFunction::Max => helpers.last_max = Some(value),
        AggregateFunction::Sum | AggregateFunction::Average => helpers.sum_of_measurements = Some(value),
        AggregateFunction::Variance => {
            helpers.sum_of_measurements = Some(value);
            helpers.welford_mean = Some(value);
            helpers.welford_m2 = Some(0.0);
        }
        AggregateFunction::Median => {}
    }
    helpers
}

/// Fold `value` into the helpers of the previous snapshot.
///
/// Only helpers present on the previous snapshot are carried forward.
pub fn updated_helpers(last: &AggregateHelpers, value: RecordValue) -> AggregateHelpers {
    let mut helpers = AggregateHelpers {
        number_of_measurements: last.number_of_measurements.map(|n| n + 1),
        sum_of_measurements: last.sum_of_measurements.map(|sum| sum + value),
        last_min: last.last_min.map(|min| min.min(value)),
        last_max: last.last_max.map(|max| max.max(value)),
        ..Default::default()
    };
    if let (Some(mean), Some(m2), Some(count)) = (last.welford_mean, last.welford_m2, last.number_of_measurements) {
        let (mean, m2) = welford_step(mean, m2, count, value);
        helpers.welford_mean = Some(mean);
        helpers.welford_m2 = Some(m2);
    }
    helpers
}

/// One step of Welford's online variance algorithm.
fn welford_step(mean: f64, m2: f64, count: u64, value: f64) -> (f64, f64) {
    let count = (count + 1) as f64;
    let delta = value - mean;
    let mean = mean + delta / count;
    let delta2 = value - mean;
    (mean, m2 + delta * delta2)
}

/// Aggregate value derived from incrementally maintained helpers.
///
/// # Errors
///
/// [`MetricsError::UnsupportedAggregate`] for the median, and
/// [`MetricsError::Internal`] if a required helper is missing.
pub fn incremental(operation: AggregateFunction, helpers: &AggregateHelpers) -> Result<RecordValue> {
    let missing = || MetricsError::internal(format!("missing aggregate helpers for {} function", operation));
    match operation {
        AggregateFunction::Average => {
            let count = helpers.number_of_measurements.ok_or_else(missing)?;
            let sum = helpers.sum_of_measurements.ok_or_else(missing)?;
            Ok(sum / count as f64)
        }
        AggregateFunction::Sum => helpers.sum_of_measurements.ok_or_else(missing),
        AggregateFunction::Min => helpers.last_min.ok_or_else(missing),
        AggregateFunction::Max => helpers.last_max.ok_or_else(missing),
        AggregateFunction::Variance => {
            let count = helpers.number_of_measurements.ok_or_else(missing)?;
            let m2 = helpers.welford_m2.ok_or_else(missing)?;
            helpers.welford_mean.ok_or_else(missing)?;
            Ok(m2 / count as f64)
        }
        AggregateFunction::Median => Err(MetricsError::UnsupportedAggregate(operation.to_string())),
    }
}

/// Aggregate over a complete list of values. An empty list yields NaN.
pub fn complete(operation: AggregateFunction, values: &[RecordValue]) -> RecordValue {
    if values.is_empty() {
        return f64::NAN;
    }
    match operation {
        AggregateFunction::Average => mean(values),
        AggregateFunction::Sum => values.iter().sum(),
        AggregateFunction::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        AggregateFunction::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        AggregateFunction::Median => median(values),
        AggregateFunction::Variance => {
            let mean = mean(values);
            values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / values.len() as f64
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let middle = (sorted.len() - 1) / 2;
    if sorted.len() % 2 == 1 {
        sorted[middle]
    } else {
        (sorted[middle] + sorted[middle + 1]) / 2.0
    }
}
