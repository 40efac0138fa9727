//! Arrow schemas for tabular exchange with the presentation layer.

use arrow::datatypes::{DataType, Field, Schema, TimeUnit};

/// Schema of an exported NDVI series.
pub fn ndvi_series_schema() -> Schema {
    Schema::new(vec![
        Field::new(
            "timestamp",
            DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into())),
            false,
        ),
        Field::new("ndvi", DataType::Float64, false),
    ])
}

/// Schema used to read uploaded NDVI CSV files.
///
/// Dates are read as text so that both `YYYY-MM-DD` and RFC 3339 values are accepted.
pub fn ndvi_csv_schema() -> Schema {
    Schema::new(vec![
        Field::new("date", DataType::Utf8, true),
        Field::new("ndvi", DataType::Float64, true),
    ])
}
