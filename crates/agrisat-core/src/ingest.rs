//! Byte-buffer ingestion of user uploads: NDVI CSV files and GeoTIFF rasters.

use std::io::Cursor;
use std::sync::Arc;

use arrow::array::{Array, Float64Array, StringArray};
use arrow::compute::cast;
use arrow::csv::ReaderBuilder;
use arrow::csv::reader::Format;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tiff::decoder::{Decoder, DecodingResult};
use tracing::{debug, info};

use crate::error::{CoreError, Result};
use crate::raster::RasterGrid;
use crate::schema::ndvi_csv_schema;
use crate::series::{NdviSample, NdviSeries};

/// Rows sampled for CSV schema inference.
const CSV_INFER_ROWS: usize = 1000;

impl NdviSeries {
    /// Read a series from a CSV upload with `date` and `ndvi` columns.
    pub fn from_csv_bytes(bytes: &[u8]) -> Result<Self> {
        read_ndvi_csv(bytes)
    }
}

impl RasterGrid {
    /// Decode the first band of a GeoTIFF held in memory.
    pub fn from_geotiff_bytes(bytes: &[u8]) -> Result<Self> {
        read_geotiff_bytes(bytes)
    }
}

/// Parse an NDVI CSV. Blank `ndvi` cells are absent samples and are dropped.
pub fn read_ndvi_csv(bytes: &[u8]) -> Result<NdviSeries> {
    let batches = read_csv_batches(bytes, &ndvi_csv_schema())?;
    let mut samples = Vec::new();
    for batch in &batches {
        let dates = column_as::<StringArray>(batch, "date", &DataType::Utf8)?;
        let values = column_as::<Float64Array>(batch, "ndvi", &DataType::Float64)?;
        for row in 0..batch.num_rows() {
            if dates.is_null(row) {
                return Err(CoreError::Other(format!("missing date in CSV row {}", row + 1)));
            }
            let timestamp = parse_timestamp(dates.value(row))?;
            let value = (!values.is_null(row)).then(|| values.value(row));
            samples.push(NdviSample::new(timestamp, value));
        }
    }
    let series = NdviSeries::from_samples(samples);
    info!(rows = series.len(), "read NDVI series from CSV");
    Ok(series)
}

/// Read one numeric column as a raw sequence, skipping blank cells.
pub fn read_value_column(bytes: &[u8], column: &str) -> Result<Vec<f64>> {
    let wanted = Schema::new(vec![Field::new(column, DataType::Float64, true)]);
    let batches = read_csv_batches(bytes, &wanted)?;
    let mut out = Vec::new();
    for batch in &batches {
        let values = column_as::<Float64Array>(batch, column, &DataType::Float64)?;
        out.extend(values.iter().flatten());
    }
    Ok(out)
}

/// Read a CSV whose header is inferred but whose column types are pinned:
/// columns named in `wanted` (case-insensitively) take its types, every
/// other column is read as text. Inference only sees the first rows, so an
/// all-integer prefix must not decide the type of a fractional column.
fn read_csv_batches(bytes: &[u8], wanted: &Schema) -> Result<Vec<RecordBatch>> {
    let format = Format::default().with_header(true);
    let (inferred, _) = format.infer_schema(Cursor::new(bytes), Some(CSV_INFER_ROWS))?;
    let fields: Vec<Field> = inferred
        .fields()
        .iter()
        .map(|f| {
            let data_type = wanted
                .fields()
                .iter()
                .find(|w| w.name().eq_ignore_ascii_case(f.name().trim()))
                .map(|w| w.data_type().clone())
                .unwrap_or(DataType::Utf8);
            Field::new(f.name(), data_type, true)
        })
        .collect();
    debug!(fields = fields.len(), "resolved CSV schema");
    let reader = ReaderBuilder::new(Arc::new(Schema::new(fields)))
        .with_format(format)
        .build(Cursor::new(bytes))?;
    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(batches)
}

/// Look up a column case-insensitively and cast it to `target`.
fn column_as<A: Array + Clone + 'static>(
    batch: &RecordBatch,
    name: &str,
    target: &DataType,
) -> Result<A> {
    let schema = batch.schema();
    let idx = schema
        .fields()
        .iter()
        .position(|f| f.name().trim().eq_ignore_ascii_case(name))
        .ok_or_else(|| CoreError::Other(format!("CSV has no '{name}' column")))?;
    let casted = cast(batch.column(idx), target)?;
    casted
        .as_any()
        .downcast_ref::<A>()
        .cloned()
        .ok_or_else(|| CoreError::Other(format!("column '{name}' is not {target}")))
}

/// Accept RFC 3339, naive date-times (as UTC), or plain dates (midnight UTC).
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(naive.and_utc());
        }
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| CoreError::Other(format!("bad timestamp {s:?}: {e}")))?;
    Ok(date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc())
}

/// Decode a GeoTIFF into a raster, keeping only the first sample of each pixel.
pub fn read_geotiff_bytes(bytes: &[u8]) -> Result<RasterGrid> {
    let mut decoder = Decoder::new(Cursor::new(bytes))?;
    let (width, height) = decoder.dimensions()?;
    let rows = height as usize;
    let cols = width as usize;

    let values: Vec<f32> = match decoder.read_image()? {
        DecodingResult::F32(buf) => buf,
        DecodingResult::F64(buf) => buf.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U8(buf) => buf.into_iter().map(f32::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f32::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U64(buf) => buf.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I8(buf) => buf.into_iter().map(f32::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f32::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I64(buf) => buf.into_iter().map(|v| v as f32).collect(),
        #[allow(unreachable_patterns)]
        _ => return Err(CoreError::Other("unsupported TIFF sample format".into())),
    };

    let pixels = rows * cols;
    if pixels == 0 || values.len() % pixels != 0 {
        return Err(CoreError::Other(format!(
            "{} samples do not match a {rows}x{cols} image",
            values.len()
        )));
    }
    let samples_per_pixel = values.len() / pixels;
    let band: Vec<f32> = values.into_iter().step_by(samples_per_pixel).collect();

    info!(rows, cols, samples_per_pixel, "decoded GeoTIFF");
    RasterGrid::from_vec(band, rows, cols)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiff::encoder::{TiffEncoder, colortype};

    #[test]
    fn csv_drops_blank_values() {
        let csv = b"date,ndvi\n2023-01-01,0.2\n2023-01-11,\n2023-01-21,0.4\n";
        let series = read_ndvi_csv(csv).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.values(), &[0.2, 0.4]);
    }

    #[test]
    fn csv_columns_any_order_and_case() {
        let csv = b"NDVI,field,Date\n0.3,a,2023-02-01\n0.1,a,2023-01-01\n";
        let series = read_ndvi_csv(csv).unwrap();
        assert_eq!(series.values(), &[0.1, 0.3]);
    }

    #[test]
    fn csv_accepts_rfc3339() {
        let csv = b"date,ndvi\n2023-01-01T10:15:00Z,0.5\n";
        let series = read_ndvi_csv(csv).unwrap();
        assert_eq!(series.timestamps()[0].to_rfc3339(), "2023-01-01T10:15:00+00:00");
    }

    #[test]
    fn csv_without_ndvi_column_fails() {
        let csv = b"date,evi\n2023-01-01,0.5\n";
        assert!(read_ndvi_csv(csv).is_err());
    }

    /// Integer-looking values across the whole inference window, then a
    /// fractional one.
    fn integer_prefix_csv(header: &str) -> Vec<u8> {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let mut csv = format!("{header}\n");
        for day in 0..CSV_INFER_ROWS as u64 {
            let date = start + chrono::Days::new(day);
            csv.push_str(&format!("{date},0\n"));
        }
        csv.push_str("2023-01-01,0.5\n");
        csv.into_bytes()
    }

    #[test]
    fn csv_fractional_value_after_integer_rows() {
        let series = read_ndvi_csv(&integer_prefix_csv("date,ndvi")).unwrap();
        assert_eq!(series.len(), CSV_INFER_ROWS + 1);
        assert_eq!(series.values().last(), Some(&0.5));
    }

    #[test]
    fn value_column_fractional_after_integer_rows() {
        let bytes = integer_prefix_csv("day,yield_ndvi");
        let values = read_value_column(&bytes, "yield_ndvi").unwrap();
        assert_eq!(values.len(), CSV_INFER_ROWS + 1);
        assert_eq!(values.last(), Some(&0.5));
        assert!(values[..CSV_INFER_ROWS].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn csv_extra_columns_are_read_as_text() {
        let csv = b"date,ndvi,plot\n2023-01-01,0.2,7\n2023-01-11,0.3,north\n";
        let series = read_ndvi_csv(csv).unwrap();
        assert_eq!(series.len(), 2);
    }

    #[test]
    fn value_column_skips_blanks() {
        let csv = b"ndvi\n0.1\n\n0.3\n0.2\n";
        assert_eq!(read_value_column(csv, "ndvi").unwrap(), vec![0.1, 0.3, 0.2]);
    }

    #[test]
    fn geotiff_roundtrip_shape() {
        let data: Vec<f32> = (0..12).map(|i| i as f32 / 12.0).collect();
        let mut buf = Cursor::new(Vec::new());
        TiffEncoder::new(&mut buf)
            .unwrap()
            .write_image::<colortype::Gray32Float>(4, 3, &data)
            .unwrap();

        let grid = RasterGrid::from_geotiff_bytes(buf.get_ref()).unwrap();
        assert_eq!(grid.shape(), (3, 4));
        assert_eq!(grid.get(2, 3), Some(11.0 / 12.0));
    }

    #[test]
    fn geotiff_keeps_first_band() {
        let rgb: Vec<u8> = vec![10, 20, 30, 40, 50, 60];
        let mut buf = Cursor::new(Vec::new());
        TiffEncoder::new(&mut buf)
            .unwrap()
            .write_image::<colortype::RGB8>(2, 1, &rgb)
            .unwrap();

        let grid = RasterGrid::from_geotiff_bytes(buf.get_ref()).unwrap();
        assert_eq!(grid.shape(), (1, 2));
        assert_eq!(grid.get(0, 0), Some(10.0));
        assert_eq!(grid.get(0, 1), Some(40.0));
    }

    #[test]
    fn garbage_bytes_fail() {
        assert!(RasterGrid::from_geotiff_bytes(b"not a tiff").is_err());
    }
}
