//! Terminal rendering for series, yield estimates, masks and map layers.

use std::fmt::Write;

use agrisat_ai::{MaskOutcome, YieldEstimate};
use agrisat_core::{NdviSeries, PredictionMask};
use agrisat_remote::LayerList;
use arrow::util::pretty::pretty_format_batches;

/// Widest mask preview, in characters.
const PREVIEW_COLS: usize = 64;

// ── Series ──

pub fn format_series(series: &NdviSeries) -> anyhow::Result<String> {
    let mut out = String::new();
    let batch = series.to_record_batch()?;
    writeln!(out, "{}", pretty_format_batches(&[batch])?)?;
    writeln!(out, "  {:<12} {}", "samples", series.len())?;
    if let Some(mean) = series.mean() {
        writeln!(out, "  {:<12} {:.3}", "mean NDVI", mean)?;
    }
    if let Some((ts, peak)) = series.peak() {
        writeln!(out, "  {:<12} {:.3} on {}", "peak NDVI", peak, ts.format("%Y-%m-%d"))?;
    }
    Ok(out)
}

pub fn print_series(series: &NdviSeries) -> anyhow::Result<()> {
    print!("{}", format_series(series)?);
    Ok(())
}

// ── Yield ──

pub fn format_yield_card(estimate: &YieldEstimate, elapsed_secs: Option<f64>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Yield estimate ===");
    let _ = writeln!(out, "  {:<14} {:.3}", "predicted", estimate.value);
    let _ = writeln!(out, "  {:<14} {}", "samples", estimate.samples);
    let _ = writeln!(out, "  {:<14} {}", "normalization", estimate.normalization.as_str());
    if let Some(secs) = elapsed_secs {
        let _ = writeln!(out, "  {:<14} {:.2}s", "elapsed", secs);
    }
    out
}

// ── Mask ──

pub fn format_mask_summary(outcome: &MaskOutcome) -> String {
    let (rows, cols) = outcome.mask.shape();
    let mut out = String::new();
    let _ = writeln!(out, "=== Field mask ===");
    let _ = writeln!(out, "  {:<10} {rows}x{cols}", "size");
    let _ = writeln!(out, "  {:<10} {}", "tiles", outcome.tiles_processed);
    let _ = writeln!(
        out,
        "  {:<10} {} px ({:.1}%)",
        "field",
        outcome.mask.count_true(),
        outcome.mask.coverage() * 100.0
    );
    let _ = writeln!(out, "  {:<10} {:.2}s", "elapsed", outcome.elapsed_secs);
    out.push('\n');
    out.push_str(&mask_preview(&outcome.mask, PREVIEW_COLS));
    out
}

/// Downsampled text preview: `#` where most of a cell's pixels are field.
fn mask_preview(mask: &PredictionMask, max_cols: usize) -> String {
    let (rows, cols) = mask.shape();
    if rows == 0 || cols == 0 {
        return String::new();
    }
    let step = cols.div_ceil(max_cols).max(1);
    // Terminal cells are about twice as tall as wide.
    let row_step = step * 2;

    let view = mask.view();
    let mut out = String::new();
    for r0 in (0..rows).step_by(row_step) {
        for c0 in (0..cols).step_by(step) {
            let r1 = (r0 + row_step).min(rows);
            let c1 = (c0 + step).min(cols);
            let cell = view.slice(ndarray::s![r0..r1, c0..c1]);
            let positive = cell.iter().filter(|&&v| v).count();
            out.push(if positive * 2 > cell.len() { '#' } else { '.' });
        }
        out.push('\n');
    }
    out
}

// ── Layers ──

pub fn format_layers(map: &LayerList) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "  {:<10} {:?}", "basemap", map.basemap);
    if let Some((lat, lon, zoom)) = map.center {
        let _ = writeln!(out, "  {:<10} {lat:.4}, {lon:.4} (zoom {zoom})", "center");
    }
    for layer in &map.layers {
        let _ = writeln!(out, "  {}", layer.name);
        let _ = writeln!(out, "    tiles    {}", layer.url_template);
        let _ = writeln!(
            out,
            "    range    {} .. {}  palette: {}",
            layer.vis.min,
            layer.vis.max,
            layer.vis.palette.join(", ")
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use agrisat_core::{NdviSample, Normalization, Tile, VisParams};
    use agrisat_remote::{MapCanvas, TileLayer};
    use chrono::{TimeZone, Utc};

    #[test]
    fn series_table_has_summary() {
        let samples = [0.2, 0.7, 0.4].iter().enumerate().map(|(i, v)| {
            NdviSample::new(Utc.with_ymd_and_hms(2023, 5, 1 + i as u32, 0, 0, 0).unwrap(), Some(*v))
        });
        let text = format_series(&NdviSeries::from_samples(samples)).unwrap();
        assert!(text.contains("ndvi"));
        assert!(text.contains("samples      3"));
        assert!(text.contains("0.700 on 2023-05-02"));
    }

    #[test]
    fn yield_card_lists_fields() {
        let estimate = YieldEstimate {
            value: 3.25,
            samples: 14,
            normalization: Normalization::PerCall,
        };
        let text = format_yield_card(&estimate, Some(0.5));
        assert!(text.contains("3.250"));
        assert!(text.contains("per_call"));
        assert!(text.contains("0.50s"));
    }

    #[test]
    fn preview_marks_field_cells() {
        let mut mask = PredictionMask::new(4, 4);
        let tile = Tile {
            row: 0,
            col: 0,
            row_offset: 0,
            col_offset: 0,
            size: 2,
        };
        mask.write_tile(&tile, ndarray::Array2::from_elem((2, 2), true).view())
            .unwrap();
        let preview = mask_preview(&mask, 4);
        assert_eq!(preview, "##..\n....\n");
    }

    #[test]
    fn layers_show_template_and_palette() {
        let mut map = LayerList::default();
        map.center(20.5, 78.9, 5);
        map.add_tile_layer(
            "NDVI",
            &TileLayer {
                url_template: "https://t/{z}/{x}/{y}".into(),
            },
            &VisParams::default(),
        );
        let text = format_layers(&map);
        assert!(text.contains("https://t/{z}/{x}/{y}"));
        assert!(text.contains("blue, white, green"));
        assert!(text.contains("zoom 5"));
    }
}
