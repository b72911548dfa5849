//! SVG Prediction Grid
//!
//! Renders a bounded grid of sample images with their ground-truth and
//! predicted labels for qualitative inspection. The output is a standalone
//! SVG file that references the source images by path.

use std::fs;
use std::path::{Path, PathBuf};

use crate::utils::error::{OctError, Result};

/// Grid styling constants
const TILE_SIZE: f64 = 160.0;
const CAPTION_HEIGHT: f64 = 40.0;
const PADDING: f64 = 14.0;
const COLUMNS: usize = 4;

const COLOR_CORRECT: &str = "#2ecc71";
const COLOR_WRONG: &str = "#e74c3c";
const COLOR_TEXT: &str = "#2c3e50";

/// One cell of the prediction grid
#[derive(Debug, Clone)]
pub struct PredictionTile {
    /// Path to the rendered image file
    pub image_path: PathBuf,
    /// Ground-truth class name
    pub truth: String,
    /// Predicted class name
    pub predicted: String,
}

impl PredictionTile {
    /// Whether the prediction matches the ground truth
    pub fn is_correct(&self) -> bool {
        self.truth == self.predicted
    }
}

/// Render tiles side by side into an SVG grid at `output`.
///
/// The caller bounds the tile count; every tile passed in is rendered.
pub fn render_prediction_grid(tiles: &[PredictionTile], output: &Path) -> Result<()> {
    if tiles.is_empty() {
        return Err(OctError::InvalidInput(
            "no prediction tiles to render".to_string(),
        ));
    }

    let cols = COLUMNS.min(tiles.len());
    let rows = (tiles.len() + cols - 1) / cols;

    let cell_w = TILE_SIZE + PADDING;
    let cell_h = TILE_SIZE + CAPTION_HEIGHT + PADDING;
    let width = PADDING + cols as f64 * cell_w;
    let height = PADDING + rows as f64 * cell_h;

    let mut svg = String::new();

    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" viewBox="0 0 {} {}" width="{}" height="{}">"#,
        width, height, width, height
    ));
    svg.push_str(&format!(
        r#"<rect width="{}" height="{}" fill="white"/>"#,
        width, height
    ));

    for (idx, tile) in tiles.iter().enumerate() {
        let col = idx % cols;
        let row = idx / cols;
        let x = PADDING + col as f64 * cell_w;
        let y = PADDING + row as f64 * cell_h;

        let accent = if tile.is_correct() {
            COLOR_CORRECT
        } else {
            COLOR_WRONG
        };

        // Image with a correctness-colored border
        svg.push_str(&format!(
            r#"<image xlink:href="{}" x="{}" y="{}" width="{}" height="{}" preserveAspectRatio="xMidYMid slice"/>"#,
            escape_xml(&tile.image_path.to_string_lossy()),
            x,
            y,
            TILE_SIZE,
            TILE_SIZE
        ));
        svg.push_str(&format!(
            r#"<rect x="{}" y="{}" width="{}" height="{}" fill="none" stroke="{}" stroke-width="3"/>"#,
            x, y, TILE_SIZE, TILE_SIZE, accent
        ));

        // Ground-truth and predicted captions
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" font-family="Arial, sans-serif" font-size="12" fill="{}">true: {}</text>"#,
            x,
            y + TILE_SIZE + 16.0,
            COLOR_TEXT,
            escape_xml(&tile.truth)
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" font-family="Arial, sans-serif" font-size="12" font-weight="bold" fill="{}">pred: {}</text>"#,
            x,
            y + TILE_SIZE + 32.0,
            accent,
            escape_xml(&tile.predicted)
        ));
    }

    svg.push_str("</svg>");

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(output, svg)?;

    Ok(())
}

/// Escape special XML characters
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tile(name: &str, truth: &str, predicted: &str) -> PredictionTile {
        PredictionTile {
            image_path: PathBuf::from(name),
            truth: truth.to_string(),
            predicted: predicted.to_string(),
        }
    }

    #[test]
    fn test_empty_grid_rejected() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("grid.svg");
        let result = render_prediction_grid(&[], &out);
        assert!(result.is_err());
    }

    #[test]
    fn test_grid_contains_all_tiles() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("grid.svg");

        let tiles = vec![
            tile("a.jpeg", "CNV", "CNV"),
            tile("b.jpeg", "DME", "NORMAL"),
            tile("c.jpeg", "DRUSEN", "DRUSEN"),
        ];

        render_prediction_grid(&tiles, &out).unwrap();

        let svg = std::fs::read_to_string(&out).unwrap();
        assert_eq!(svg.matches("<image").count(), 3);
        assert!(svg.contains("true: CNV"));
        assert!(svg.contains("pred: NORMAL"));
        // Wrong prediction rendered with the error accent
        assert!(svg.contains(COLOR_WRONG));
        assert!(svg.contains(COLOR_CORRECT));
    }

    #[test]
    fn test_correctness() {
        assert!(tile("a.jpeg", "DME", "DME").is_correct());
        assert!(!tile("a.jpeg", "DME", "CNV").is_correct());
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
    }
}
