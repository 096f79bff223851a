//! Row sizing for the report: text length drives row height, which in turn
//! bounds the thumbnail.

pub const APPROX_CHARS_PER_LINE: f64 = 30.0;
pub const LINE_HEIGHT_PX: f64 = 15.0;
pub const MIN_TEXT_HEIGHT_PX: f64 = 75.0;
pub const MAX_TEXT_HEIGHT_PX: f64 = 400.0;
pub const MIN_ROW_HEIGHT_PX: f64 = 200.0;
/// Pixels to worksheet points.
pub const ROW_HEIGHT_SCALE: f64 = 0.75;
pub const THUMBNAIL_MAX_WIDTH: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowLayout {
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
    /// Row height in points, ready for the worksheet.
    pub row_height: f64,
}

/// Row height in pixels before scaling to points.
pub fn row_height_px(analysis_text: &str) -> f64 {
    let num_lines = analysis_text.chars().count() as f64 / APPROX_CHARS_PER_LINE;
    let text_height = (num_lines * LINE_HEIGHT_PX).clamp(MIN_TEXT_HEIGHT_PX, MAX_TEXT_HEIGHT_PX);
    text_height.max(MIN_ROW_HEIGHT_PX)
}

pub fn row_height_points(analysis_text: &str) -> f64 {
    row_height_px(analysis_text) * ROW_HEIGHT_SCALE
}

/// Target thumbnail size for a `width` x `height` source in a row of `row_height_px`.
///
/// Never upscales; both sides are at least one pixel.
pub fn thumbnail_size(width: u32, height: u32, row_height_px: f64) -> (u32, u32) {
    let width = width.max(1);
    let height = height.max(1);
    let aspect_ratio = f64::from(width) / f64::from(height);
    let new_width = THUMBNAIL_MAX_WIDTH.min(width);
    let new_height = row_height_px.min(f64::from(new_width) / aspect_ratio).floor();
    (new_width, (new_height as u32).max(1))
}

pub fn compute_row_layout(analysis_text: &str, width: u32, height: u32) -> RowLayout {
    let row_px = row_height_px(analysis_text);
    let (thumbnail_width, thumbnail_height) = thumbnail_size(width, height, row_px);
    RowLayout {
        thumbnail_width,
        thumbnail_height,
        row_height: row_px * ROW_HEIGHT_SCALE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn six_hundred_chars_give_225_points() {
        let text = "x".repeat(600);
        assert_eq!(row_height_px(&text), 300.0);
        assert_eq!(row_height_points(&text), 225.0);
    }

    #[test]
    fn short_text_hits_the_row_floor() {
        assert_eq!(row_height_px(""), 200.0);
        assert_eq!(row_height_points("short"), 150.0);
        // 450 chars -> 225px text height, just above the floor
        assert_eq!(row_height_px(&"y".repeat(450)), 225.0);
    }

    #[test]
    fn long_text_is_capped() {
        assert_eq!(row_height_px(&"z".repeat(10_000)), 400.0);
        assert_eq!(row_height_points(&"z".repeat(10_000)), 300.0);
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        assert_eq!(row_height_px(&"\u{e9}".repeat(600)), 300.0);
    }

    #[test]
    fn landscape_thumbnail_keeps_aspect() {
        let layout = compute_row_layout("", 1600, 900);
        assert_eq!(layout.thumbnail_width, 200);
        assert_eq!(layout.thumbnail_height, 112);
        assert_eq!(layout.row_height, 150.0);
    }

    #[test]
    fn portrait_thumbnail_is_bounded_by_row_height() {
        let (w, h) = thumbnail_size(150, 200, 200.0);
        assert_eq!((w, h), (150, 200));
        let (w, h) = thumbnail_size(400, 2000, 200.0);
        assert_eq!(w, 200);
        assert_eq!(h, 200);
    }

    #[test]
    fn small_images_are_not_upscaled() {
        assert_eq!(thumbnail_size(40, 20, 200.0), (40, 20));
    }

    #[test]
    fn degenerate_dimensions_stay_positive() {
        assert_eq!(thumbnail_size(0, 0, 200.0), (1, 1));
        assert_eq!(thumbnail_size(5000, 1, 200.0), (200, 1));
    }
}
