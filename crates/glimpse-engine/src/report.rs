use glimpse_contracts::layout::{row_height_points, RowLayout};
use glimpse_contracts::AnalysisResult;
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, FormatPattern, Image, Workbook};
use tracing::warn;

use crate::error::ReportError;
use crate::thumbnail::{thumbnail_for_row, Thumbnail};

pub const SHEET_NAME: &str = "Analysis";
pub const HEADERS: [&str; 3] = ["Image", "Image Name", "Analysis"];
/// Column widths in character units, in header order.
pub const COLUMN_WIDTHS: [f64; 3] = [30.0, 20.0, 30.0];
pub const PLACEHOLDER_TEXT: &str = "Image could not be loaded";
/// Longest string a single worksheet cell accepts, in characters.
pub const CELL_CHAR_LIMIT: usize = 32_767;
pub const TRUNCATION_MARKER: &str = " [truncated]";
const HEADER_FILL: u32 = 0xD9E1F2;

#[derive(Debug, Clone, PartialEq)]
pub enum ImageCell {
    Thumbnail(Thumbnail),
    Placeholder { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub image: ImageCell,
    pub display_name: String,
    pub analysis: String,
    pub layout: RowLayout,
}

/// Header plus one row per analysis result, in input order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReportDocument {
    rows: Vec<ReportRow>,
}

impl ReportDocument {
    /// Lays out every result. Undecodable images become placeholder cells.
    pub fn build(results: &[AnalysisResult]) -> Self {
        let rows = results.iter().map(layout_row).collect();
        Self { rows }
    }

    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    /// Worksheet rows including the header.
    pub fn row_count(&self) -> usize {
        self.rows.len() + 1
    }

    /// Writes the workbook into memory.
    pub fn to_buffer(&self) -> Result<Vec<u8>, ReportError> {
        let header_format = Format::new()
            .set_bold()
            .set_pattern(FormatPattern::Solid)
            .set_background_color(Color::RGB(HEADER_FILL))
            .set_border(FormatBorder::Thin);
        let top_format = Format::new().set_align(FormatAlign::Top);
        let analysis_format = Format::new()
            .set_text_wrap()
            .set_align(FormatAlign::Top);

        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(SHEET_NAME)?;

        for (col, (label, width)) in HEADERS.iter().zip(COLUMN_WIDTHS).enumerate() {
            let col = col as u16;
            worksheet.set_column_width(col, width)?;
            worksheet.write_string_with_format(0, col, *label, &header_format)?;
        }

        for (idx, row) in self.rows.iter().enumerate() {
            let sheet_row = idx as u32 + 1;
            worksheet.set_row_height(sheet_row, row.layout.row_height)?;
            match &row.image {
                ImageCell::Thumbnail(thumbnail) => {
                    let image = Image::new_from_buffer(&thumbnail.png)?;
                    worksheet.insert_image(sheet_row, 0, &image)?;
                }
                ImageCell::Placeholder { .. } => {
                    worksheet.write_string_with_format(sheet_row, 0, PLACEHOLDER_TEXT, &top_format)?;
                }
            }
            worksheet.write_string_with_format(
                sheet_row,
                1,
                row.display_name.as_str(),
                &top_format,
            )?;
            worksheet.write_string_with_format(
                sheet_row,
                2,
                row.analysis.as_str(),
                &analysis_format,
            )?;
        }

        Ok(workbook.save_to_buffer()?)
    }
}

fn layout_row(result: &AnalysisResult) -> ReportRow {
    let text = result.analysis_text();
    let (image, layout) = match thumbnail_for_row(result.image().bytes(), text) {
        Ok((thumbnail, layout)) => (ImageCell::Thumbnail(thumbnail), layout),
        Err(err) => {
            warn!(image = result.display_name(), "using placeholder: {err}");
            let layout = RowLayout {
                thumbnail_width: 0,
                thumbnail_height: 0,
                row_height: row_height_points(text),
            };
            (
                ImageCell::Placeholder {
                    reason: err.to_string(),
                },
                layout,
            )
        }
    };
    ReportRow {
        image,
        display_name: fit_cell(result.display_name()),
        analysis: fit_cell(text),
        layout,
    }
}

/// Cuts `text` to [`CELL_CHAR_LIMIT`] characters, ending in [`TRUNCATION_MARKER`].
fn fit_cell(text: &str) -> String {
    if text.chars().count() <= CELL_CHAR_LIMIT {
        return text.to_string();
    }
    let keep = CELL_CHAR_LIMIT - TRUNCATION_MARKER.chars().count();
    let mut fitted: String = text.chars().take(keep).collect();
    fitted.push_str(TRUNCATION_MARKER);
    fitted
}

/// Lays out and serializes `results` in one go.
pub fn render_report(results: &[AnalysisResult]) -> Result<Vec<u8>, ReportError> {
    ReportDocument::build(results).to_buffer()
}
