// Report Export - spreadsheet and PDF renderings of the household table

use crate::db::Household;
use crate::error::{Error, Result};
use chrono::NaiveDate;
use printpdf::*;
use rust_xlsxwriter::{Format, Workbook};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

pub const SHEET_NAME: &str = "households";
pub const PDF_TITLE: &str = "Laporan Data Kemiskinan";
pub const FILE_PREFIX: &str = "laporan_kemiskinan";

/// Spreadsheet header row, in field order
pub const SPREADSHEET_COLUMNS: [&str; 10] = [
    "id",
    "name",
    "address",
    "education",
    "num_children",
    "monthly_income",
    "occupation",
    "classification",
    "image_path",
    "created_at",
];

/// Fixed PDF table layout: (column, width in mm). Widths sum to the printable width.
pub const PDF_COLUMNS: [(&str, f32); 8] = [
    ("id", 10.0),
    ("name", 27.0),
    ("education", 20.0),
    ("num_children", 18.0),
    ("monthly_income", 21.0),
    ("occupation", 37.0),
    ("classification", 20.0),
    ("created_at", 27.0),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Xlsx,
    Pdf,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Pdf => "pdf",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "xlsx" | "excel" => Ok(ExportFormat::Xlsx),
            "pdf" => Ok(ExportFormat::Pdf),
            other => Err(format!("unknown export format '{}' (expected xlsx or pdf)", other)),
        }
    }
}

/// `laporan_kemiskinan_<YYYY-MM-DD>.<ext>`
pub fn export_file_name(format: ExportFormat, date: NaiveDate) -> String {
    format!("{}_{}.{}", FILE_PREFIX, date.format("%Y-%m-%d"), format.extension())
}

fn timestamp_cell(h: &Household) -> String {
    h.created_at.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn render_error(e: impl fmt::Display) -> Error {
    Error::Render(e.to_string())
}

// ============================================================================
// SPREADSHEET
// ============================================================================

pub fn to_xlsx_bytes(records: &[Household]) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();

    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME).map_err(render_error)?;

    for (col, header) in SPREADSHEET_COLUMNS.iter().enumerate() {
        sheet
            .write_string_with_format(0, col as u16, *header, &header_format)
            .map_err(render_error)?;
    }

    for (idx, h) in records.iter().enumerate() {
        let row = (idx + 1) as u32;
        sheet.write_number(row, 0, h.id as f64).map_err(render_error)?;
        sheet.write_string(row, 1, h.name.as_str()).map_err(render_error)?;
        sheet.write_string(row, 2, h.address.as_str()).map_err(render_error)?;
        sheet.write_string(row, 3, h.education.as_str()).map_err(render_error)?;
        sheet.write_number(row, 4, h.num_children as f64).map_err(render_error)?;
        sheet.write_number(row, 5, h.monthly_income).map_err(render_error)?;
        sheet.write_string(row, 6, h.occupation.as_str()).map_err(render_error)?;
        sheet
            .write_string(row, 7, h.classification.label())
            .map_err(render_error)?;
        if let Some(path) = &h.image_path {
            sheet.write_string(row, 8, path.as_str()).map_err(render_error)?;
        }
        sheet
            .write_string(row, 9, timestamp_cell(h))
            .map_err(render_error)?;
    }

    workbook.save_to_buffer().map_err(render_error)
}

// ============================================================================
// PDF
// ============================================================================

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 15.0;
const TITLE_SIZE: f32 = 18.0;
const CELL_FONT_SIZE: f32 = 7.0;
const ROW_HEIGHT: f32 = 6.0;
const CELL_PADDING: f32 = 1.2;
const GRID_THICKNESS: f32 = 0.25;
/// Top of the table on the first page (below the title) and on later pages
const FIRST_TABLE_TOP: f32 = PAGE_HEIGHT - 32.0;
const NEXT_TABLE_TOP: f32 = PAGE_HEIGHT - MARGIN;

fn pdf_cell(h: &Household, column: &str) -> String {
    match column {
        "id" => h.id.to_string(),
        "name" => h.name.clone(),
        "education" => h.education.clone(),
        "num_children" => h.num_children.to_string(),
        "monthly_income" => format!("{:.1}", h.monthly_income),
        "occupation" => h.occupation.clone(),
        "classification" => h.classification.label().to_string(),
        "created_at" => timestamp_cell(h),
        _ => String::new(),
    }
}

/// Cut text to roughly fit `width` mm at the cell font size (Helvetica averages
/// about half an em per glyph)
fn fit_to_width(text: &str, width: f32) -> String {
    let glyph_mm = CELL_FONT_SIZE * 0.5 * 0.3528;
    let max_chars = ((width - 2.0 * CELL_PADDING) / glyph_mm).floor().max(1.0) as usize;

    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max_chars.saturating_sub(2)).collect();
        format!("{}..", kept)
    }
}

fn rows_per_page(table_top: f32) -> usize {
    // One slot is taken by the repeated header row
    (((table_top - MARGIN) / ROW_HEIGHT).floor() as usize).saturating_sub(1).max(1)
}

fn black() -> Color {
    Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None))
}

fn draw_row(layer: &PdfLayerReference, cells: &[String], top: f32, font: &IndirectFontRef) {
    let mut x = MARGIN;
    let baseline = top - ROW_HEIGHT + 2.0;
    for ((_, width), text) in PDF_COLUMNS.iter().zip(cells) {
        layer.use_text(
            fit_to_width(text, *width),
            CELL_FONT_SIZE,
            Mm(x + CELL_PADDING),
            Mm(baseline),
            font,
        );
        x += width;
    }
}

fn draw_grid(layer: &PdfLayerReference, top: f32, row_count: usize) {
    let table_width: f32 = PDF_COLUMNS.iter().map(|(_, w)| w).sum();
    let bottom = top - ROW_HEIGHT * row_count as f32;

    layer.set_outline_color(black());
    layer.set_outline_thickness(GRID_THICKNESS);

    for i in 0..=row_count {
        let y = top - ROW_HEIGHT * i as f32;
        layer.add_line(Line {
            points: vec![
                (Point::new(Mm(MARGIN), Mm(y)), false),
                (Point::new(Mm(MARGIN + table_width), Mm(y)), false),
            ],
            is_closed: false,
        });
    }

    let mut x = MARGIN;
    for i in 0..=PDF_COLUMNS.len() {
        layer.add_line(Line {
            points: vec![
                (Point::new(Mm(x), Mm(top)), false),
                (Point::new(Mm(x), Mm(bottom)), false),
            ],
            is_closed: false,
        });
        if let Some((_, width)) = PDF_COLUMNS.get(i) {
            x += width;
        }
    }
}

fn draw_table_page(
    layer: &PdfLayerReference,
    top: f32,
    rows: &[&Household],
    header_font: &IndirectFontRef,
    body_font: &IndirectFontRef,
) {
    let table_width: f32 = PDF_COLUMNS.iter().map(|(_, w)| w).sum();

    // Grey header band with white-smoke labels
    layer.set_fill_color(Color::Greyscale(Greyscale::new(0.5, None)));
    layer.add_rect(Rect::new(
        Mm(MARGIN),
        Mm(top - ROW_HEIGHT),
        Mm(MARGIN + table_width),
        Mm(top),
    ));
    layer.set_fill_color(Color::Rgb(Rgb::new(0.96, 0.96, 0.96, None)));
    let headers: Vec<String> = PDF_COLUMNS.iter().map(|(name, _)| name.to_string()).collect();
    draw_row(layer, &headers, top, header_font);

    layer.set_fill_color(black());
    for (i, h) in rows.iter().enumerate() {
        let cells: Vec<String> = PDF_COLUMNS.iter().map(|(col, _)| pdf_cell(h, col)).collect();
        draw_row(layer, &cells, top - ROW_HEIGHT * (i + 1) as f32, body_font);
    }

    draw_grid(layer, top, rows.len() + 1);
}

pub fn to_pdf_bytes(records: &[Household]) -> Result<Vec<u8>> {
    let (doc, first_page, first_layer) =
        PdfDocument::new(PDF_TITLE, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");

    let title_font = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(render_error)?;
    let body_font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(render_error)?;

    let layer = doc.get_page(first_page).get_layer(first_layer);
    layer.set_fill_color(black());
    layer.use_text(
        PDF_TITLE,
        TITLE_SIZE,
        Mm(MARGIN),
        Mm(PAGE_HEIGHT - MARGIN - 7.0),
        &title_font,
    );

    let all: Vec<&Household> = records.iter().collect();
    let first_chunk = rows_per_page(FIRST_TABLE_TOP).min(all.len());
    draw_table_page(&layer, FIRST_TABLE_TOP, &all[..first_chunk], &title_font, &body_font);

    for chunk in all[first_chunk..].chunks(rows_per_page(NEXT_TABLE_TOP)) {
        let (page, page_layer) = doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let layer = doc.get_page(page).get_layer(page_layer);
        draw_table_page(&layer, NEXT_TABLE_TOP, chunk, &title_font, &body_font);
    }

    doc.save_to_bytes().map_err(render_error)
}

// ============================================================================
// FILE OUTPUT
// ============================================================================

/// Render `records` and write them to `<dir>/laporan_kemiskinan_<date>.<ext>`
pub fn write_export(
    records: &[Household],
    format: ExportFormat,
    dir: &Path,
    date: NaiveDate,
) -> Result<PathBuf> {
    if records.is_empty() {
        return Err(Error::NoData);
    }

    let bytes = match format {
        ExportFormat::Xlsx => to_xlsx_bytes(records)?,
        ExportFormat::Pdf => to_pdf_bytes(records)?,
    };

    fs::create_dir_all(dir)?;
    let path = dir.join(export_file_name(format, date));
    fs::write(&path, &bytes)?;

    info!(
        format = %format,
        records = records.len(),
        bytes = bytes.len(),
        path = %path.display(),
        "report exported"
    );
    Ok(path)
}
