//! Tabulation: lay records out as rows and write them to an `.xlsx` workbook.
//!
//! The first row holds the column names. `key`, `value` and `comments` are
//! always the first three columns; any extra fields the model attached
//! follow in the order they were first seen. Cells a record lacks are
//! written empty.
//!
//! Excel's hard limits are checked before anything is written, so an
//! oversize result fails cleanly instead of producing a workbook Excel
//! refuses to open.

use crate::error::Pdf2XlsxError;
use crate::output::ExtractionResult;
use rust_xlsxwriter::{Format, Workbook};
use std::path::Path;
use tracing::debug;

/// Rows per worksheet, header included.
pub const MAX_ROWS: usize = 1_048_576;
/// Columns per worksheet.
pub const MAX_COLUMNS: usize = 16_384;
/// Characters per cell.
pub const MAX_CELL_CHARS: usize = 32_767;

const MIN_COLUMN_WIDTH: usize = 10;
const MAX_COLUMN_WIDTH: usize = 80;

/// A header row plus data rows, every row as wide as the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Lay out `result` as a table, enforcing Excel's size limits.
pub fn build_table(result: &ExtractionResult) -> Result<Table, Pdf2XlsxError> {
    let mut columns: Vec<String> = vec!["key".into(), "value".into(), "comments".into()];
    for record in result.records() {
        for field in record.extra.keys() {
            if !columns.iter().any(|c| c == field) {
                columns.push(field.clone());
            }
        }
    }

    if columns.len() > MAX_COLUMNS {
        return Err(Pdf2XlsxError::serialization(format!(
            "{} columns exceed the worksheet limit of {}",
            columns.len(),
            MAX_COLUMNS
        )));
    }
    if result.len() + 1 > MAX_ROWS {
        return Err(Pdf2XlsxError::serialization(format!(
            "{} records exceed the worksheet limit of {} data rows",
            result.len(),
            MAX_ROWS - 1
        )));
    }

    let mut rows = Vec::with_capacity(result.len());
    for (idx, record) in result.records().iter().enumerate() {
        let mut row = Vec::with_capacity(columns.len());
        row.push(record.key.clone());
        row.push(record.value.clone());
        row.push(record.comments.clone());
        for field in &columns[3..] {
            row.push(record.extra_cell(field).unwrap_or_default().to_string());
        }

        if let Some((col, cell)) = row
            .iter()
            .enumerate()
            .find(|(_, cell)| cell.chars().count() > MAX_CELL_CHARS)
        {
            return Err(Pdf2XlsxError::serialization(format!(
                "cell in row {} column '{}' has {} characters (limit {})",
                idx + 1,
                columns[col],
                cell.chars().count(),
                MAX_CELL_CHARS
            )));
        }
        rows.push(row);
    }

    Ok(Table { columns, rows })
}

/// Write `table` to a single-sheet workbook at `path`.
///
/// Blocking; run it on the blocking pool from async code.
pub fn write_workbook(table: &Table, sheet_name: &str, path: &Path) -> Result<(), Pdf2XlsxError> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();

    let sheet = workbook.add_worksheet();
    sheet
        .set_name(sheet_name)
        .map_err(Pdf2XlsxError::serialization)?;

    for (col, name) in table.columns.iter().enumerate() {
        sheet
            .write_string_with_format(0, col as u16, name, &header)
            .map_err(Pdf2XlsxError::serialization)?;
    }
    for (r, row) in table.rows.iter().enumerate() {
        for (col, cell) in row.iter().enumerate() {
            if cell.is_empty() {
                continue;
            }
            sheet
                .write_string((r + 1) as u32, col as u16, cell)
                .map_err(Pdf2XlsxError::serialization)?;
        }
    }

    sheet
        .set_freeze_panes(1, 0)
        .map_err(Pdf2XlsxError::serialization)?;
    for (col, width) in column_widths(table).into_iter().enumerate() {
        sheet
            .set_column_width(col as u16, width as f64)
            .map_err(Pdf2XlsxError::serialization)?;
    }

    workbook.save(path).map_err(Pdf2XlsxError::serialization)?;
    debug!(
        "Wrote {} row(s) x {} column(s) to {}",
        table.rows.len(),
        table.columns.len(),
        path.display()
    );
    Ok(())
}

/// Widest cell per column, clamped to a readable range.
fn column_widths(table: &Table) -> Vec<usize> {
    table
        .columns
        .iter()
        .enumerate()
        .map(|(col, name)| {
            let widest = table
                .rows
                .iter()
                .map(|row| row[col].chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0);
            widest.clamp(MIN_COLUMN_WIDTH, MAX_COLUMN_WIDTH)
        })
        .collect()
}
