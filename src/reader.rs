use crate::errors::{ReportError, Result};
use crate::models::{ClassifiedRecord, Column, InputRecord, RawValue, OUTPUT_COLUMNS};
use calamine::{open_workbook_auto, open_workbook_auto_from_rs, Data, Range, Reader, Sheets};
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use tracing::{debug, info, warn};

/// Load student rows from an exam workbook on disk.
pub fn read_input_path(path: &Path, sheet: Option<&str>) -> Result<Vec<InputRecord>> {
    let mut workbook = open_workbook_auto(path).map_err(|source| ReportError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let (name, range) = select_sheet(&mut workbook, sheet)?;
    records_from_range(&name, &range)
}

/// Load student rows from an in-memory workbook (an uploaded file).
pub fn read_input_bytes(bytes: Vec<u8>, sheet: Option<&str>) -> Result<Vec<InputRecord>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let (name, range) = select_sheet(&mut workbook, sheet)?;
    records_from_range(&name, &range)
}

/// Parse a results workbook back into classified records.
pub fn read_report_bytes(bytes: Vec<u8>, sheet: Option<&str>) -> Result<Vec<ClassifiedRecord>> {
    read_report_rows(bytes, sheet)?
        .iter()
        .enumerate()
        .map(|(i, cells)| {
            ClassifiedRecord::from_cells(cells).map_err(|message| ReportError::InvalidRow {
                row: i + 2,
                message,
            })
        })
        .collect()
}

/// Raw data rows of a results workbook, padded to the full column count.
pub fn read_report_rows(bytes: Vec<u8>, sheet: Option<&str>) -> Result<Vec<Vec<RawValue>>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let (name, range) = select_sheet(&mut workbook, sheet)?;

    let mut rows = range.rows();
    let header: Vec<String> = rows
        .next()
        .ok_or_else(|| ReportError::MissingHeader(name.clone()))?
        .iter()
        .map(|cell| cell_to_raw(cell).to_string())
        .collect();
    if header.len() < OUTPUT_COLUMNS.len()
        || header.iter().zip(OUTPUT_COLUMNS).any(|(found, expected)| found != expected)
    {
        return Err(ReportError::InvalidRow {
            row: 1,
            message: format!("unexpected report header: {:?}", header),
        });
    }

    Ok(rows
        .map(|row| {
            (0..OUTPUT_COLUMNS.len())
                .map(|i| row.get(i).map(cell_to_raw).unwrap_or_default())
                .collect()
        })
        .collect())
}

fn select_sheet<RS: Read + Seek>(
    workbook: &mut Sheets<RS>,
    sheet: Option<&str>,
) -> Result<(String, Range<Data>)> {
    let names = workbook.sheet_names();
    let name = match sheet {
        Some(wanted) => names
            .into_iter()
            .find(|n| n == wanted)
            .ok_or_else(|| ReportError::MissingSheet(wanted.to_string()))?,
        None => names.into_iter().next().ok_or(ReportError::NoSheets)?,
    };
    let range = workbook.worksheet_range(&name)?;
    Ok((name, range))
}

fn records_from_range(sheet: &str, range: &Range<Data>) -> Result<Vec<InputRecord>> {
    let mut rows = range.rows();
    let header = rows
        .next()
        .ok_or_else(|| ReportError::MissingHeader(sheet.to_string()))?;

    let mut mapping: Vec<(usize, Column)> = Vec::new();
    for (idx, cell) in header.iter().enumerate() {
        let title = cell_to_raw(cell).to_string();
        match Column::from_header(&title) {
            Some(column) if mapping.iter().any(|(_, c)| *c == column) => {
                debug!(column = column.header(), index = idx, "duplicate column ignored");
            }
            Some(column) => mapping.push((idx, column)),
            None if !title.trim().is_empty() => {
                debug!(header = %title, "unrecognized column ignored");
            }
            None => {}
        }
    }

    let missing: Vec<&str> = Column::ALL
        .iter()
        .filter(|column| !mapping.iter().any(|(_, c)| c == *column))
        .map(|column| column.header())
        .collect();
    if !missing.is_empty() {
        warn!(sheet, ?missing, "expected columns not found, defaults will be used");
    }

    let mut blank_rows = 0usize;
    let mut records = Vec::new();
    for row in rows {
        if row.iter().all(|cell| matches!(cell, Data::Empty)) {
            blank_rows += 1;
            continue;
        }
        let mut record = InputRecord::default();
        for (idx, column) in &mapping {
            if let Some(cell) = row.get(*idx) {
                record.set(*column, cell_to_raw(cell));
            }
        }
        records.push(record);
    }

    if blank_rows > 0 {
        debug!(blank_rows, "skipped empty rows");
    }
    info!(sheet, rows = records.len(), "loaded input sheet");
    Ok(records)
}

fn cell_to_raw(cell: &Data) -> RawValue {
    match cell {
        Data::Empty | Data::Error(_) => RawValue::Empty,
        Data::Int(n) => RawValue::Int(*n),
        Data::Float(x) => RawValue::Float(*x),
        Data::String(s) => RawValue::Text(s.clone()),
        Data::Bool(b) => RawValue::Bool(*b),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(RawValue::DateTime)
            .unwrap_or(RawValue::Float(dt.as_f64())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => RawValue::Text(s.clone()),
    }
}
