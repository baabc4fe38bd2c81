use crate::errors::Result;
use crate::models::{ClassifiedRecord, Column, Config, RawValue, OUTPUT_COLUMNS};
use rust_xlsxwriter::{Format, FormatBorder, Workbook, Worksheet};
use std::fs;
use std::path::Path;
use tracing::info;

fn header_format() -> Format {
    Format::new().set_bold().set_border(FormatBorder::Thin)
}

fn write_header(worksheet: &mut Worksheet, titles: &[&str]) -> Result<()> {
    let format = header_format();
    for (col, title) in titles.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *title, &format)?;
    }
    Ok(())
}

fn write_cell(worksheet: &mut Worksheet, row: u32, col: u16, cell: &RawValue) -> Result<()> {
    match cell {
        RawValue::Empty => {}
        RawValue::Text(s) if s.is_empty() => {}
        RawValue::Int(n) => {
            worksheet.write_number(row, col, *n as f64)?;
        }
        RawValue::Float(x) if x.is_finite() => {
            worksheet.write_number(row, col, *x)?;
        }
        RawValue::Bool(b) => {
            worksheet.write_boolean(row, col, *b)?;
        }
        RawValue::Float(_) | RawValue::Text(_) | RawValue::DateTime(_) => {
            worksheet.write_string(row, col, cell.to_string())?;
        }
    }
    Ok(())
}

/// Results workbook with one row per classified record.
pub fn report_to_buffer(records: &[ClassifiedRecord], config: &Config) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(config.output_sheet.as_str())?;
    write_header(worksheet, &OUTPUT_COLUMNS)?;

    for (i, record) in records.iter().enumerate() {
        let row = (i + 1) as u32;
        for (col, cell) in record.to_cells()?.iter().enumerate() {
            write_cell(worksheet, row, col as u16, cell)?;
        }
    }

    Ok(workbook.save_to_buffer()?)
}

pub fn write_report(path: &Path, records: &[ClassifiedRecord], config: &Config) -> Result<()> {
    let buffer = report_to_buffer(records, config)?;
    fs::write(path, buffer)?;
    info!(path = %path.display(), rows = records.len(), "wrote results workbook");
    Ok(())
}

/// Empty input workbook carrying only the expected header row.
pub fn template_to_buffer(config: &Config) -> Result<Vec<u8>> {
    let headers: Vec<&str> = Column::ALL.iter().map(|c| c.header()).collect();

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(config.template_sheet.as_str())?;
    write_header(worksheet, &headers)?;
    worksheet.autofit();

    Ok(workbook.save_to_buffer()?)
}

pub fn write_template(path: &Path, config: &Config) -> Result<()> {
    fs::write(path, template_to_buffer(config)?)?;
    info!(path = %path.display(), "wrote input template");
    Ok(())
}

/// Plain CSV copy of the results sheet.
pub fn write_csv(path: &Path, records: &[ClassifiedRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(OUTPUT_COLUMNS)?;

    for record in records {
        let cells = record.to_cells()?;
        writer.write_record(cells.iter().map(|cell| cell.to_string()))?;
    }

    writer.flush()?;
    info!(path = %path.display(), rows = records.len(), "wrote results CSV");
    Ok(())
}
