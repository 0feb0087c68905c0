use crate::output::{Cell, Table};
use anyhow::{Context, Result};
use rust_xlsxwriter::Workbook;
use serde_json::{Map, Number, Value};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Longest string a single XLSX cell accepts.
const XLSX_MAX_CHARS: usize = 32_767;

fn cell_to_json(cell: &Cell) -> Value {
    match cell {
        Cell::Text(s) => Value::String(s.clone()),
        Cell::Number(n) if n.fract() == 0.0 && n.abs() < 9e15 => Value::Number(Number::from(*n as i64)),
        Cell::Number(n) => Number::from_f64(*n).map(Value::Number).unwrap_or(Value::Null),
        Cell::Empty => Value::Null,
    }
}

/// Rows as JSON objects, keys in header order.
pub fn table_to_json(table: &Table) -> Vec<Value> {
    table
        .rows
        .iter()
        .map(|row| {
            let object: Map<String, Value> = table
                .headers
                .iter()
                .enumerate()
                .map(|(i, header)| (header.clone(), row.get(i).map(cell_to_json).unwrap_or(Value::Null)))
                .collect();
            Value::Object(object)
        })
        .collect()
}

pub fn write_json(path: &Path, table: &Table) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &table_to_json(table))?;
    writer.flush()?;
    info!("Saved {} rows to {}", table.len(), path.display());
    Ok(())
}

/// CSV with a UTF-8 byte order mark so spreadsheet apps detect the encoding.
pub fn write_csv(path: &Path, table: &Table) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all("\u{feff}".as_bytes())?;

    let mut writer = csv::Writer::from_writer(BufWriter::new(file));
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        let record: Vec<String> = (0..table.headers.len())
            .map(|i| row.get(i).map(Cell::display).unwrap_or_default())
            .collect();
        writer.write_record(&record)?;
    }
    writer.flush()?;
    info!("Saved {} rows to {}", table.len(), path.display());
    Ok(())
}

/// One workbook, one worksheet per `(name, table)` pair, header in row 0.
pub fn write_xlsx(path: &Path, sheets: &[(&str, &Table)]) -> Result<()> {
    let mut workbook = Workbook::new();

    for (name, table) in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(*name)?;

        for (col, header) in table.headers.iter().enumerate() {
            worksheet.write_string(0, col as u16, header.as_str())?;
        }
        for (r, row) in table.rows.iter().enumerate() {
            let excel_row = (r + 1) as u32;
            for (col, cell) in row.iter().enumerate() {
                match cell {
                    Cell::Text(s) => {
                        let text: String = s.chars().take(XLSX_MAX_CHARS).collect();
                        worksheet.write_string(excel_row, col as u16, text.as_str())?;
                    }
                    Cell::Number(n) => {
                        worksheet.write_number(excel_row, col as u16, *n)?;
                    }
                    Cell::Empty => {}
                }
            }
        }
    }

    workbook
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Saved workbook {}", path.display());
    Ok(())
}
