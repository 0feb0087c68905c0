pub mod schema;
pub mod writers;

use anyhow::Result;
use std::path::{Path, PathBuf};

pub use schema::{final_table, infer_offer_type, infer_property_type, si_no};
pub use writers::{write_csv, write_json, write_xlsx};

/// One spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    Empty,
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(value)
        }
    }

    pub fn opt_text(value: Option<&str>) -> Self {
        value.map(Cell::text).unwrap_or(Cell::Empty)
    }

    pub fn opt_number<N: Into<f64>>(value: Option<N>) -> Self {
        value.map(|n| Cell::Number(n.into())).unwrap_or(Cell::Empty)
    }

    /// Text as written to CSV; whole numbers lose their decimal part.
    pub fn display(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{:.0}", n),
            Cell::Number(n) => n.to_string(),
            Cell::Empty => String::new(),
        }
    }
}

/// Rows under a fixed header, the unit every writer accepts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<Cell>) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

/// Paths of one JSON/CSV/XLSX deliverable set.
#[derive(Debug, Clone)]
pub struct ExportPaths {
    pub json: PathBuf,
    pub csv: PathBuf,
    pub xlsx: PathBuf,
}

/// Write `table` as `<stem>.json`, `<stem>.csv` and `<stem>.xlsx` in `dir`.
pub fn export_table(table: &Table, dir: &Path, stem: &str, sheet: &str) -> Result<ExportPaths> {
    std::fs::create_dir_all(dir)?;
    let paths = ExportPaths {
        json: dir.join(format!("{stem}.json")),
        csv: dir.join(format!("{stem}.csv")),
        xlsx: dir.join(format!("{stem}.xlsx")),
    };
    write_json(&paths.json, table)?;
    write_csv(&paths.csv, table)?;
    write_xlsx(&paths.xlsx, &[(sheet, table)])?;
    Ok(paths)
}
