use crate::error::InputError;
use calamine::{open_workbook_auto, Reader};
use serde_json::Value;
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Header names recognised as the URL column, compared lowercase and trimmed.
pub const URL_HEADERS: [&str; 5] = ["url", "links", "enlace", "link", "inmuebles"];

/// A URL source loaded as a plain table of strings.
///
/// Spreadsheets and CSV files keep every column so later steps can write the
/// original data back next to the results; text and JSON sources become a
/// single `url` column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl InputTable {
    pub fn load(path: &Path) -> Result<Self, InputError> {
        if !path.exists() {
            return Err(InputError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            });
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        let table = match extension.as_str() {
            "xlsx" | "xlsm" | "xls" | "ods" => load_spreadsheet(path)?,
            "csv" => load_csv(path)?,
            "json" => load_json(path)?,
            "txt" => load_text(path)?,
            _ => {
                return Err(InputError::UnsupportedFormat {
                    path: path.to_path_buf(),
                })
            }
        };

        info!("Loaded {} rows from {:?}", table.rows.len(), path);
        Ok(table)
    }

    fn single_column(urls: Vec<String>) -> Self {
        Self {
            headers: vec!["url".to_string()],
            rows: urls.into_iter().map(|u| vec![u]).collect(),
        }
    }

    /// Index of the URL column; the first column when no header matches.
    pub fn url_column(&self) -> usize {
        self.headers
            .iter()
            .position(|h| URL_HEADERS.contains(&h.trim().to_lowercase().as_str()))
            .unwrap_or(0)
    }

    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Trimmed, non-empty URLs in file order, first occurrence kept.
    pub fn urls(&self) -> Vec<String> {
        let column = self.url_column();
        let mut seen = HashSet::new();
        let mut urls = Vec::new();
        for row in 0..self.rows.len() {
            let url = self.cell(row, column).trim();
            if url.is_empty() {
                continue;
            }
            if seen.insert(url.to_string()) {
                urls.push(url.to_string());
            }
        }
        let duplicates = self.rows.len() - urls.len();
        if duplicates > 0 {
            warn!("Dropped {} blank or duplicate URL rows", duplicates);
        }
        urls
    }
}

/// Load the URL list from any supported source file.
pub fn load_urls(path: &Path) -> Result<Vec<String>, InputError> {
    let urls = InputTable::load(path)?.urls();
    if urls.is_empty() {
        return Err(InputError::Empty {
            path: path.to_path_buf(),
        });
    }
    Ok(urls)
}

fn load_spreadsheet(path: &Path) -> Result<InputTable, InputError> {
    let spreadsheet_err = |message: String| InputError::Spreadsheet {
        path: path.to_path_buf(),
        message,
    };

    let mut workbook = open_workbook_auto(path).map_err(|e| spreadsheet_err(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| spreadsheet_err("workbook has no sheets".to_string()))?
        .map_err(|e| spreadsheet_err(e.to_string()))?;

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header) => header.iter().map(|c| c.to_string().trim().to_string()).collect(),
        None => return Err(InputError::Empty { path: path.to_path_buf() }),
    };
    let rows = rows
        .map(|row| row.iter().map(|c| c.to_string().trim().to_string()).collect())
        .collect();

    Ok(InputTable { headers, rows })
}

fn load_csv(path: &Path) -> Result<InputTable, InputError> {
    let csv_err = |source: csv::Error| InputError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(InputTable { headers, rows })
}

fn load_json(path: &Path) -> Result<InputTable, InputError> {
    let content = read(path)?;
    let value: Value = serde_json::from_str(&content).map_err(|source| InputError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    // Batch files wrap the list as {"lote": n, "urls": [...]}
    let items = match &value {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => map
            .get("urls")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]),
        _ => &[],
    };

    let urls = items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => ["url", "URL", "url_inmueble", "URL INMUEBLE"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str))
                .map(str::to_string),
            _ => None,
        })
        .collect();

    Ok(InputTable::single_column(urls))
}

fn load_text(path: &Path) -> Result<InputTable, InputError> {
    let urls = read(path)?
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect();
    Ok(InputTable::single_column(urls))
}

fn read(path: &Path) -> Result<String, InputError> {
    std::fs::read_to_string(path).map_err(|source| InputError::Io {
        path: PathBuf::from(path),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_detects_url_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inmuebles.csv");
        std::fs::write(
            &path,
            "\u{feff}Nombre,Link,Ciudad\nCasa A, https://x.co/a/1 ,Bogotá\nCasa B,,Cali\nCasa C,https://x.co/a/1,Bogotá\nCasa D,https://x.co/b/2,Medellín\n",
        )
        .unwrap();

        let table = InputTable::load(&path).unwrap();
        assert_eq!(table.headers, vec!["Nombre", "Link", "Ciudad"]);
        assert_eq!(table.url_column(), 1);
        assert_eq!(table.urls(), vec!["https://x.co/a/1", "https://x.co/b/2"]);
    }

    #[test]
    fn test_first_column_fallback() {
        let table = InputTable {
            headers: vec!["Direcciones".into(), "Otro".into()],
            rows: vec![vec!["https://x.co/1".into(), "z".into()]],
        };
        assert_eq!(table.url_column(), 0);
        assert_eq!(table.urls(), vec!["https://x.co/1"]);
    }

    #[test]
    fn test_batch_json_and_text() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("lote_01.json");
        std::fs::write(&json, r#"{"lote": 1, "total": 2, "urls": ["https://x.co/1", "https://x.co/2"]}"#).unwrap();
        assert_eq!(load_urls(&json).unwrap(), vec!["https://x.co/1", "https://x.co/2"]);

        let txt = dir.path().join("fallidas.txt");
        std::fs::write(&txt, "https://x.co/3\n\n# comment\nhttps://x.co/4\n").unwrap();
        assert_eq!(load_urls(&txt).unwrap(), vec!["https://x.co/3", "https://x.co/4"]);
    }

    #[test]
    fn test_empty_source_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let txt = dir.path().join("vacio.txt");
        std::fs::write(&txt, "\n").unwrap();
        assert!(matches!(load_urls(&txt), Err(InputError::Empty { .. })));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.pdf");
        std::fs::write(&path, "x").unwrap();
        assert!(matches!(
            InputTable::load(&path),
            Err(InputError::UnsupportedFormat { .. })
        ));
    }
}
