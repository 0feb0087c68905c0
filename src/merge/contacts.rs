use crate::merge::phone::{normalize_phone, valid_phone, PHONE_NOT_FOUND};
use crate::merge::{has_extension, merge_records, sort_by_mtime, MergePolicy, Sourced};
use crate::models::{listing_code_from_url, ContactRecord};
use crate::output::{export_table, Cell, ExportPaths, Table};
use crate::pipeline::input::InputTable;
use anyhow::{Context, Result};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{info, warn};

const URL_KEYS: [&str; 5] = ["url", "URL", "link", "href", "url_inmueble"];
const EMAIL_KEYS: [&str; 3] = ["email", "correo", "e-mail"];
const PHONE_KEYS: [&str; 8] = [
    "telefono",
    "teléfono",
    "tel",
    "phone",
    "telefono_formatted",
    "telefono_visible",
    "telefono_mostrar",
    "celular",
];

static PHONE_LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+?\d[\d\s\-()]{6,}").expect("invalid regex: phone-like text"));

/// JSON or JSONL files whose name mentions contacts or emails.
pub fn is_contact_file(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    has_extension(path, &["json", "jsonl"]) && (name.contains("contact") || name.contains("email"))
}

fn read_entries(path: &Path) -> Result<Vec<Map<String, Value>>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;

    let values: Vec<Value> = if has_extension(path, &["jsonl"]) {
        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect()
    } else {
        match serde_json::from_str::<Value>(&content).with_context(|| format!("Invalid JSON in {}", path.display()))? {
            Value::Array(items) => items,
            _ => Vec::new(),
        }
    };

    Ok(values
        .into_iter()
        .filter_map(|v| match v {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect())
}

fn field<'a>(entry: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    entry.iter().find_map(|(k, v)| {
        let key = k.trim().to_lowercase();
        let matches = keys.iter().any(|candidate| candidate.to_lowercase() == key);
        match v {
            Value::String(s) if matches && !s.trim().is_empty() => Some(s.trim()),
            _ => None,
        }
    })
}

fn phone_field(entry: &Map<String, Value>) -> Option<String> {
    entry.iter().find_map(|(k, v)| {
        let key = k.trim().to_lowercase();
        if !PHONE_KEYS.contains(&key.as_str()) {
            return None;
        }
        match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    })
}

/// One contact record from a result entry, or `None` without a URL.
pub fn contact_from_entry(entry: &Map<String, Value>) -> Option<ContactRecord> {
    let url = field(entry, &URL_KEYS)?.to_string();
    let email = field(entry, &EMAIL_KEYS).unwrap_or_default().to_string();
    let telefono = phone_field(entry)
        .map(|p| normalize_phone(&p))
        .unwrap_or_else(|| PHONE_NOT_FOUND.to_string());
    Some(ContactRecord { url, email, telefono })
}

pub fn load_contacts(path: &Path) -> Result<Vec<ContactRecord>> {
    Ok(read_entries(path)?.iter().filter_map(contact_from_entry).collect())
}

/// Merge contact files, oldest first, into one record per URL. A record is
/// valid when it carries a usable phone number.
pub fn merge_contacts(paths: &[PathBuf], policy: MergePolicy) -> Result<Vec<Sourced<ContactRecord>>> {
    let mut sources = Vec::new();
    for path in sort_by_mtime(paths.to_vec())? {
        match load_contacts(&path) {
            Ok(records) => {
                info!("Read {} contact records from {}", records.len(), path.display());
                sources.push((path, records));
            }
            Err(e) => warn!("Skipping {}: {:#}", path.display(), e),
        }
    }

    let merged = merge_records(sources, policy, |r| r.url.clone(), |r| valid_phone(&r.telefono));
    info!("Unique contact records by URL: {}", merged.len());
    Ok(merged)
}

/// Reorder `records` to follow `input_urls`; URLs without a record get an
/// empty email and the not-found phone.
pub fn order_by_input(records: &[ContactRecord], input_urls: &[String]) -> Vec<ContactRecord> {
    let by_url: HashMap<&str, &ContactRecord> = records.iter().map(|r| (r.url.as_str(), r)).collect();
    input_urls
        .iter()
        .map(|url| {
            by_url.get(url.trim()).map(|r| (*r).clone()).unwrap_or_else(|| ContactRecord {
                url: url.trim().to_string(),
                email: String::new(),
                telefono: PHONE_NOT_FOUND.to_string(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContactSummary {
    pub total: usize,
    pub with_phone: usize,
    pub without_phone: usize,
}

pub fn summarize(records: &[ContactRecord]) -> ContactSummary {
    let with_phone = records
        .iter()
        .filter(|r| !r.telefono.eq_ignore_ascii_case(PHONE_NOT_FOUND))
        .count();
    ContactSummary {
        total: records.len(),
        with_phone,
        without_phone: records.len() - with_phone,
    }
}

pub fn results_table(records: &[ContactRecord]) -> Table {
    let mut table = Table::new(vec!["url".into(), "email".into(), "telefono".into()]);
    for r in records {
        table.push(vec![
            Cell::text(r.url.as_str()),
            Cell::text(r.email.as_str()),
            Cell::text(normalize_phone(&r.telefono)),
        ]);
    }
    table
}

/// The input sheet as given, with `email` and `telefono` appended.
pub fn with_origin_table(input: &InputTable, records: &[ContactRecord]) -> Table {
    let by_url: HashMap<&str, &ContactRecord> = records.iter().map(|r| (r.url.as_str(), r)).collect();
    let url_column = input.url_column();

    let mut headers = input.headers.clone();
    headers.push("email".into());
    headers.push("telefono".into());
    let mut table = Table::new(headers);

    for (i, row) in input.rows.iter().enumerate() {
        let found = by_url.get(input.cell(i, url_column).trim());
        let mut cells: Vec<Cell> = (0..input.headers.len())
            .map(|c| Cell::text(row.get(c).cloned().unwrap_or_default()))
            .collect();
        cells.push(Cell::text(found.map(|r| r.email.clone()).unwrap_or_default()));
        cells.push(Cell::text(
            found
                .map(|r| normalize_phone(&r.telefono))
                .unwrap_or_else(|| PHONE_NOT_FOUND.to_string()),
        ));
        table.push(cells);
    }
    table
}

/// Write the contact deliverable: `Resultados` (and `Con_Origen` when the
/// input sheet is known) as JSON, CSV and XLSX.
pub fn write_contact_deliverable(
    records: &[ContactRecord],
    input: Option<&InputTable>,
    dir: &Path,
    stem: &str,
) -> Result<(ExportPaths, ContactSummary)> {
    let results = results_table(records);
    let paths = export_table(&results, dir, stem, "Resultados")?;

    if let Some(input) = input {
        let origin = with_origin_table(input, records);
        crate::output::write_xlsx(&paths.xlsx, &[("Resultados", &results), ("Con_Origen", &origin)])?;
    }

    let summary = summarize(records);
    info!(
        "Totals: {} | with phone: {} | without phone: {}",
        summary.total, summary.with_phone, summary.without_phone
    );
    Ok((paths, summary))
}

/// Emails, phones and file names gathered for one numeric id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContactHits {
    pub emails: BTreeSet<String>,
    pub phones: BTreeSet<String>,
    pub sources: BTreeSet<String>,
}

fn scan_entry(entry: &Map<String, Value>) -> (Option<String>, Option<String>) {
    let mut email = field(entry, &EMAIL_KEYS).map(str::to_string);
    let mut phone = phone_field(entry).filter(|p| !p.eq_ignore_ascii_case(PHONE_NOT_FOUND));

    // Loose fallbacks over the other string values; URL fields always
    // contain digit runs, so they are left out.
    for (key, value) in entry {
        let Value::String(s) = value else { continue };
        if URL_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key.trim())) {
            continue;
        }
        if email.is_none() && s.contains('@') {
            email = Some(s.trim().to_string());
        }
        if phone.is_none() && PHONE_LIKE.is_match(s) {
            phone = Some(s.trim().to_string());
        }
    }
    (email, phone)
}

/// Index contact details found in `paths` by the numeric id in each URL.
pub fn collect_contact_hits(paths: &[PathBuf]) -> Result<HashMap<String, ContactHits>> {
    let mut hits: HashMap<String, ContactHits> = HashMap::new();
    for path in paths {
        let entries = match read_entries(path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Skipping {}: {:#}", path.display(), e);
                continue;
            }
        };
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        for entry in &entries {
            let Some(id) = field(entry, &URL_KEYS).and_then(listing_code_from_url) else {
                continue;
            };
            let (email, phone) = scan_entry(entry);
            let slot = hits.entry(id).or_default();
            if let Some(email) = email {
                slot.emails.insert(email);
            }
            if let Some(phone) = phone {
                slot.phones.insert(normalize_phone(&phone));
            }
            slot.sources.insert(source.clone());
        }
    }
    info!("Contact details found for {} ids", hits.len());
    Ok(hits)
}

/// Header used as the URL column of a master sheet: an exact match first,
/// then any header mentioning url, link or href.
fn master_url_column(master: &InputTable) -> usize {
    let exact = master.url_column();
    if master
        .headers
        .get(exact)
        .is_some_and(|h| crate::pipeline::input::URL_HEADERS.contains(&h.trim().to_lowercase().as_str()))
    {
        return exact;
    }
    master
        .headers
        .iter()
        .position(|h| {
            let h = h.to_lowercase();
            h.contains("url") || h.contains("link") || h.contains("href")
        })
        .unwrap_or(0)
}

#[derive(Debug, Clone)]
pub struct AttachReport {
    pub table: Table,
    pub with_email: usize,
    pub with_phone: usize,
}

/// Join contact hits onto every master row by the id in its URL, adding
/// `email`, `telefono` and `contact_sources` (values joined with `; `).
pub fn attach_contacts(master: &InputTable, hits: &HashMap<String, ContactHits>) -> AttachReport {
    let url_column = master_url_column(master);
    let mut headers = master.headers.clone();
    headers.extend(["email", "telefono", "contact_sources"].map(String::from));
    let mut table = Table::new(headers);
    let (mut with_email, mut with_phone) = (0, 0);

    for (i, row) in master.rows.iter().enumerate() {
        let mut cells: Vec<Cell> = (0..master.headers.len())
            .map(|c| Cell::text(row.get(c).cloned().unwrap_or_default()))
            .collect();

        let found = listing_code_from_url(master.cell(i, url_column)).and_then(|id| hits.get(&id));
        let join = |set: &BTreeSet<String>| set.iter().cloned().collect::<Vec<_>>().join("; ");
        match found {
            Some(h) => {
                with_email += usize::from(!h.emails.is_empty());
                with_phone += usize::from(!h.phones.is_empty());
                cells.push(Cell::text(join(&h.emails)));
                cells.push(Cell::text(join(&h.phones)));
                cells.push(Cell::text(join(&h.sources)));
            }
            None => cells.extend([Cell::Empty, Cell::Empty, Cell::Empty]),
        }
        table.push(cells);
    }

    info!("Rows with email: {} / {}", with_email, table.len());
    info!("Rows with phone: {} / {}", with_phone, table.len());
    AttachReport {
        table,
        with_email,
        with_phone,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_contact_file_names() {
        assert!(is_contact_file(Path::new("resultados/contact_info_3.json")));
        assert!(is_contact_file(Path::new("resultados/extraction_emails_RECHECK.json")));
        assert!(!is_contact_file(Path::new("resultados/lotes/lote_01/properties.jsonl")));
        assert!(!is_contact_file(Path::new("resultados/emails.xlsx")));
    }

    #[test]
    fn test_contact_aliases() {
        let record = contact_from_entry(&entry(json!({
            "URL": "https://x.co/perfil/176359705",
            "correo": "ventas@inmo.co",
            "tel": "300 555 1234"
        })))
        .unwrap();
        assert_eq!(record.email, "ventas@inmo.co");
        assert_eq!(record.telefono, "+573005551234");

        let bare = contact_from_entry(&entry(json!({"url": "https://x.co/1"}))).unwrap();
        assert_eq!(bare.telefono, PHONE_NOT_FOUND);
        assert!(contact_from_entry(&entry(json!({"email": "a@b.co"}))).is_none());
    }

    #[test]
    fn test_order_by_input_fills_missing() {
        let records = vec![ContactRecord {
            url: "https://x.co/2".into(),
            email: "b@x.co".into(),
            telefono: "+573001112233".into(),
        }];
        let ordered = order_by_input(&records, &["https://x.co/1".into(), " https://x.co/2".into()]);
        assert_eq!(ordered.len(), 2);
        assert_eq!(ordered[0].telefono, PHONE_NOT_FOUND);
        assert_eq!(ordered[0].email, "");
        assert_eq!(ordered[1].email, "b@x.co");
        assert_eq!(summarize(&ordered), ContactSummary { total: 2, with_phone: 1, without_phone: 1 });
    }

    #[test]
    fn test_scan_entry_fallbacks_skip_url() {
        let (email, phone) = scan_entry(&entry(json!({
            "url": "https://x.co/perfil/176359705",
            "contacto": "escribanos a info@inmo.co",
            "nota": "Llamar al (601) 555-1234"
        })));
        assert_eq!(email.as_deref(), Some("escribanos a info@inmo.co"));
        assert_eq!(phone.as_deref(), Some("Llamar al (601) 555-1234"));

        let (_, phone) = scan_entry(&entry(json!({"url": "https://x.co/perfil/176359705"})));
        assert!(phone.is_none());
    }

    #[test]
    fn test_attach_by_numeric_id() {
        let dir = tempfile::tempdir().unwrap();
        let contacts = dir.path().join("contact_info_1.json");
        std::fs::write(
            &contacts,
            r#"[
                {"url": "https://x.co/inmobiliarias/perfil/176359705/", "email": "a@inmo.co", "telefono": "3001234567"},
                {"href": "https://x.co/perfil/176359705", "email": "b@inmo.co"}
            ]"#,
        )
        .unwrap();
        let hits = collect_contact_hits(&[contacts]).unwrap();

        let master = InputTable {
            headers: vec!["Nombre".into(), "URL INMUEBLE".into()],
            rows: vec![
                vec!["Inmo A".into(), "https://x.co/inmobiliarias/perfil/176359705".into()],
                vec!["Inmo B".into(), "https://x.co/perfil/999999".into()],
            ],
        };
        let report = attach_contacts(&master, &hits);
        let row = &report.table.rows[0];
        assert_eq!(report.table.headers.len(), 5);
        assert_eq!(row[2], Cell::text("a@inmo.co; b@inmo.co"));
        assert_eq!(row[3], Cell::text("+573001234567"));
        assert_eq!(row[4], Cell::text("contact_info_1.json"));
        assert_eq!(report.table.rows[1][2], Cell::Empty);
        assert_eq!((report.with_email, report.with_phone), (1, 1));
    }
}
