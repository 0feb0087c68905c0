use listing_crawler::merge::{merge_contacts, merge_listings, MergePolicy, PHONE_NOT_FOUND};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Write `content` and pin the file's mtime `age_secs` seconds in the past.
fn write_aged(dir: &Path, name: &str, content: &str, age_secs: u64) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    let file = File::options().write(true).open(&path).unwrap();
    file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
        .unwrap();
    path
}

fn contact_sources(dir: &Path) -> Vec<PathBuf> {
    let recheck = write_aged(
        dir,
        "extraction_emails_RECHECK.json",
        r#"[{"url": "https://x.co/perfil/3", "email": "fixed@inmo.co", "telefono": ""}]"#,
        10,
    );
    let newest = write_aged(
        dir,
        "extraction_emails_2.json",
        r#"[
            {"url": "https://x.co/perfil/1", "email": "uno@inmo.co", "telefono": "300 111 2222"},
            {"url": "https://x.co/perfil/2", "email": "dos-nuevo@inmo.co", "telefono": "310 333 4444"},
            {"url": "https://x.co/perfil/3", "email": "tres@inmo.co", "telefono": "320 555 6666"}
        ]"#,
        20,
    );
    let oldest = write_aged(
        dir,
        "extraction_emails_1.json",
        r#"[
            {"url": "https://x.co/perfil/1", "correo": "uno@inmo.co"},
            {"url": "https://x.co/perfil/2", "email": "dos@inmo.co", "tel": "(301) 999-8888"},
            {"URL": "https://x.co/perfil/3", "email": "tres@inmo.co", "phone": "no encontrado"}
        ]"#,
        30,
    );
    // Argument order must not matter; modification time does.
    vec![recheck, newest, oldest]
}

#[test]
fn override_files_replace_and_valid_phones_fill_gaps() {
    let dir = tempfile::tempdir().unwrap();
    let merged = merge_contacts(&contact_sources(dir.path()), MergePolicy::OverrideFiles).unwrap();

    let urls: Vec<&str> = merged.iter().map(|s| s.record.url.as_str()).collect();
    assert_eq!(urls, vec!["https://x.co/perfil/1", "https://x.co/perfil/2", "https://x.co/perfil/3"]);

    // Oldest file had no phone; the newer valid one wins.
    assert_eq!(merged[0].record.telefono, "+573001112222");
    // Oldest already valid; the newer one does not replace it.
    assert_eq!(merged[1].record.email, "dos@inmo.co");
    assert_eq!(merged[1].record.telefono, "+573019998888");
    // The recheck file replaces even a valid record.
    assert_eq!(merged[2].record.email, "fixed@inmo.co");
    assert_eq!(merged[2].record.telefono, PHONE_NOT_FOUND);
    assert!(merged[2].source.ends_with("extraction_emails_RECHECK.json"));
}

#[test]
fn first_valid_wins_ignores_override_names() {
    let dir = tempfile::tempdir().unwrap();
    let merged = merge_contacts(&contact_sources(dir.path()), MergePolicy::FirstValidWins).unwrap();
    assert_eq!(merged.len(), 3);
    assert_eq!(merged[2].record.telefono, "+573205556666");
}

#[test]
fn last_wins_takes_newest_file() {
    let dir = tempfile::tempdir().unwrap();
    let merged = merge_contacts(&contact_sources(dir.path()), MergePolicy::LastWins).unwrap();
    assert_eq!(merged[1].record.email, "dos-nuevo@inmo.co");
    assert_eq!(merged[2].record.email, "fixed@inmo.co");
}

#[test]
fn consolidated_listings_hold_one_record_per_url() {
    let dir = tempfile::tempdir().unwrap();
    let lote_1 = dir.path().join("lote_01");
    let lote_2 = dir.path().join("lote_02");
    std::fs::create_dir_all(&lote_1).unwrap();
    std::fs::create_dir_all(&lote_2).unwrap();

    let a = write_aged(
        &lote_1,
        "properties.jsonl",
        "{\"url_inmueble\":\"https://x.co/a/1\",\"cod_fr\":\"1\",\"precio\":100}\n\
         {\"url_inmueble\":\"https://x.co/a/2\"}\n\
         {\"url_inmueble\":\"https://x.co/a/1\",\"cod_fr\":\"1\",\"precio\":150}\n",
        20,
    );
    let b = write_aged(
        &lote_2,
        "properties.jsonl",
        "{\"url_inmueble\":\"https://x.co/a/2\",\"cod_fr\":\"2\"}\n\
         {\"url_inmueble\":\"https://x.co/a/3\",\"cod_fr\":\"3\"}\n",
        10,
    );

    let merged = merge_listings(&[b, a], MergePolicy::OverrideFiles).unwrap();
    let urls: Vec<&str> = merged.iter().map(|s| s.record.url.as_str()).collect();
    assert_eq!(urls, vec!["https://x.co/a/1", "https://x.co/a/2", "https://x.co/a/3"]);
    // Within one file the later line wins.
    assert_eq!(merged[0].record.price, Some(150));
    assert_eq!(merged[1].record.code.as_deref(), Some("2"));
}
