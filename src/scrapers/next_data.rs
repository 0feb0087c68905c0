//! Listing extraction from the `__NEXT_DATA__` payload embedded in detail pages.
//!
//! The page ships its full state as JSON; `props.pageProps.data` carries the
//! listing and `props.pageProps.technicalSheet` a list of `{field, text, value}`
//! rows. Direct `data` values win over technical-sheet rows.

use crate::error::CrawlError;
use crate::models::Listing;
use chrono::Utc;
use scraper::{Html, Selector};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Image columns available in the final schema.
pub const MAX_IMAGES: usize = 15;

static NEXT_DATA: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script#__NEXT_DATA__").expect("invalid selector: __NEXT_DATA__"));

const TRUTHY: [&str; 5] = ["true", "si", "sí", "yes", "1"];

/// Extract a listing from a rendered detail page.
pub fn extract_listing(html: &str, url: &str) -> Result<Listing, CrawlError> {
    let document = Html::parse_document(html);
    let script = document
        .select(&NEXT_DATA)
        .next()
        .ok_or(CrawlError::MissingNextData)?;
    let payload: String = script.text().collect();
    let root: Value = serde_json::from_str(payload.trim())?;
    listing_from_next_data(&root, url)
}

/// Build a listing from an already parsed `__NEXT_DATA__` document.
pub fn listing_from_next_data(root: &Value, url: &str) -> Result<Listing, CrawlError> {
    let props = &root["props"]["pageProps"];
    let data = &props["data"];
    let code = text(&data["id"]).ok_or(CrawlError::NoListingData)?;
    let sheet: &[Value] = props["technicalSheet"].as_array().map(Vec::as_slice).unwrap_or(&[]);
    let owner = &data["owner"];

    Ok(Listing {
        agency_id: text(&owner["id"]),
        agency_name: text(&owner["name"]),
        url: url.to_string(),
        code: Some(code),
        legacy_code: text(&data["idFincaLegacy"]).or_else(|| text(&data["legacy_propID"])),
        title: text(&data["title"]),
        description: text(&data["description"]),
        price: positive(&data["price"]["amount"]),
        admin_fee: positive(&data["commonExpenses"]["amount"]),
        location: location(&data["locations"]),
        property_type: text(&data["property_type"]["name"]),
        offer_type: text(&data["operation_type"]["name"]),
        condition: sheet_text(sheet, &["construction_state_name"]),
        bedrooms: positive(&data["bedrooms"]).or_else(|| sheet_count(sheet, &["bedrooms"])),
        bathrooms: positive(&data["bathrooms"]).or_else(|| sheet_count(sheet, &["bathrooms"])),
        parking_spots: positive(&data["garage"]).or_else(|| sheet_count(sheet, &["garage"])),
        stratum: positive(&data["stratum"]).or_else(|| sheet_count(sheet, &["stratum"])),
        age: sheet_text(sheet, &["constructionYear", "antiquity", "antiguedad", "age"]),
        square_meters: decimal(&data["m2"]),
        area: decimal(&data["m2Built"]),
        private_area: decimal(&data["m2apto"]),
        land_area: decimal(&data["m2Terrain"]),
        lot_area: decimal(&data["m2"]),
        floor: integer(&data["floor"]),
        floor_count: integer(&data["floorsCount"]),
        room_count: integer(&data["rooms"]),
        office_ready: is_truthy(&data["office"]).then(|| "Sí".to_string()),
        accepts_exchange: match data["barter"] {
            Value::Bool(true) => Some("Sí".to_string()),
            Value::Bool(false) => Some("No".to_string()),
            _ => None,
        },
        remodeled: sheet_yes_no(sheet, &["remodeled", "remodelado", "renovated"]),
        penthouse: is_truthy(&data["penthouse"]).then(|| "Sí".to_string()),
        minimum_contract: sheet_text(sheet, &["minimumContract", "contrato_minimo", "minimum_contract"]),
        required_documents: sheet_text(
            sheet,
            &["requiredDocumentation", "documentacion_requerida", "required_docs"],
        ),
        accepts_pets: sheet_yes_no(
            sheet,
            &["allowPets", "pets", "mascotas", "accepts_pets", "petFriendly"],
        ),
        terrace_area: decimal(&data["m2Terrace"]),
        amenities: amenities(&data["facilities"]),
        images: images(data),
        scraped_at: Some(Utc::now()),
    })
}

/// Non-empty string, or a number rendered as text.
fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => digits(s),
        _ => None,
    }
}

fn positive(value: &Value) -> Option<i64> {
    integer(value).filter(|n| *n > 0)
}

fn decimal(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
}

fn digits(raw: &str) -> Option<i64> {
    let only: String = raw.chars().filter(char::is_ascii_digit).collect();
    only.parse().ok()
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => TRUTHY.contains(&s.trim().to_lowercase().as_str()),
        _ => false,
    }
}

fn sheet_value<'a>(sheet: &'a [Value], fields: &[&str]) -> Option<&'a Value> {
    sheet
        .iter()
        .find(|row| row["field"].as_str().is_some_and(|f| fields.contains(&f)))
        .map(|row| &row["value"])
}

fn sheet_text(sheet: &[Value], fields: &[&str]) -> Option<String> {
    sheet_value(sheet, fields).and_then(text)
}

fn sheet_count(sheet: &[Value], fields: &[&str]) -> Option<i64> {
    let raw = sheet_text(sheet, fields)?;
    if raw == "-1" {
        return None;
    }
    digits(&raw)
}

fn sheet_yes_no(sheet: &[Value], fields: &[&str]) -> Option<String> {
    let value = sheet_value(sheet, fields)?;
    let raw = match value {
        Value::Bool(b) => b.to_string(),
        other => text(other)?,
    };
    if TRUTHY.contains(&raw.to_lowercase().as_str()) {
        Some("Sí".to_string())
    } else {
        Some("No".to_string())
    }
}

/// "neighbourhood, city, state", skipping missing parts.
fn location(locations: &Value) -> Option<String> {
    let parts: Vec<String> = [
        &locations["location_main"]["name"],
        &locations["city"][0]["name"],
        &locations["state"][0]["name"],
    ]
    .into_iter()
    .filter_map(text)
    .collect();

    (!parts.is_empty()).then(|| parts.join(", "))
}

fn amenities(facilities: &Value) -> Option<String> {
    let names: Vec<String> = facilities
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|f| text(&f["name"]))
        .collect();

    (!names.is_empty()).then(|| names.join("|"))
}

/// Gallery URLs without repeats; the cover `img` when the gallery is empty.
fn images(data: &Value) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut urls: Vec<String> = data["images"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|img| match img {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Object(_) => text(&img["image"]),
            _ => None,
        })
        .filter(|url| seen.insert(url.clone()))
        .take(MAX_IMAGES)
        .collect();

    if urls.is_empty() {
        urls.extend(text(&data["img"]));
    }
    urls
}
