use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static TRAILING_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/?(?:perfil/)?(\d+)/?$").expect("invalid regex: trailing id"));

static ANY_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{5,})").expect("invalid regex: generic id"));

/// A single property listing extracted from its detail page.
///
/// Field names on the wire keep the column keys used by the checkpoint and
/// batch result files, so older runs can be resumed and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Listing {
    #[serde(rename = "id_inmos")]
    pub agency_id: Option<String>,
    #[serde(rename = "inmos")]
    pub agency_name: Option<String>,
    #[serde(rename = "url_inmueble")]
    pub url: String,
    #[serde(rename = "cod_fr")]
    pub code: Option<String>,
    #[serde(rename = "cod_fr_legacy")]
    pub legacy_code: Option<String>,
    #[serde(rename = "titulo")]
    pub title: Option<String>,
    #[serde(rename = "descripcion")]
    pub description: Option<String>,
    #[serde(rename = "precio")]
    pub price: Option<i64>,
    #[serde(rename = "precio_admin")]
    pub admin_fee: Option<i64>,
    #[serde(rename = "ubicacion")]
    pub location: Option<String>,
    #[serde(rename = "tipo_inmueble")]
    pub property_type: Option<String>,
    #[serde(rename = "tipo_oferta")]
    pub offer_type: Option<String>,
    #[serde(rename = "estado")]
    pub condition: Option<String>,
    #[serde(rename = "habitaciones")]
    pub bedrooms: Option<i64>,
    #[serde(rename = "banos")]
    pub bathrooms: Option<i64>,
    #[serde(rename = "parqueaderos")]
    pub parking_spots: Option<i64>,
    #[serde(rename = "estrato")]
    pub stratum: Option<i64>,
    #[serde(rename = "antiguedad")]
    pub age: Option<String>,
    #[serde(rename = "metros")]
    pub square_meters: Option<f64>,
    pub area: Option<f64>,
    #[serde(rename = "area_privada")]
    pub private_area: Option<f64>,
    #[serde(rename = "area_terreno")]
    pub land_area: Option<f64>,
    #[serde(rename = "area_lote")]
    pub lot_area: Option<f64>,
    #[serde(rename = "piso_no")]
    pub floor: Option<i64>,
    #[serde(rename = "cantidad_pisos")]
    pub floor_count: Option<i64>,
    #[serde(rename = "cantidad_ambientes")]
    pub room_count: Option<i64>,
    #[serde(rename = "apto_oficina")]
    pub office_ready: Option<String>,
    #[serde(rename = "acepta_permuta")]
    pub accepts_exchange: Option<String>,
    #[serde(rename = "remodelado")]
    pub remodeled: Option<String>,
    pub penthouse: Option<String>,
    #[serde(rename = "contrato_minimo")]
    pub minimum_contract: Option<String>,
    #[serde(rename = "documentacion_requerida")]
    pub required_documents: Option<String>,
    #[serde(rename = "acepta_mascotas")]
    pub accepts_pets: Option<String>,
    #[serde(rename = "m2_terraza")]
    pub terrace_area: Option<f64>,
    /// Amenity names joined with `|`.
    #[serde(rename = "comodidades")]
    pub amenities: Option<String>,
    #[serde(rename = "imagenes")]
    pub images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scraped_at: Option<DateTime<Utc>>,
}

impl Listing {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// A listing counts as extracted once its site code is known.
    pub fn is_complete(&self) -> bool {
        self.code.as_deref().is_some_and(|c| !c.trim().is_empty())
    }
}

/// Contact details captured for a listing or agency page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub url: String,
    pub email: String,
    pub telefono: String,
}

/// Counters persisted with every checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlStats {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<f64>,
    pub rate_per_sec: Option<f64>,
}

/// Numeric listing id embedded in a listing or agency URL.
pub fn listing_code_from_url(url: &str) -> Option<String> {
    let trimmed = url.trim();
    let path = trimmed.split(['?', '#']).next().unwrap_or(trimmed);
    TRAILING_ID
        .captures(path)
        .or_else(|| ANY_ID.captures(path))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_from_trailing_segment() {
        assert_eq!(
            listing_code_from_url("https://www.fincaraiz.com.co/casa-en-venta-en-venecia-bogota/192350837"),
            Some("192350837".to_string())
        );
        assert_eq!(
            listing_code_from_url("https://www.fincaraiz.com.co/inmobiliarias/perfil/176359705/"),
            Some("176359705".to_string())
        );
    }

    #[test]
    fn test_code_ignores_query_and_falls_back() {
        assert_eq!(
            listing_code_from_url("https://example.com/oficina/192114884?utm=1"),
            Some("192114884".to_string())
        );
        assert_eq!(
            listing_code_from_url("https://example.com/p/12345678/fotos"),
            Some("12345678".to_string())
        );
        assert_eq!(listing_code_from_url("https://example.com/contacto"), None);
    }

    #[test]
    fn test_listing_wire_names() {
        let mut listing = Listing::new("https://example.com/a/1234567");
        listing.code = Some("1234567".into());
        listing.bedrooms = Some(3);
        let value = serde_json::to_value(&listing).unwrap();
        assert_eq!(value["url_inmueble"], "https://example.com/a/1234567");
        assert_eq!(value["cod_fr"], "1234567");
        assert_eq!(value["habitaciones"], 3);
        assert!(value.get("scraped_at").is_none());
    }

    #[test]
    fn test_completeness_requires_code() {
        let mut listing = Listing::new("u");
        assert!(!listing.is_complete());
        listing.code = Some("  ".into());
        assert!(!listing.is_complete());
        listing.code = Some("99".into());
        assert!(listing.is_complete());
    }
}
