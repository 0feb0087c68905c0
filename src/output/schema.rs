//! The final spreadsheet layout handed to the client.

use crate::models::Listing;
use crate::output::{Cell, Table};

pub const MAX_IMAGE_COLUMNS: usize = 15;

pub const DATA_COLUMNS: [&str; 35] = [
    "ID Inmos",
    "Inmos",
    "URL INMUEBLE",
    "COD FR",
    "COD FR LEGACY",
    "TITULO",
    "DESCRIPCION",
    "PRECIO",
    "PRECIO ADMIN",
    "UBICACION",
    "Tipo de inmueble",
    "Tipo de oferta",
    "Estado",
    "Habitaciones",
    "Baños",
    "Parqueaderos",
    "Estrato",
    "Antigüedad",
    "Metros",
    "Area",
    "Area privada",
    "Area del terreno",
    "Area lote",
    "Piso No.",
    "Cantidad de pisos",
    "Cantidad de ambientes",
    "Apto para oficina",
    "Acepta permuta",
    "Remodelado",
    "Penthouse",
    "Contrato minimo",
    "Documentacion requerida",
    "Acepta mascotas",
    "M² de terraza",
    "Comodidades",
];

/// URL slug prefixes, most specific first.
const PROPERTY_TYPES: [(&str, &str); 17] = [
    ("apartaestudios", "Apartaestudio"),
    ("apartaestudio", "Apartaestudio"),
    ("apartamento", "Apartamento"),
    ("casa-campestre", "Casa campestre"),
    ("casa-lote", "Casa lote"),
    ("casa", "Casa"),
    ("local", "Local"),
    ("oficina", "Oficina"),
    ("lote", "Lote"),
    ("bodega", "Bodega"),
    ("finca", "Finca"),
    ("consultorio", "Consultorio"),
    ("edificio", "Edificio"),
    ("cabaña", "Cabaña"),
    ("cabana", "Cabaña"),
    ("habitacion", "Habitación"),
    ("parqueadero", "Parqueadero"),
];

const YES_EXACT: [&str; 4] = ["si", "sí", "true", "1"];
const NO_EXACT: [&str; 3] = ["no", "false", "0"];
/// Word stems of "admite", "aceptan", "permitidas" and friends.
const YES_STEMS: [&str; 3] = ["admit", "acept", "permit"];
const NO_STEMS: [&str; 1] = ["prohibid"];

pub fn columns() -> Vec<String> {
    DATA_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain((1..=MAX_IMAGE_COLUMNS).map(|i| format!("Imagen {i}")))
        .collect()
}

/// Normalise a free-text yes/no answer to `Sí` / `No`.
///
/// A leading `no`, or a `no` anywhere before the permissive word, negates it:
/// "No se aceptan mascotas" is `No`.
pub fn si_no(value: Option<&str>) -> Option<&'static str> {
    let v = value?.trim().to_lowercase();
    if v.is_empty() {
        return None;
    }
    if YES_EXACT.contains(&v.as_str()) {
        return Some("Sí");
    }
    if NO_EXACT.contains(&v.as_str()) {
        return Some("No");
    }

    let words: Vec<&str> = v.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()).collect();
    if words.iter().any(|w| NO_STEMS.iter().any(|s| w.starts_with(s))) {
        return Some("No");
    }
    let permissive = words.iter().position(|w| YES_STEMS.iter().any(|s| w.starts_with(s)));
    let negated = match permissive {
        Some(i) => words[..i].contains(&"no"),
        None => words.first() == Some(&"no"),
    };
    match (negated, permissive) {
        (true, _) => Some("No"),
        (false, Some(_)) => Some("Sí"),
        (false, None) => None,
    }
}

/// `venta` or `arriendo`, read from the listing URL.
pub fn infer_offer_type(url: &str) -> Option<&'static str> {
    let u = url.to_lowercase();
    if u.contains("-en-venta-") {
        Some("venta")
    } else if u.contains("-en-arriendo-") {
        Some("arriendo")
    } else {
        None
    }
}

/// Property type from the slug before the listing id
/// (`/apartamento-en-venta-en-chapinero/123` -> `Apartamento`),
/// else `fallback`.
pub fn infer_property_type(url: &str, fallback: Option<&str>) -> Option<String> {
    let u = url.trim().to_lowercase();
    let parts: Vec<&str> = u.trim_end_matches('/').split('/').collect();
    if parts.len() >= 2 {
        let slug = parts[parts.len() - 2];
        let base = slug.split("-en-").next().unwrap_or(slug);
        if let Some((_, name)) = PROPERTY_TYPES.iter().find(|(prefix, _)| base.starts_with(prefix)) {
            return Some(name.to_string());
        }
    }
    fallback
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
}

fn yes_no_cell(value: Option<&str>) -> Cell {
    match si_no(value) {
        Some(normalised) => Cell::text(normalised),
        None => Cell::opt_text(value),
    }
}

/// One row of the final layout, in [`columns`] order.
pub fn final_row(listing: &Listing) -> Vec<Cell> {
    let offer_type = listing
        .offer_type
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .or_else(|| infer_offer_type(&listing.url).map(str::to_string));
    let property_type = infer_property_type(&listing.url, listing.property_type.as_deref());
    let amenities = listing
        .amenities
        .as_deref()
        .map(|a| {
            a.split('|')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" | ")
        })
        .unwrap_or_default();

    let mut row = vec![
        Cell::opt_text(listing.agency_id.as_deref()),
        Cell::opt_text(listing.agency_name.as_deref()),
        Cell::text(listing.url.as_str()),
        Cell::opt_text(listing.code.as_deref()),
        Cell::opt_text(listing.legacy_code.as_deref()),
        Cell::opt_text(listing.title.as_deref()),
        Cell::opt_text(listing.description.as_deref()),
        Cell::opt_number(listing.price.map(|n| n as f64)),
        Cell::opt_number(listing.admin_fee.map(|n| n as f64)),
        Cell::opt_text(listing.location.as_deref()),
        Cell::opt_text(property_type.as_deref()),
        Cell::opt_text(offer_type.as_deref()),
        Cell::opt_text(listing.condition.as_deref()),
        Cell::opt_number(listing.bedrooms.map(|n| n as f64)),
        Cell::opt_number(listing.bathrooms.map(|n| n as f64)),
        Cell::opt_number(listing.parking_spots.map(|n| n as f64)),
        Cell::opt_number(listing.stratum.map(|n| n as f64)),
        Cell::opt_text(listing.age.as_deref()),
        Cell::opt_number(listing.square_meters),
        Cell::opt_number(listing.area),
        Cell::opt_number(listing.private_area),
        Cell::opt_number(listing.land_area),
        Cell::opt_number(listing.lot_area),
        Cell::opt_number(listing.floor.map(|n| n as f64)),
        Cell::opt_number(listing.floor_count.map(|n| n as f64)),
        Cell::opt_number(listing.room_count.map(|n| n as f64)),
        yes_no_cell(listing.office_ready.as_deref()),
        yes_no_cell(listing.accepts_exchange.as_deref()),
        yes_no_cell(listing.remodeled.as_deref()),
        yes_no_cell(listing.penthouse.as_deref()),
        Cell::opt_text(listing.minimum_contract.as_deref()),
        Cell::opt_text(listing.required_documents.as_deref()),
        Cell::text(si_no(listing.accepts_pets.as_deref()).unwrap_or_default()),
        Cell::opt_number(listing.terrace_area),
        Cell::text(amenities),
    ];

    row.extend(
        (0..MAX_IMAGE_COLUMNS).map(|i| Cell::opt_text(listing.images.get(i).map(String::as_str))),
    );
    row
}

pub fn final_table(listings: &[Listing]) -> Table {
    let mut table = Table::new(columns());
    for listing in listings {
        table.push(final_row(listing));
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_layout() {
        let columns = columns();
        assert_eq!(columns.len(), 50);
        assert_eq!(columns[2], "URL INMUEBLE");
        assert_eq!(columns[34], "Comodidades");
        assert_eq!(columns[35], "Imagen 1");
        assert_eq!(columns[49], "Imagen 15");
    }

    #[test]
    fn test_si_no() {
        assert_eq!(si_no(Some("Sí")), Some("Sí"));
        assert_eq!(si_no(Some(" true ")), Some("Sí"));
        assert_eq!(si_no(Some("Se admite")), Some("Sí"));
        assert_eq!(si_no(Some("No admite mascotas")), Some("No"));
        assert_eq!(si_no(Some("Prohibido")), Some("No"));
        assert_eq!(si_no(Some("0")), Some("No"));
        assert_eq!(si_no(Some("No se aceptan mascotas")), Some("No"));
        assert_eq!(si_no(Some("No permitido")), Some("No"));
        assert_eq!(si_no(Some("No se admiten mascotas")), Some("No"));
        assert_eq!(si_no(Some("no permitidas")), Some("No"));
        assert_eq!(si_no(Some("no, solo gatos")), Some("No"));
        assert_eq!(si_no(Some("Sí, se aceptan mascotas pequeñas")), Some("Sí"));
        assert_eq!(si_no(Some("Permitidas")), Some("Sí"));
        assert_eq!(si_no(Some("quizá")), None);
        assert_eq!(si_no(Some("")), None);
        assert_eq!(si_no(None), None);
    }

    #[test]
    fn test_offer_type_from_url() {
        assert_eq!(
            infer_offer_type("https://www.fincaraiz.com.co/casa-en-venta-en-venecia-bogota/192350837"),
            Some("venta")
        );
        assert_eq!(
            infer_offer_type("https://www.fincaraiz.com.co/apartamento-en-arriendo-en-cedritos/1"),
            Some("arriendo")
        );
        assert_eq!(infer_offer_type("https://www.fincaraiz.com.co/proyecto/1"), None);
    }

    #[test]
    fn test_property_type_from_slug() {
        let url = "https://www.fincaraiz.com.co/casa-campestre-en-venta-en-la-calera/1923";
        assert_eq!(infer_property_type(url, None).as_deref(), Some("Casa campestre"));
        let url = "https://www.fincaraiz.com.co/apartaestudio-en-arriendo-en-chapinero/77/";
        assert_eq!(infer_property_type(url, None).as_deref(), Some("Apartaestudio"));
        assert_eq!(
            infer_property_type("https://x.co/proyecto-nuevo/5", Some("Apartamento")).as_deref(),
            Some("Apartamento")
        );
        assert_eq!(infer_property_type("https://x.co/otro/5", Some(" ")), None);
    }

    #[test]
    fn test_final_row_fills_from_url_and_images() {
        let mut listing = Listing::new("https://www.fincaraiz.com.co/oficina-en-arriendo-en-usaquen/555");
        listing.code = Some("555".into());
        listing.price = Some(3_500_000);
        listing.accepts_pets = Some("true".into());
        listing.remodeled = Some("Parcialmente".into());
        listing.amenities = Some("Gimnasio|Piscina| ".into());
        listing.images = (1..=20).map(|i| format!("https://img.co/{i}.jpg")).collect();

        let table = final_table(&[listing]);
        let row = &table.rows[0];
        let col = |name: &str| &row[table.column(name).unwrap()];

        assert_eq!(row.len(), 50);
        assert_eq!(col("Tipo de inmueble"), &Cell::text("Oficina"));
        assert_eq!(col("Tipo de oferta"), &Cell::text("arriendo"));
        assert_eq!(col("PRECIO"), &Cell::Number(3_500_000.0));
        assert_eq!(col("Acepta mascotas"), &Cell::text("Sí"));
        assert_eq!(col("Remodelado"), &Cell::text("Parcialmente"));
        assert_eq!(col("Comodidades"), &Cell::text("Gimnasio | Piscina"));
        assert_eq!(col("Imagen 15"), &Cell::text("https://img.co/15.jpg"));
    }
}
