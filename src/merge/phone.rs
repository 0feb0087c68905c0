use regex::Regex;
use std::sync::LazyLock;

/// Placeholder written when no phone number is known.
pub const PHONE_NOT_FOUND: &str = "No encontrado";

static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s\-()]").expect("invalid regex: phone separators"));

static LOCAL_MOBILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^3\d{9}$").expect("invalid regex: local mobile"));

static NATIONAL_MOBILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+57\d{10}$").expect("invalid regex: national mobile"));

fn is_not_found(value: &str) -> bool {
    let v = value.trim();
    v.is_empty() || v.eq_ignore_ascii_case(PHONE_NOT_FOUND)
}

/// Canonical form of a Colombian phone number.
///
/// Separators are removed, a `00` international prefix becomes `+`, and a bare
/// ten-digit mobile gets `+57`. Applying it twice gives the same result.
pub fn normalize_phone(value: &str) -> String {
    if is_not_found(value) {
        return PHONE_NOT_FOUND.to_string();
    }

    let mut v = SEPARATORS.replace_all(value.trim(), "").into_owned();
    if v.is_empty() {
        return PHONE_NOT_FOUND.to_string();
    }
    if let Some(rest) = v.strip_prefix("00") {
        v = format!("+{rest}");
    }
    if LOCAL_MOBILE.is_match(&v) {
        v = format!("+57{v}");
    }
    v
}

/// Whether `value` looks like a reachable Colombian number.
pub fn valid_phone(value: &str) -> bool {
    if is_not_found(value) {
        return false;
    }
    let v = normalize_phone(value);
    if NATIONAL_MOBILE.is_match(&v) || LOCAL_MOBILE.is_match(&v) {
        return true;
    }
    let digits = v.chars().filter(char::is_ascii_digit).count();
    v.starts_with("+57") && digits >= 12
}
