//! Typing of raw page fragments.
//!
//! Nothing here fails: unparseable or out-of-range input becomes `None`
//! (or the `Other` variant for enumerations) so one dirty field never costs
//! the rest of the record.

use crate::models::{Category, FuelType, NormalizedListing, PropertyType, RawListing};
use chrono::{Datelike, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;
use url::Url;

pub const MIN_YEAR: i32 = 1900;
/// How far past the current year a model year may lie
pub const YEAR_LOOKAHEAD: i32 = 2;
pub const MAX_MILEAGE_KM: i64 = 2_000_000;
pub const MAX_ROOMS: i32 = 50;
pub const MAX_AREA_M2: i64 = 100_000;

/// Typed record for `raw`, as of today
pub fn normalize(raw: &RawListing, category: Category, car_category: Option<&str>) -> NormalizedListing {
    normalize_at(raw, category, car_category, Utc::now().year())
}

pub fn normalize_at(
    raw: &RawListing,
    category: Category,
    car_category: Option<&str>,
    current_year: i32,
) -> NormalizedListing {
    NormalizedListing {
        external_id: raw.external_id.clone(),
        category,
        url: raw.url.clone(),
        title: raw.title.trim().to_string(),
        description: raw.description.trim().to_string(),
        location: raw.location.trim().to_string(),
        price: raw.price.as_deref().and_then(parse_price),
        images: raw
            .images
            .iter()
            .filter_map(|src| resolve_image(src, &raw.url))
            .collect(),
        year: raw.year.as_deref().and_then(|y| parse_year(y, current_year)),
        mileage: raw.mileage.as_deref().and_then(parse_mileage),
        fuel_type: raw.fuel_type.as_deref().and_then(parse_fuel),
        car_category: match category {
            Category::Car => car_category.map(str::to_string),
            Category::RealEstate => None,
        },
        rooms: raw.rooms.as_deref().and_then(parse_rooms),
        area: raw.area.as_deref().and_then(parse_area),
        property_type: raw.property_type.as_deref().and_then(parse_property_type),
    }
}

/// Digits of a price cell with currency markers and thousands separators
/// stripped. A trailing `,dd`/`.dd` group is kept as the fraction.
pub fn clean_price(text: &str) -> Option<String> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let compact: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || c.is_whitespace() || matches!(c, ',' | '.' | '\''))
        .filter(|c| !c.is_whitespace())
        .collect();
    let number = compact.trim_end_matches([',', '.', '\'']);

    let (whole, fraction) = match number.rfind([',', '.']) {
        Some(pos) if number.len() - pos - 1 <= 2 => (&number[..pos], Some(&number[pos + 1..])),
        _ => (number, None),
    };

    let digits: String = whole.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }

    match fraction {
        Some(fraction) => Some(format!("{digits}.{fraction}")),
        None => Some(digits),
    }
}

/// Non-negative price with two fraction digits
pub fn parse_price(raw: &str) -> Option<Decimal> {
    let cleaned = clean_price(raw)?;
    let mut price = Decimal::from_str(&cleaned).ok()?;
    if price.is_sign_negative() {
        return None;
    }
    price.rescale(2);
    Some(price)
}

fn leading_integer(raw: &str) -> Option<i64> {
    let start = raw.find(|c: char| c.is_ascii_digit())?;
    let digits: String = raw[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || c.is_whitespace())
        .filter(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

pub fn parse_year(raw: &str, current_year: i32) -> Option<i32> {
    let start = raw.find(|c: char| c.is_ascii_digit())?;
    let digits: String = raw[start..].chars().take_while(char::is_ascii_digit).collect();
    let year: i32 = digits.parse().ok()?;
    (MIN_YEAR..=current_year + YEAR_LOOKAHEAD)
        .contains(&year)
        .then_some(year)
}

/// Kilometres from text like `185 000 km`
pub fn parse_mileage(raw: &str) -> Option<i64> {
    let km = leading_integer(raw)?;
    (0..=MAX_MILEAGE_KM).contains(&km).then_some(km)
}

pub fn parse_rooms(raw: &str) -> Option<i32> {
    let rooms = i32::try_from(leading_integer(raw)?).ok()?;
    (1..=MAX_ROOMS).contains(&rooms).then_some(rooms)
}

/// Square metres from text like `54.5 m²` or `120,75 m2`
pub fn parse_area(raw: &str) -> Option<Decimal> {
    let start = raw.find(|c: char| c.is_ascii_digit())?;
    let number: String = raw[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || matches!(c, ',' | '.'))
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    let area = Decimal::from_str(number.trim_end_matches('.')).ok()?;
    (area > Decimal::ZERO && area <= Decimal::from(MAX_AREA_M2)).then(|| area.round_dp(2))
}

/// Closest fuel category; `None` only for blank input
pub fn parse_fuel(raw: &str) -> Option<FuelType> {
    let text = raw.trim().to_lowercase();
    if text.is_empty() {
        return None;
    }

    let has = |needles: &[&str]| needles.iter().any(|n| text.contains(n));
    let fuel = if has(&["hibr", "hybrid"]) {
        FuelType::Hybrid
    } else if has(&["elektr", "electric"]) {
        FuelType::Electric
    } else if has(&["dīzel", "dizel", "diesel"]) {
        FuelType::Diesel
    } else if has(&["benzīn", "benzin", "petrol", "gasoline", "gāze", "lpg"]) {
        FuelType::Petrol
    } else {
        FuelType::Other
    };
    Some(fuel)
}

/// Closest property category; `None` only for blank input
pub fn parse_property_type(raw: &str) -> Option<PropertyType> {
    let text = raw.trim().to_lowercase();
    if text.is_empty() {
        return None;
    }

    let has = |needles: &[&str]| needles.iter().any(|n| text.contains(n));
    let kind = if has(&["dzīvok", "dzivok", "apartment", "flat"]) {
        PropertyType::Apartment
    } else if has(&["māja", "maja", "house"]) {
        PropertyType::House
    } else if has(&["komerc", "commercial", "birojs", "office"]) {
        PropertyType::Commercial
    } else if has(&["zeme", "land", "gabals"]) {
        PropertyType::Land
    } else if has(&["istaba", "room"]) {
        PropertyType::Room
    } else {
        PropertyType::Other
    };
    Some(kind)
}

/// Absolute address of an image reference found on `page_url`.
///
/// Protocol-relative references become https; relative ones are joined to
/// the page address. Non-web schemes (`data:`, `javascript:`) are dropped.
pub fn resolve_image(src: &str, page_url: &str) -> Option<String> {
    let src = src.trim();
    if src.is_empty() {
        return None;
    }
    if let Some(rest) = src.strip_prefix("//") {
        return Some(format!("https://{rest}"));
    }

    let resolved = match Url::parse(src) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(page_url).ok()?.join(src).ok()?,
        Err(_) => return None,
    };

    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn price_with_spaces_and_currency() {
        let price = parse_price("15 000 €").unwrap();
        assert_eq!(price, dec("15000"));
        assert_eq!(price.to_string(), "15000.00");
    }

    #[test]
    fn price_separators_and_fractions() {
        assert_eq!(parse_price("€ 9.500"), Some(dec("9500")));
        assert_eq!(parse_price("1,250,000 EUR"), Some(dec("1250000")));
        assert_eq!(parse_price("12,50 €").map(|p| p.to_string()), Some("12.50".into()));
        assert_eq!(parse_price("450 €/mēn."), Some(dec("450")));
        assert_eq!(parse_price("\u{a0}3\u{a0}200\u{a0}€"), Some(dec("3200")));
    }

    #[test]
    fn price_without_digits_is_none() {
        assert_eq!(parse_price("Maiņai"), None);
        assert_eq!(parse_price(""), None);
        assert_eq!(clean_price("pēc vienošanās"), None);
    }

    #[test]
    fn year_outside_bounds_is_none() {
        assert_eq!(parse_year("2015", 2026), Some(2015));
        assert_eq!(parse_year("2015 marts", 2026), Some(2015));
        assert_eq!(parse_year("2028", 2026), Some(2028));
        assert_eq!(parse_year("2029", 2026), None);
        assert_eq!(parse_year("1899", 2026), None);
        assert_eq!(parse_year("unknown", 2026), None);
    }

    #[test]
    fn mileage_and_rooms_are_clamped() {
        assert_eq!(parse_mileage("185 000 km"), Some(185_000));
        assert_eq!(parse_mileage("185000"), Some(185_000));
        assert_eq!(parse_mileage("99 999 999"), None);
        assert_eq!(parse_rooms("3"), Some(3));
        assert_eq!(parse_rooms("0"), None);
        assert_eq!(parse_rooms("Vairāk"), None);
    }

    #[test]
    fn area_keeps_two_fraction_digits() {
        assert_eq!(parse_area("54.5 m²"), Some(dec("54.5")));
        assert_eq!(parse_area("120,756 m2"), Some(dec("120.76")));
        assert_eq!(parse_area("0 m²"), None);
    }

    #[test]
    fn fuel_maps_to_closest_variant() {
        assert_eq!(parse_fuel("Dīzelis"), Some(FuelType::Diesel));
        assert_eq!(parse_fuel("2.0 dīzelis"), Some(FuelType::Diesel));
        assert_eq!(parse_fuel("Benzīns/gāze"), Some(FuelType::Petrol));
        assert_eq!(parse_fuel("Hibrīds (benzīns/elektro)"), Some(FuelType::Hybrid));
        assert_eq!(parse_fuel("Electric"), Some(FuelType::Electric));
        assert_eq!(parse_fuel("Ūdeņradis"), Some(FuelType::Other));
        assert_eq!(parse_fuel("  "), None);
    }

    #[test]
    fn property_type_maps_to_closest_variant() {
        assert_eq!(parse_property_type("Dzīvoklis"), Some(PropertyType::Apartment));
        assert_eq!(parse_property_type("Privātmāja"), Some(PropertyType::House));
        assert_eq!(parse_property_type("Birojs"), Some(PropertyType::Commercial));
        assert_eq!(parse_property_type("Zemes gabals"), Some(PropertyType::Land));
        assert_eq!(parse_property_type("Istaba"), Some(PropertyType::Room));
        assert_eq!(parse_property_type("Lietuviešu projekts"), Some(PropertyType::Other));
    }

    #[test]
    fn images_become_absolute() {
        let page = "https://www.ss.com/msg/lv/transport/cars/bmw/x5/bdkxm.html";
        assert_eq!(
            resolve_image("//cdn.example.com/a.jpg", page).as_deref(),
            Some("https://cdn.example.com/a.jpg")
        );
        assert_eq!(
            resolve_image("/gallery/2.jpg", page).as_deref(),
            Some("https://www.ss.com/gallery/2.jpg")
        );
        assert_eq!(
            resolve_image("thumb.jpg", page).as_deref(),
            Some("https://www.ss.com/msg/lv/transport/cars/bmw/x5/thumb.jpg")
        );
        assert_eq!(resolve_image("data:image/png;base64,AAAA", page), None);
    }

    #[test]
    fn normalizes_a_raw_record() {
        let raw = RawListing {
            external_id: "bdkxm".into(),
            url: "https://www.ss.com/msg/lv/transport/cars/bmw/x5/bdkxm.html".into(),
            title: "  BMW X5 ".into(),
            price: Some("15000".into()),
            images: vec!["//cdn.example.com/a.jpg".into(), "".into()],
            year: Some("1850".into()),
            mileage: Some("185000".into()),
            fuel_type: Some("Dīzelis".into()),
            ..RawListing::default()
        };

        let record = normalize_at(&raw, Category::Car, Some("BMW"), 2026);

        assert_eq!(record.title, "BMW X5");
        assert_eq!(record.price, Some(dec("15000.00")));
        assert_eq!(record.images, vec!["https://cdn.example.com/a.jpg"]);
        assert_eq!(record.year, None);
        assert_eq!(record.mileage, Some(185_000));
        assert_eq!(record.fuel_type, Some(FuelType::Diesel));
        assert_eq!(record.car_category.as_deref(), Some("BMW"));
        assert!(record.rooms.is_none());
    }
}
