use crate::config::{AttributeLabels, SiteMarkers, SourceConfig};
use crate::error::MalformedPageError;
use crate::models::{Category, RawListing};
use crate::normalize::clean_price;
use crate::scrapers::document::{Element, HtmlDocument, StructuredDocument};
use tracing::debug;
use url::Url;

/// Extracts the raw field mapping of one detail page.
///
/// Missing fields degrade to empty strings or `None`; only a page with none
/// of the expected landmarks is rejected.
#[derive(Debug, Clone)]
pub struct ListingParser {
    markers: SiteMarkers,
    fallback_title: String,
}

impl ListingParser {
    pub fn new(config: &SourceConfig) -> Self {
        Self::with_markers(config.markers.clone(), config.category, config.car_category.as_deref())
    }

    pub fn with_markers(markers: SiteMarkers, category: Category, car_category: Option<&str>) -> Self {
        let fallback_title = car_category
            .map(str::to_string)
            .unwrap_or_else(|| category.label().to_string());
        Self {
            markers,
            fallback_title,
        }
    }

    pub fn parse(&self, content: &str, url: &str) -> Result<RawListing, MalformedPageError> {
        let document = HtmlDocument::parse(content);
        self.parse_document(&document, url)
    }

    pub fn parse_document<D: StructuredDocument>(
        &self,
        document: &D,
        url: &str,
    ) -> Result<RawListing, MalformedPageError> {
        let malformed = |reason: &str| MalformedPageError {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let external_id = external_id(url).ok_or_else(|| malformed("no identifier in address"))?;

        let m = &self.markers;
        let heading = document.find_all(&m.title_selector).into_iter().next();
        let price_cell = document.find_by_class("td", &m.price_class);
        let location_cell = document.find_by_class("td", &m.location_class);
        let description = document.find_by_id(&m.description_id);
        let gallery = document.find_by_id(&m.gallery_id);
        let details = document.find_by_id(&m.details_id);

        let landmarks = [&heading, &price_cell, &location_cell, &description, &gallery, &details];
        if landmarks.iter().all(|found| found.is_none()) {
            return Err(malformed("no listing landmarks on page"));
        }

        let title = heading
            .map(|h| h.text)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| self.fallback_title.clone());

        let images = if gallery.is_some() {
            document
                .find_all_within(&m.gallery_id, "img")
                .iter()
                .filter_map(|img| img.attr("src"))
                .map(str::trim)
                .filter(|src| !src.is_empty())
                .map(|src| match src.strip_prefix("//") {
                    Some(rest) => format!("https://{rest}"),
                    None => src.to_string(),
                })
                .collect()
        } else {
            Vec::new()
        };

        let cells = if details.is_some() {
            document.find_all_within(&m.details_id, "td")
        } else {
            Vec::new()
        };
        let attributes = DetailAttributes::extract(&cells, &m.labels);

        debug!(url = %url, external_id = %external_id, "Parsed listing page");

        Ok(RawListing {
            external_id,
            url: url.to_string(),
            title,
            description: description.map(|d| d.text).unwrap_or_default(),
            location: location_cell.map(|c| c.text).unwrap_or_default(),
            price: price_cell.and_then(|c| clean_price(&c.text)),
            images,
            year: attributes.year,
            mileage: attributes.mileage.map(|m| strip_unit(&m, "km")),
            fuel_type: attributes.fuel_type,
            rooms: attributes.rooms,
            area: attributes.area,
            property_type: attributes.property_type,
        })
    }
}

/// Stable listing key: the last path segment without its extension, so
/// `/msg/lv/transport/cars/bmw/x5/bdkxm.html` yields `bdkxm`
pub fn external_id(url: &str) -> Option<String> {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    };

    let segment = path.split('/').filter(|s| !s.is_empty()).last()?;
    let stem = match segment.rsplit_once('.') {
        Some((stem, _ext)) if !stem.is_empty() => stem,
        _ => segment,
    };
    Some(stem.to_string())
}

#[derive(Debug, Default)]
struct DetailAttributes {
    year: Option<String>,
    mileage: Option<String>,
    fuel_type: Option<String>,
    rooms: Option<String>,
    area: Option<String>,
    property_type: Option<String>,
}

impl DetailAttributes {
    fn extract(cells: &[Element], labels: &AttributeLabels) -> Self {
        let known: Vec<&str> = [
            &labels.year,
            &labels.mileage,
            &labels.fuel_type,
            &labels.rooms,
            &labels.area,
            &labels.property_type,
        ]
        .into_iter()
        .flatten()
        .map(String::as_str)
        .collect();
        let value = |wanted: &[String]| labelled_value(cells, wanted, &known);

        Self {
            year: value(&labels.year),
            mileage: value(&labels.mileage),
            fuel_type: value(&labels.fuel_type),
            rooms: value(&labels.rooms),
            area: value(&labels.area),
            property_type: value(&labels.property_type),
        }
    }
}

/// Value of the first cell starting with one of `labels`: either the rest of
/// that cell or, when the label stands alone, the following cell unless that
/// cell is itself one of the `known` labels
fn labelled_value(cells: &[Element], labels: &[String], known: &[&str]) -> Option<String> {
    for (i, cell) in cells.iter().enumerate() {
        let text = cell.text.trim();
        let Some(label) = labels.iter().find(|label| text.starts_with(label.as_str())) else {
            continue;
        };

        let inline = text[label.len()..].trim();
        let value = if inline.is_empty() {
            cells
                .get(i + 1)
                .map(|next| next.text.trim())
                .filter(|next| !known.iter().any(|label| next.starts_with(label)))
                .unwrap_or_default()
        } else {
            inline
        };

        return (!value.is_empty()).then(|| value.to_string());
    }
    None
}

fn strip_unit(value: &str, unit: &str) -> String {
    value
        .replace(unit, "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}
