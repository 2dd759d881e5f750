use crate::models::Category;
use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const SSCOM_BASE_URL: &str = "https://www.ss.com";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Label strings of the details table, one set per attribute
#[derive(Debug, Clone, Default)]
pub struct AttributeLabels {
    pub year: Vec<String>,
    pub mileage: Vec<String>,
    pub fuel_type: Vec<String>,
    pub rooms: Vec<String>,
    pub area: Vec<String>,
    pub property_type: Vec<String>,
}

/// Markup contract of the scraped site.
///
/// Any change to these markers on the site side breaks extraction; they are
/// kept in one place so a layout change is a config edit.
#[derive(Debug, Clone)]
pub struct SiteMarkers {
    /// Id of the results table on index pages
    pub index_container_id: String,
    /// Path fragment that identifies detail-page anchors
    pub detail_path_marker: String,
    pub title_selector: String,
    pub price_class: String,
    pub location_class: String,
    pub description_id: String,
    pub gallery_id: String,
    pub details_id: String,
    pub labels: AttributeLabels,
}

impl SiteMarkers {
    fn sscom(labels: AttributeLabels) -> Self {
        Self {
            index_container_id: "page_main".to_string(),
            detail_path_marker: "/msg/".to_string(),
            title_selector: "h2".to_string(),
            price_class: "ads_price".to_string(),
            location_class: "ads_city".to_string(),
            description_id: "msg_div_msg".to_string(),
            gallery_id: "pic_div".to_string(),
            details_id: "details".to_string(),
            labels,
        }
    }
}

fn labels(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Everything needed to ingest one source
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub name: String,
    pub category: Category,
    /// Site root; relative links are resolved against it
    pub base_url: String,
    /// First index page. Later pages append `page{N}.html`, or replace a
    /// `{page}` placeholder when the template carries one.
    pub index_url: String,
    /// Vehicle category stored on every listing of this source
    pub car_category: Option<String>,
    pub max_pages: Option<u32>,
    pub markers: SiteMarkers,
}

impl SourceConfig {
    /// Used-car adverts of one brand on ss.com
    pub fn sscom_cars(brand: &str) -> Self {
        let slug = brand.trim().to_lowercase();
        Self {
            name: format!("ss.com cars/{slug}"),
            category: Category::Car,
            base_url: SSCOM_BASE_URL.to_string(),
            index_url: format!("{SSCOM_BASE_URL}/lv/transport/cars/{slug}/"),
            car_category: Some(brand.trim().to_uppercase()),
            max_pages: None,
            markers: SiteMarkers::sscom(AttributeLabels {
                year: labels(&["Gads:", "Izlaiduma gads:"]),
                mileage: labels(&["Nobraukums:", "Nobraukums, km:"]),
                fuel_type: labels(&["Degviela:", "Motors:"]),
                ..AttributeLabels::default()
            }),
        }
    }

    /// Flats for sale in one city on ss.com
    pub fn sscom_flats(city: &str) -> Self {
        let slug = city.trim().to_lowercase();
        Self {
            name: format!("ss.com flats/{slug}"),
            category: Category::RealEstate,
            base_url: SSCOM_BASE_URL.to_string(),
            index_url: format!("{SSCOM_BASE_URL}/lv/real-estate/flats/{slug}/sell/"),
            car_category: None,
            max_pages: None,
            markers: SiteMarkers::sscom(AttributeLabels {
                rooms: labels(&["Istabas:"]),
                area: labels(&["Platība:"]),
                property_type: labels(&["Tips:", "Mājas tips:"]),
                ..AttributeLabels::default()
            }),
        }
    }

    /// Parse a `cars:<brand>` or `flats:<city>` preset
    pub fn from_preset(preset: &str) -> Result<Self> {
        let (kind, value) = preset
            .split_once(':')
            .with_context(|| format!("Source preset '{preset}' is not of the form kind:value"))?;
        let value = value.trim();
        if value.is_empty() {
            bail!("Source preset '{preset}' has no value");
        }

        match kind.trim() {
            "cars" => Ok(Self::sscom_cars(value)),
            "flats" => Ok(Self::sscom_flats(value)),
            other => bail!("Unknown source kind '{other}', expected cars or flats"),
        }
    }

    pub fn with_max_pages(mut self, max_pages: Option<u32>) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Address of index page `page` (1-based)
    pub fn page_url(&self, page: u32) -> String {
        if self.index_url.contains("{page}") {
            return self.index_url.replace("{page}", &page.to_string());
        }
        if page <= 1 {
            self.index_url.clone()
        } else {
            format!("{}page{}.html", self.index_url, page)
        }
    }
}

/// Network behaviour of the page fetcher
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Politeness interval before index-page requests
    pub index_delay: Duration,
    /// Politeness interval before detail-page requests
    pub detail_delay: Duration,
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            index_delay: Duration::from_millis(1000),
            detail_delay: Duration::from_millis(500),
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub database_path: PathBuf,
    /// Upper bound on sources ingested in parallel
    pub worker_limit: usize,
    pub fetch: FetchConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("listings.sqlite3"),
            worker_limit: 2,
            fetch: FetchConfig::default(),
        }
    }
}

impl IngestConfig {
    /// Build from `INGEST_*` variables (after loading `.env`), defaulting
    /// anything unset
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("INGEST_DATABASE") {
            config.database_path = PathBuf::from(path);
        }
        if let Some(workers) = parse_var::<usize, _>(&lookup, "INGEST_WORKERS")? {
            config.worker_limit = workers.max(1);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "INGEST_INDEX_DELAY_MS")? {
            config.fetch.index_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "INGEST_DETAIL_DELAY_MS")? {
            config.fetch.detail_delay = Duration::from_millis(ms);
        }
        if let Some(attempts) = parse_var::<u32, _>(&lookup, "INGEST_MAX_ATTEMPTS")? {
            config.fetch.max_attempts = attempts.max(1);
        }

        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("Invalid value for {key}: '{raw}'")),
        None => Ok(None),
    }
}
