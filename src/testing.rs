//! Test doubles shared by the unit tests.

use crate::config::{FetchConfig, SourceConfig};
use crate::error::FetchError;
use crate::scrapers::fetcher::Transport;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// In-memory transport serving scripted responses per URL.
///
/// Responses queue up per URL; the last one keeps being served once the
/// queue is down to it. Unknown URLs answer 404.
#[derive(Default)]
pub struct FakeTransport {
    responses: Mutex<HashMap<String, VecDeque<Result<String, FetchError>>>>,
    calls: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_page(&self, url: &str, body: impl Into<String>) {
        self.push(url, Ok(body.into()));
    }

    pub fn push_status(&self, url: &str, code: u16) {
        self.push(
            url,
            Err(FetchError::HttpStatus {
                code,
                url: url.to_string(),
            }),
        );
    }

    pub fn push_error(&self, url: &str, error: FetchError) {
        self.push(url, Err(error));
    }

    fn push(&self, url: &str, response: Result<String, FetchError>) {
        self.responses
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn get(&self, url: &str) -> Result<String, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());

        let mut responses = self.responses.lock().unwrap();
        match responses.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => Err(FetchError::HttpStatus {
                code: 404,
                url: url.to_string(),
            }),
        }
    }
}

/// Fetch settings with short delays; tests run on a paused clock anyway
pub fn test_fetch_config() -> FetchConfig {
    FetchConfig {
        index_delay: Duration::from_millis(100),
        detail_delay: Duration::from_millis(50),
        max_attempts: 2,
        base_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(40),
        ..FetchConfig::default()
    }
}

/// Car source whose index lives under `https://www.ss.com/lv/transport/cars/bmw/`
pub fn test_source() -> SourceConfig {
    SourceConfig::sscom_cars("bmw")
}

/// Index page in the ss.com layout linking to `hrefs`
pub fn index_page(hrefs: &[&str]) -> String {
    let rows: String = hrefs
        .iter()
        .map(|href| format!(r#"<tr><td><a href="{href}">advert</a></td></tr>"#))
        .collect();
    format!(
        r#"<html><body><table id="page_main"><tr><th>header</th></tr>{rows}</table></body></html>"#
    )
}

/// Index page without the results container
pub fn empty_index_page() -> String {
    "<html><body><p>Nav sludinājumu</p></body></html>".to_string()
}

/// Car detail page in the ss.com layout
pub fn car_page(title: &str, price: &str, year: &str) -> String {
    format!(
        r#"<html><body>
        <h2>{title}</h2>
        <div id="msg_div_msg">Well kept, one owner.</div>
        <table id="details">
          <tr><td class="ads_opt_name">Gads:</td><td class="ads_opt">{year}</td></tr>
          <tr><td class="ads_opt_name">Nobraukums:</td><td class="ads_opt">185 000 km</td></tr>
          <tr><td class="ads_opt_name">Degviela:</td><td class="ads_opt">Dīzelis</td></tr>
        </table>
        <div id="pic_div"><img src="//i.ss.com/gallery/1.jpg"><img src="/gallery/2.jpg"></div>
        <table><tr>
          <td class="ads_price">{price}</td>
          <td class="ads_city">Rīga</td>
        </tr></table>
        </body></html>"#
    )
}

/// Something the site serves instead of an advert
pub fn error_page() -> String {
    "<html><body><p>Service temporarily unavailable</p></body></html>".to_string()
}
