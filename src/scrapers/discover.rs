use crate::config::{SiteMarkers, SourceConfig};
use crate::error::FetchError;
use crate::scrapers::document::{HtmlDocument, StructuredDocument};
use crate::scrapers::fetcher::{PageFetcher, PageKind};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Why discovery stopped walking index pages
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryStop {
    /// A page produced no detail links
    EmptyPage,
    /// The results container was missing; past the last page
    NoContainer,
    /// Every link on the page was already collected
    RepeatedPage,
    PageCap,
    Cancelled,
    /// Fetching an index page failed after retries
    Failed(FetchError),
}

#[derive(Debug, Clone)]
pub struct Discovery {
    /// Detail-page addresses in discovery order, without duplicates
    pub links: Vec<String>,
    /// Index pages that contributed links
    pub pages: u32,
    pub stop: DiscoveryStop,
}

/// Walks the paginated index of a source, one page per call.
///
/// Restartable: [`LinkDiscoverer::starting_at`] resumes from any page.
pub struct LinkDiscoverer<'a> {
    fetcher: &'a PageFetcher,
    config: &'a SourceConfig,
    page: u32,
    pages_with_links: u32,
    seen: HashSet<String>,
    stop: Option<DiscoveryStop>,
}

impl<'a> LinkDiscoverer<'a> {
    pub fn new(fetcher: &'a PageFetcher, config: &'a SourceConfig) -> Self {
        Self::starting_at(fetcher, config, 1)
    }

    pub fn starting_at(fetcher: &'a PageFetcher, config: &'a SourceConfig, page: u32) -> Self {
        Self {
            fetcher,
            config,
            page: page.max(1),
            pages_with_links: 0,
            seen: HashSet::new(),
            stop: None,
        }
    }

    /// Page that the next call to [`next_page`](Self::next_page) fetches
    pub fn current_page(&self) -> u32 {
        self.page
    }

    /// New links of the next index page, or `None` once discovery has stopped
    pub async fn next_page(&mut self) -> Option<Vec<String>> {
        if self.stop.is_some() {
            return None;
        }
        if let Some(cap) = self.config.max_pages {
            if self.page > cap {
                self.stop = Some(DiscoveryStop::PageCap);
                return None;
            }
        }

        let url = self.config.page_url(self.page);
        debug!(url = %url, page = self.page, "Fetching index page");

        let content = match self.fetcher.fetch(&url, PageKind::Index).await {
            Ok(content) => content,
            Err(e) => {
                warn!(url = %url, "Index page failed, ending discovery: {}", e);
                self.stop = Some(DiscoveryStop::Failed(e));
                return None;
            }
        };

        let Some(links) = links_on_page(&content, &self.config.markers, &self.config.base_url)
        else {
            debug!(page = self.page, "No results container, past the last page");
            self.stop = Some(DiscoveryStop::NoContainer);
            return None;
        };

        if links.is_empty() {
            self.stop = Some(DiscoveryStop::EmptyPage);
            return None;
        }

        let fresh: Vec<String> = links
            .into_iter()
            .filter(|link| self.seen.insert(link.clone()))
            .collect();

        if fresh.is_empty() {
            debug!(page = self.page, "Page repeats known links");
            self.stop = Some(DiscoveryStop::RepeatedPage);
            return None;
        }

        info!(page = self.page, "Found {} listing links", fresh.len());
        self.page += 1;
        self.pages_with_links += 1;
        Some(fresh)
    }

    /// Drain every remaining page
    pub async fn collect(mut self, cancel: &CancellationToken) -> Discovery {
        let mut links = Vec::new();

        loop {
            if cancel.is_cancelled() {
                self.stop = Some(DiscoveryStop::Cancelled);
                break;
            }
            match self.next_page().await {
                Some(page_links) => links.extend(page_links),
                None => break,
            }
        }

        Discovery {
            links,
            pages: self.pages_with_links,
            stop: self.stop.unwrap_or(DiscoveryStop::EmptyPage),
        }
    }
}

/// Detail links of one index page; `None` when the results container is
/// absent
fn links_on_page(content: &str, markers: &SiteMarkers, base_url: &str) -> Option<Vec<String>> {
    let document = HtmlDocument::parse(content);
    extract_links(&document, markers, base_url)
}

pub fn extract_links<D: StructuredDocument>(
    document: &D,
    markers: &SiteMarkers,
    base_url: &str,
) -> Option<Vec<String>> {
    document.find_by_id(&markers.index_container_id)?;

    let base = Url::parse(base_url).ok();
    let mut seen = HashSet::new();
    let links = document
        .find_all_within(&markers.index_container_id, "a[href]")
        .into_iter()
        .filter_map(|anchor| anchor.attr("href").map(str::to_string))
        .filter(|href| href.contains(&markers.detail_path_marker))
        .filter_map(|href| absolutize(base.as_ref(), &href))
        .filter(|link| seen.insert(link.clone()))
        .collect();

    Some(links)
}

fn absolutize(base: Option<&Url>, href: &str) -> Option<String> {
    match Url::parse(href) {
        Ok(url) => Some(url.to_string()),
        Err(_) => base?.join(href).ok().map(|u| u.to_string()),
    }
}
