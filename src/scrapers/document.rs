//! Narrow query capability over a parsed page.
//!
//! The listing parser and link discoverer only ever ask for elements by id,
//! by class, or by selector, so they depend on [`StructuredDocument`] rather
//! than on a markup engine. [`HtmlDocument`] is the adapter for the `scraper`
//! crate.

use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use tracing::debug;

/// Detached snapshot of one element
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    pub tag: String,
    /// Text content with runs of whitespace collapsed
    pub text: String,
    pub attrs: HashMap<String, String>,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }
}

pub trait StructuredDocument {
    /// Element carrying `id`
    fn find_by_id(&self, id: &str) -> Option<Element>;

    /// First `tag` element carrying `class`
    fn find_by_class(&self, tag: &str, class: &str) -> Option<Element>;

    /// Every element matching `selector`, in document order
    fn find_all(&self, selector: &str) -> Vec<Element>;

    /// Every element matching `selector` below the element carrying `scope_id`
    fn find_all_within(&self, scope_id: &str, selector: &str) -> Vec<Element>;
}

pub struct HtmlDocument {
    html: Html,
}

impl HtmlDocument {
    pub fn parse(content: &str) -> Self {
        Self {
            html: Html::parse_document(content),
        }
    }

    fn select(&self, selector: &str) -> Vec<Element> {
        match Selector::parse(selector) {
            Ok(parsed) => self.html.select(&parsed).map(snapshot).collect(),
            Err(e) => {
                debug!("Invalid selector '{}': {}", selector, e);
                Vec::new()
            }
        }
    }
}

impl StructuredDocument for HtmlDocument {
    fn find_by_id(&self, id: &str) -> Option<Element> {
        self.select(&format!("[id=\"{id}\"]")).into_iter().next()
    }

    fn find_by_class(&self, tag: &str, class: &str) -> Option<Element> {
        self.select(&format!("{tag}.{class}")).into_iter().next()
    }

    fn find_all(&self, selector: &str) -> Vec<Element> {
        self.select(selector)
    }

    fn find_all_within(&self, scope_id: &str, selector: &str) -> Vec<Element> {
        self.select(&format!("[id=\"{scope_id}\"] {selector}"))
    }
}

fn snapshot(element: ElementRef<'_>) -> Element {
    let text = element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ");

    Element {
        tag: element.value().name().to_string(),
        text,
        attrs: element
            .value()
            .attrs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <h2>  BMW   320d </h2>
          <table id="details">
            <tr><td class="ads_opt_name">Gads:</td><td class="ads_opt">2015</td></tr>
          </table>
          <div id="pic_div"><img src="//i.ss.com/a.jpg"><img src="/b.jpg"></div>
          <img src="/outside.jpg">
        </body></html>
    "#;

    #[test]
    fn finds_elements_by_id_and_class() {
        let doc = HtmlDocument::parse(PAGE);
        assert_eq!(doc.find_by_id("details").map(|e| e.tag), Some("table".into()));
        assert!(doc.find_by_id("missing").is_none());
        assert!(doc.find_by_class("td", "ads_opt").is_some());
    }

    #[test]
    fn collapses_whitespace_in_text() {
        let doc = HtmlDocument::parse(PAGE);
        let heading = doc.find_all("h2").into_iter().next().unwrap();
        assert_eq!(heading.text, "BMW 320d");
    }

    #[test]
    fn scoped_search_ignores_elements_outside_scope() {
        let doc = HtmlDocument::parse(PAGE);
        let sources: Vec<_> = doc
            .find_all_within("pic_div", "img")
            .iter()
            .filter_map(|img| img.attr("src").map(str::to_string))
            .collect();
        assert_eq!(sources, vec!["//i.ss.com/a.jpg", "/b.jpg"]);
    }

    #[test]
    fn invalid_selector_yields_nothing() {
        let doc = HtmlDocument::parse(PAGE);
        assert!(doc.find_all("td[[").is_empty());
    }
}
