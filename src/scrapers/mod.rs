pub mod discover;
pub mod document;
pub mod fetcher;
pub mod parser;

pub use discover::{Discovery, DiscoveryStop, LinkDiscoverer};
pub use document::{HtmlDocument, StructuredDocument};
pub use fetcher::{PageFetcher, PageKind, Politeness, ReqwestTransport, Transport};
pub use parser::ListingParser;
