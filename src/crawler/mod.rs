//! Crawler module for bounded site traversal
//!
//! This module contains the crawling logic built on the request pipeline:
//! - HTML parsing and link extraction
//! - Per-run crawl state (visited set, frontier, budget)
//! - Overall crawl coordination and result collection

mod coordinator;
mod links;
mod result;
mod state;

pub use coordinator::{CrawlStream, Crawler};
pub use links::{parse_html, same_domain_links, ParsedPage};
pub use result::{CrawlReport, CrawlResult};
pub use state::{CrawlState, CrawlStatus};
