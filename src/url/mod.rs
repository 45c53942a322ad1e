//! URL handling module for Outbound
//!
//! This module provides URL normalization and the same-site test the crawler
//! uses to keep a walk inside one domain.

mod domain;
mod normalize;

pub use domain::{extract_domain, same_domain};
pub use normalize::{normalize_parsed, normalize_url};
