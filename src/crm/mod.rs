//! CRM access: REST client, response cache, offline source and the
//! payload boundary.

pub mod cache;
pub mod client;
pub mod payload;
pub mod source;

pub use cache::{CacheSettings, CachedSource};
pub use client::{ClientConfig, CrmClient};
pub use payload::{parse_deals, parse_pipelines, parse_stages, PayloadError};
pub use source::{CrmError, CrmSource, DealQuery, FileSource};
