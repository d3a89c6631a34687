//! URL handling module for lms-archive
//!
//! Portal identifiers live in query strings (`?id=`, `?categoryid=`,
//! `?course=`), so this module is mostly about reading and forcing query
//! parameters and resolving the links found in fetched pages.

mod params;

// Re-export main functions
pub use params::{portal_url, query_param, resolve_link, with_query_param};
