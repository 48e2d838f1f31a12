//! wildcat: content catalog gateway for a wildlife-media browser.
//!
//! The [`catalog::CatalogGateway`] mediates every read, write, delete and
//! upload between an untrusted front-end and the document and blob stores.

pub mod auth;
pub mod catalog;
pub mod config;
pub mod metadata;
pub mod policy;
pub mod ratelimit;
pub mod store;
pub mod util;
