//! Weapon data scraping for IMFDB game pages.
//!
//! Pages are reduced to a [`document::Document`], walked by the
//! [`parser::WeaponParser`] (which uses [`extractor::NameExtractor`] for each
//! weapon heading) and optionally reduced by [`dedup::deduplicate`].

pub mod config;
pub mod dedup;
pub mod document;
pub mod export;
pub mod extractor;
pub mod fetcher;
pub mod images;
pub mod models;
pub mod monitoring;
pub mod output;
pub mod parser;
pub mod rate_limiter;
pub mod report;
