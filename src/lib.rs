#![forbid(unsafe_code)]

//! Catalog tooling for the cinma streaming site: TMDB ingestion, tagging,
//! account administration, backups, migrations and the HTTP API.

pub mod access;
pub mod admin;
pub mod backup;
pub mod catalog;
pub mod config;
pub mod dedup;
pub mod embed;
pub mod engine;
pub mod linkcheck;
pub mod logging;
pub mod migration;
pub mod security;
pub mod server;
pub mod sitemap;
pub mod sources;
pub mod store;
pub mod supabase;
pub mod tagger;
pub mod tmdb;
