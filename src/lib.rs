//! Gallery harvest library.
//!
//! Locates a time window (or a target post) inside a live, newest-first,
//! paginated gallery listing and extracts every post in that window, hopping
//! back through migrated gallery ids when the current one is too new.

#![allow(clippy::needless_raw_string_hashes)]

pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod gallery;
pub mod harvester;
pub mod listing;
pub mod locator;
pub mod wayback;
pub mod web;
