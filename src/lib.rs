//! # redash-mailer
//!
//! Fetch the latest cached results of a saved Redash query and deliver them
//! as CSV email reports, optionally splitting the rows into one email per
//! distinct value of a column.
//!
//! ## Usage
//!
//! ```bash
//! redash-mailer send --query-id 42 --to reports@example.com
//! redash-mailer event --payload event.json
//! ```
//!
//! ## Modules
//!
//! - `config` - Typed configuration record with layered resolution and
//!   aggregate validation
//! - `redash` - Query result fetcher for the Redash results endpoint
//! - `report` - The fetch → normalize → partition → render pipeline
//! - `mail` - MIME composition and SMTP dispatch

pub mod config;
pub mod error;
pub mod mail;
pub mod redash;
pub mod report;

pub use error::{Error, Result};
