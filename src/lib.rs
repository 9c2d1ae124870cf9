//! A Rust client for the JSOC export system.
//!
//! JSOC serves SDO and related solar data through a two-phase export model: a data selection is
//! submitted, the archive stages the matching files asynchronously, and the client polls until
//! the export is ready before downloading. This crate implements that flow:
//! build query blocks, look up records, stage exports, poll, and download concurrently.
//!
//! ## Quick start
//! - Configure a registered notification address via `JSOC_NOTIFY` or a `.jsocrc` file
//!   (supported in the current directory and in your home directory).
//! - Build a [`Query`], call [`Client::query`], then [`Client::get`].
//!
//! ```no_run
//! use jsocapi::{Attr, Client, GetOptions};
//!
//! fn main() -> jsocapi::Result<()> {
//!     let client = Client::from_env()?;
//!     let query = Attr::time("2012/01/01T00:00:00", "2012/01/01T00:00:45")?
//!         & Attr::series("hmi.M_45s");
//!     let mut response = client.query(&query, &[])?;
//!     let results = client.get(&mut response, &GetOptions::default())?;
//!     for path in results.paths() {
//!         println!("{}", path.display());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! The engine pieces ([`export::submit`], [`status::poll`], [`Retrieval`]) are generic over the
//! [`Archive`] and [`Downloader`] traits and can be driven directly.

#![forbid(unsafe_code)]

mod archive;
mod client;
mod config;
mod download;
mod error;
pub mod export;
pub mod helioviewer;
mod http;
mod lookup;
mod orchestrator;
mod query;
mod results;
pub mod status;
pub mod time;
mod util;

pub use archive::{
    Archive, ExportForm, ExportReply, InfoReply, JsocArchive, KeywordColumn, ManifestRecord,
    RecordInfo, StatusReply,
};
pub use client::{Client, ClientConfig, GetOptions, QueryResponse};
pub use download::{DownloadJob, DownloadOutcome, Downloader, HttpDownloader};
pub use error::{Error, Result};
pub use export::{ExportRequest, Submission, SubmissionDiagnostic};
pub use lookup::{MetaDict, RecordTable, lookup, lookup_metadata};
pub use orchestrator::{DEFAULT_POLL_INTERVAL, Retrieval};
pub use query::{Attr, DEFAULT_KEYS, Query, QueryBlock, build_blocks};
pub use results::{FileFact, Results};
pub use status::{FileManifestEntry, RequestStatus};
