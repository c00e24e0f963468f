pub mod client;
pub mod source;

pub use client::{sha1_hex, BatchReport, DownloadEntry, Downloader, FetchOutcome};
pub use source::{FetchRequest, FetchResponse, HttpSource, RemoteSource};
