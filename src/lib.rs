//! RBN Filter - a Reverse Beacon Network client that enriches, filters and
//! highlights spots.
//!
//! This crate provides:
//! - A fixed-position spot parser, with a nom grammar behind the same trait
//! - A store-first callbook cache with QRZ.com as the remote service
//! - A filter chain over band, mode, speed, zones and grid fields
//! - A renderer that collapses repeats and shows progress for rejected spots
//! - An async telnet client that logs in and reconnects forever
//!
//! # Example
//!
//! ```rust
//! use rbn_filter::{filter::{FilterChain, FilterConfig}, parser::parse_spot, spot::Band};
//!
//! let line = "DX de EA5WU-#:    7018.3  RW1M           CW    19 dB  18 WPM  CQ      2259Z";
//! let spot = parse_spot(line).expect("Failed to parse spot");
//!
//! let chain = FilterChain::new(FilterConfig {
//!     bands: vec![Band::M40],
//!     ..Default::default()
//! })
//! .unwrap();
//! assert!(chain.passes(&spot, None, None));
//! ```

pub mod client;
pub mod config;
pub mod enrich;
pub mod filter;
pub mod geo;
pub mod logging;
pub mod membership;
pub mod parser;
pub mod pipeline;
pub mod qrz;
pub mod render;
pub mod spot;
pub mod station;
pub mod stats;
pub mod store;

pub use client::{FeedClient, FeedConfig, FeedEvent, FeedHandler, Handshake, SessionState};
pub use config::Config;
pub use enrich::EnrichmentCache;
pub use filter::{FilterChain, FilterConfig, Selector, Verdict};
pub use parser::{GrammarParser, ParseError, SpotParser, TokenParser, looks_like_spot, parse_spot};
pub use pipeline::SpotPipeline;
pub use qrz::{CallbookService, LookupOutcome, QrzClient};
pub use spot::{Band, Mode, Spot, SpotType};
pub use station::{Resolution, StationRecord};
pub use stats::{PipelineStats, StatsSummary};
pub use store::{CacheEntry, StationStore};
