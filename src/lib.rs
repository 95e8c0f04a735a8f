//! # a3s-webext
//!
//! Converts OpenSearch / SearchPlugin XML descriptors into packaged search
//! WebExtensions.
//!
//! Each engine identity (the file-name prefix before the first hyphen) becomes
//! one bundle:
//!
//! - `manifest.json` with a `chrome_settings_overrides.search_provider` block
//! - `_locales/<tag>/messages.json` for every locale variant
//! - an optional `favicon.<ext>`
//!
//! zipped into a single archive.
//!
//! ## Example
//!
//! ```rust,no_run
//! use a3s_webext::Converter;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let converter = Converter::new("searchplugins", "dist");
//!     for report in converter.convert_all().await? {
//!         println!("{}", report);
//!     }
//!     Ok(())
//! }
//! ```

mod error;

pub mod bundle;
pub mod config;
pub mod converter;
pub mod descriptor;
pub mod endpoint;
pub mod icon;
pub mod locale;
pub mod manifest;
pub mod package;

pub use bundle::{compose, DescriptorSource, EngineBundle, MessageCatalog};
pub use config::ConverterConfig;
pub use converter::{Converter, EngineReport, EngineStatus};
pub use descriptor::{parse_descriptor, EndpointDef, IconRef, Method, SearchDescriptor};
pub use endpoint::{resolve_primary, resolve_suggestion, ResolvedUrl};
pub use error::{ConvertError, Result};
pub use icon::{materialize, IconOutcome};
pub use locale::{engine_id, resolve_locale};
