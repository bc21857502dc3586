//! Observers turning collected metric families into output formats.
//!
//! Observers only read [`MetricFamily`] values (or a [`Snapshot`](crate::snapshot::Snapshot)),
//! so they work the same whatever adapter produced them:
//!
//! - [`text`] - Text exposition format scraped by Prometheus
//! - [`json`] - Serialize snapshots to JSON
//! - [`table`] - Pretty-print samples as tables using the `tabled` crate
//!
//! # Unified Error Handling
//!
//! Fallible observers return the shared [`ObserverError`], so switching
//! output formats does not change error handling code.
//!
//! # Feature Flags
//!
//! - `table` - Enables the [`table`] module
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use registro::observers::json::JsonObserver;
//! use registro::observers::text::TextObserver;
//! use registro::registry::CollectorRegistry;
//! use registro::storage::InMemory;
//!
//! let registry = CollectorRegistry::new(Arc::new(InMemory::new()));
//! registry
//!     .register_counter("", "jobs_total", "Finished jobs", &[])
//!     .unwrap()
//!     .inc(&[])
//!     .unwrap();
//!
//! let families = registry.collect().unwrap();
//! assert!(TextObserver::new().render(&families).contains("jobs_total 1"));
//!
//! let json = JsonObserver::new().to_json(&families).unwrap();
//! assert!(json.contains("jobs_total"));
//! ```

mod error;

pub use error::{ObserverError, Result};

pub mod json;
pub mod text;

#[cfg(feature = "table")]
pub mod table;

use crate::snapshot::{MetricFamily, Sample};

/// Family labels zipped with the sample's values, followed by its extra labels.
pub(crate) fn sample_labels<'a>(
    family: &'a MetricFamily,
    sample: &'a Sample,
) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
    family
        .label_names
        .iter()
        .zip(&sample.label_values)
        .chain(sample.extra_labels.iter().map(|(k, v)| (k, v)))
        .map(|(k, v)| (k.as_str(), v.as_str()))
}
