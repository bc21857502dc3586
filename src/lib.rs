//! # Registro - Prometheus-Style Metrics with Shared Storage
//!
//! A Rust library for instrumenting applications with named, typed and
//! labeled metrics (counters, gauges, histograms) whose values live in a
//! pluggable **storage adapter**. Many threads, and many uncoordinated
//! processes, can update the same metric through the same store without
//! losing updates, and any of them can collect a deterministic snapshot for a
//! monitoring scraper.
//!
//! ## The Problem
//!
//! Pre-forking servers, worker pools and short-lived jobs all run as separate
//! processes. A counter kept in process memory only sees its own increments,
//! and a naive "read, add, write back" against shared storage silently loses
//! updates whenever two writers race on the same key.
//!
//! ## The Solution: Atomic Merges
//!
//! Every update is expressed as a single **atomic merge** against the store:
//! "insert the row at 0 if absent, then combine it with the delta". The
//! combinator is either [`Add`](storage::Update::Add) or
//! [`Set`](storage::Update::Set):
//!
//! ```text
//!   process A ──Add(1)──┐
//!   process B ──Add(2)──┼──►  one atomic upsert per call  ──►  value = 3
//!   thread  C ──Add(0)──┘
//! ```
//!
//! N concurrent `Add(dᵢ)` calls have the same effect as one `Add(Σdᵢ)`; the
//! last `Set` to complete wins.
//!
//! ### Histograms
//!
//! An observation touches exactly two rows: it adds 1 to the single bucket it
//! falls into and adds the value to a `sum` pseudo-bucket. Rows hold sparse,
//! non-cumulative deltas; the cumulative `_bucket{le="..."}` series is rebuilt
//! at collection time (see [`buckets`]).
//!
//! ```text
//!   observe(2), observe(13), observe(7.1)   with buckets [0.1, 1, 5, 10]
//!
//!   stored      le=5: 1   le=10: 1   +Inf: 1   sum: 22.1
//!   collected   0.1→0  1→0  5→1  10→2  +Inf→3  _count 3  _sum 22.1
//! ```
//!
//! ## Available Adapters
//!
//! | Adapter | Backing store | Shared across |
//! |---------|---------------|---------------|
//! | [`InMemory`](storage::InMemory) | `dashmap` of cache-padded atomic cells | threads |
//! | [`Sqlite`](storage::Sqlite) | SQLite file (or `:memory:`) | threads and processes |
//!
//! Any type implementing [`Adapter`](storage::Adapter) plugs in; the
//! `testutil` feature exposes `storage::conformance` to check it.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use registro::observers::text::TextObserver;
//! use registro::registry::CollectorRegistry;
//! use registro::storage::InMemory;
//!
//! // One registry per process (or per test), sharing one adapter
//! let registry = CollectorRegistry::new(Arc::new(InMemory::new()));
//!
//! let requests = registry
//!     .register_counter("http", "requests_total", "Handled requests", &["method"])
//!     .unwrap();
//! requests.inc(&["GET"]).unwrap();
//!
//! let latency = registry
//!     .register_histogram("http", "latency_seconds", "Request latency", &[], None)
//!     .unwrap();
//! latency.observe(0.042, &[]).unwrap();
//!
//! // Render everything the store holds
//! let output = TextObserver::new().render(&registry.collect().unwrap());
//! assert!(output.contains("http_requests_total{method=\"GET\"} 1"));
//! ```
//!
//! ## Sharing State Between Processes
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use registro::registry::CollectorRegistry;
//! use registro::storage::Sqlite;
//!
//! // every worker process opens the same file
//! let registry = CollectorRegistry::new(Arc::new(Sqlite::new("/var/run/app/metrics.sqlite")));
//! let jobs = registry.register_counter("worker", "jobs_total", "Finished jobs", &[]).unwrap();
//! jobs.inc(&[]).unwrap();
//! ```
//!
//! ## Observers
//!
//! | Feature | Module | Description |
//! |---------|--------|-------------|
//! | - | [`observers::text`] | Text exposition format for Prometheus scrapes |
//! | - | [`observers::json`] | Serialize snapshots to JSON |
//! | `table` | `observers::table` | Pretty-print samples as ASCII tables |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `sqlite` | yes | The [`Sqlite`](storage::Sqlite) adapter (bundled `rusqlite`) |
//! | `table` | no | The `tabled` observer |
//! | `testutil` | no | The adapter conformance suite |
//! | `full` | no | All of the above |
//!
//! ## Logging
//!
//! The crate logs through [`tracing`]: registrations and adapter start-up at
//! `debug`, individual merges at `trace`, wipes at `info`. No subscriber is
//! installed; that is left to the application.

pub mod buckets;
pub mod error;
pub mod metric;
pub mod metrics;
pub mod observers;
pub mod registry;
pub mod snapshot;
pub mod storage;

pub use error::{Error, Result};
pub use metric::MetricKind;
pub use metrics::{Counter, Gauge, Histogram, Metric};
pub use registry::CollectorRegistry;
pub use snapshot::{MetricFamily, Sample, Snapshot};
pub use storage::{Adapter, AdapterConfig, InMemory};

#[cfg(feature = "sqlite")]
pub use storage::Sqlite;
