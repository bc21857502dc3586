//! The collector registry.
//!
//! [`CollectorRegistry`] creates (or fetches) metric handles by identity and
//! collects every family persisted by its adapter. It holds no metric values:
//! two registries built on adapters pointing at the same store (for example
//! two processes opening one SQLite file) see the same data.
//!
//! # Identity rules
//!
//! Registrations are keyed by qualified name, kind and label arity:
//!
//! | Re-registration | Result |
//! |-----------------|--------|
//! | same kind, same label names (and buckets) | the existing handle, first help text kept |
//! | same kind, different label count | a separate family |
//! | same kind, same count, different label names | [`Error::IdentityConflict`] |
//! | same label names, different buckets | [`Error::IdentityConflict`] |
//! | different kind | [`Error::IdentityConflict`] |
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use registro::observers::text::TextObserver;
//! use registro::registry::CollectorRegistry;
//! use registro::storage::InMemory;
//!
//! let registry = CollectorRegistry::new(Arc::new(InMemory::new()));
//! let counter = registry
//!     .register_counter("test", "some_metric", "this is for testing", &["foo", "bar"])
//!     .unwrap();
//! counter.inc_by(2.0, &["lalal", "lululu"]).unwrap();
//! registry
//!     .get_counter("test", "some_metric", &["foo", "bar"])
//!     .unwrap()
//!     .inc(&["lalal", "lululu"])
//!     .unwrap();
//!
//! assert_eq!(
//!     TextObserver::new().render(&registry.collect().unwrap()),
//!     "# HELP test_some_metric this is for testing\n\
//!      ## TYPE test_some_metric counter\n\
//!      test_some_metric{foo=\"lalal\",bar=\"lululu\"} 3\n"
//! );
//! ```

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::buckets;
use crate::error::{Error, Result};
use crate::metric::{self, Descriptor, MetricIdentity, MetricKind};
use crate::metrics::{Counter, Gauge, Handle, Histogram};
use crate::snapshot::{current_timestamp_ms, MetricFamily, Snapshot};
use crate::storage::{Adapter, InMemory};

/// Creates metric handles and collects their families.
///
/// The registry is an explicit value: create as many as needed (one per
/// test, one per subsystem); nothing is process-global.
#[derive(Debug)]
pub struct CollectorRegistry {
    adapter: Arc<dyn Adapter>,
    families: DashMap<String, Vec<Arc<Descriptor>>>,
}

impl Default for CollectorRegistry {
    /// A registry backed by a fresh [`InMemory`] adapter.
    fn default() -> Self {
        Self::new(Arc::new(InMemory::new()))
    }
}

impl CollectorRegistry {
    /// Creates a registry on top of `adapter`.
    pub fn new(adapter: Arc<dyn Adapter>) -> Self {
        Self {
            adapter,
            families: DashMap::new(),
        }
    }

    /// Returns the storage adapter.
    pub fn adapter(&self) -> &Arc<dyn Adapter> {
        &self.adapter
    }

    /// Registers a counter, or returns the existing one with the same label names.
    pub fn register_counter(
        &self,
        namespace: &str,
        name: &str,
        help: &str,
        label_names: &[&str],
    ) -> Result<Counter> {
        let identity = MetricIdentity::new(namespace, name, MetricKind::Counter);
        let handle = self.register(identity, help, label_names, None)?;
        Ok(Counter::new(handle))
    }

    /// Registers a gauge, or returns the existing one with the same label names.
    pub fn register_gauge(
        &self,
        namespace: &str,
        name: &str,
        help: &str,
        label_names: &[&str],
    ) -> Result<Gauge> {
        let identity = MetricIdentity::new(namespace, name, MetricKind::Gauge);
        let handle = self.register(identity, help, label_names, None)?;
        Ok(Gauge::new(handle))
    }

    /// Registers a histogram, or returns the existing one with the same label
    /// names and boundaries.
    ///
    /// `buckets` defaults to [`DEFAULT_BUCKETS`](crate::buckets::DEFAULT_BUCKETS).
    pub fn register_histogram(
        &self,
        namespace: &str,
        name: &str,
        help: &str,
        label_names: &[&str],
        buckets: Option<Vec<f64>>,
    ) -> Result<Histogram> {
        let identity = MetricIdentity::new(namespace, name, MetricKind::Histogram);
        let buckets = buckets.unwrap_or_else(buckets::default_buckets);
        let handle = self.register(identity, help, label_names, Some(buckets))?;
        Ok(Histogram::new(handle))
    }

    /// Looks up a registered counter.
    pub fn get_counter(&self, namespace: &str, name: &str, label_names: &[&str]) -> Result<Counter> {
        let identity = MetricIdentity::new(namespace, name, MetricKind::Counter);
        Ok(Counter::new(self.lookup(&identity, label_names)?))
    }

    /// Looks up a registered gauge.
    pub fn get_gauge(&self, namespace: &str, name: &str, label_names: &[&str]) -> Result<Gauge> {
        let identity = MetricIdentity::new(namespace, name, MetricKind::Gauge);
        Ok(Gauge::new(self.lookup(&identity, label_names)?))
    }

    /// Looks up a registered histogram.
    pub fn get_histogram(
        &self,
        namespace: &str,
        name: &str,
        label_names: &[&str],
    ) -> Result<Histogram> {
        let identity = MetricIdentity::new(namespace, name, MetricKind::Histogram);
        Ok(Histogram::new(self.lookup(&identity, label_names)?))
    }

    /// Returns every family in the store, ordered by qualified name, label
    /// arity, label names and kind.
    pub fn collect(&self) -> Result<Vec<MetricFamily>> {
        let mut families = self.adapter.collect()?;
        families.sort_by(MetricFamily::order);
        Ok(families)
    }

    /// Collects into a [`Snapshot`] stamped with the current time.
    pub fn snapshot(&self) -> Result<Snapshot> {
        Ok(Snapshot::with_timestamp(self.collect()?, current_timestamp_ms()))
    }

    /// Discards every persisted value. Registrations are kept.
    pub fn wipe_storage(&self) -> Result<()> {
        self.adapter.wipe_storage()
    }

    fn register(
        &self,
        identity: MetricIdentity,
        help: &str,
        label_names: &[&str],
        buckets: Option<Vec<f64>>,
    ) -> Result<Handle> {
        let label_names = metric::owned(label_names);
        let qualified = identity.qualified_name();
        metric::validate_names(&qualified, &label_names)?;
        if let Some(bounds) = &buckets {
            buckets::validate(&qualified, bounds, &label_names)?;
        }

        // the entry guard serialises registrations of one name
        let mut entry = self.families.entry(qualified.clone()).or_default();

        if let Some(other) = entry.iter().find(|d| d.kind() != identity.kind()) {
            return Err(Error::IdentityConflict {
                name: qualified,
                reason: format!("kind {}", other.kind()),
            });
        }

        if let Some(existing) = entry
            .iter()
            .find(|d| d.label_names().len() == label_names.len())
        {
            if existing.label_names() != label_names.as_slice() {
                return Err(Error::IdentityConflict {
                    name: qualified,
                    reason: format!("label names {:?}", existing.label_names()),
                });
            }
            if existing.buckets() != buckets.as_deref() {
                return Err(Error::IdentityConflict {
                    name: qualified,
                    reason: format!("buckets {:?}", existing.buckets().unwrap_or_default()),
                });
            }
            return Ok(Handle::new(existing.clone(), self.adapter.clone()));
        }

        let descriptor = Arc::new(Descriptor::new(identity, help, label_names, buckets));
        debug!(
            name = %qualified,
            kind = %descriptor.kind(),
            labels = ?descriptor.label_names(),
            "registered metric"
        );
        entry.push(descriptor.clone());
        Ok(Handle::new(descriptor, self.adapter.clone()))
    }

    fn lookup(&self, identity: &MetricIdentity, label_names: &[&str]) -> Result<Handle> {
        let qualified = identity.qualified_name();
        let not_found = || Error::NotFound {
            name: qualified.clone(),
            kind: identity.kind(),
        };

        let entry = self.families.get(&qualified).ok_or_else(not_found)?;
        let mut same_kind = entry
            .iter()
            .filter(|d| d.kind() == identity.kind())
            .peekable();
        let first_arity = same_kind.peek().ok_or_else(not_found)?.label_names().len();

        let Some(descriptor) = same_kind.find(|d| d.label_names().len() == label_names.len())
        else {
            return Err(Error::ArityMismatch {
                name: qualified.clone(),
                expected: first_arity,
                actual: label_names.len(),
            });
        };

        let matches = descriptor
            .label_names()
            .iter()
            .zip(label_names)
            .all(|(a, b)| a.as_str() == *b);
        if !matches {
            return Err(Error::IdentityConflict {
                name: qualified.clone(),
                reason: format!("label names {:?}", descriptor.label_names()),
            });
        }
        Ok(Handle::new(descriptor.clone(), self.adapter.clone()))
    }
}
