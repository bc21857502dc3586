//! Monotonic counter handle.

use tracing::trace;

use super::{Handle, Metric};
use crate::error::Result;
use crate::metric::Descriptor;
use crate::storage::Update;

/// A counter: only goes up, until it is explicitly reset.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use registro::registry::CollectorRegistry;
/// use registro::storage::InMemory;
///
/// let registry = CollectorRegistry::new(Arc::new(InMemory::new()));
/// let requests = registry
///     .register_counter("http", "requests_total", "Handled requests", &["method"])
///     .unwrap();
///
/// requests.inc(&["GET"]).unwrap();
/// requests.inc_by(2.0, &["GET"]).unwrap();
///
/// let families = registry.collect().unwrap();
/// assert_eq!(families[0].samples[0].value, 3.0);
/// ```
#[derive(Debug, Clone)]
pub struct Counter {
    handle: Handle,
}

impl Counter {
    pub(crate) fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Adds 1 to the series identified by `label_values`.
    pub fn inc(&self, label_values: &[&str]) -> Result<()> {
        self.inc_by(1.0, label_values)
    }

    /// Adds `value` to the series identified by `label_values`.
    ///
    /// `value` must be finite and not negative.
    pub fn inc_by(&self, value: f64, label_values: &[&str]) -> Result<()> {
        self.handle.descriptor().check_arity(label_values)?;
        self.handle.check_finite(value)?;
        if value < 0.0 {
            return Err(self.handle.invalid(value));
        }
        trace!(name = self.name(), value, "counter increment");
        self.handle
            .adapter()
            .update_counter(&self.handle.scalar(label_values, Update::Add(value)))
    }

    /// Sets the series back to zero.
    pub fn reset(&self, label_values: &[&str]) -> Result<()> {
        self.handle.descriptor().check_arity(label_values)?;
        self.handle
            .adapter()
            .update_counter(&self.handle.scalar(label_values, Update::Set(0.0)))
    }
}

impl Metric for Counter {
    fn descriptor(&self) -> &Descriptor {
        self.handle.descriptor()
    }
}
