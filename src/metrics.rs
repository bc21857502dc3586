//! Typed metric handles.
//!
//! Handles are thin, stateless facades returned by the
//! [`CollectorRegistry`](crate::registry::CollectorRegistry). Each one holds
//! the family [`Descriptor`] and the shared [`Adapter`]; every operation checks
//! the label values against the registered label names and becomes exactly one
//! adapter call. Handles are cheap to clone and can be moved to other threads.
//!
//! | Handle | Operations | Adapter call |
//! |--------|------------|--------------|
//! | [`Counter`] | `inc`, `inc_by`, `reset` | `update_counter` (`Add`, or `Set(0)` for reset) |
//! | [`Gauge`] | `set`, `inc`, `inc_by`, `dec`, `dec_by` | `update_gauge` (`Set` or `Add`) |
//! | [`Histogram`] | `observe` | `update_histogram` |
//!
//! Non-finite values and negative counter increments are rejected with
//! [`Error::InvalidValue`](crate::error::Error::InvalidValue) before reaching
//! the adapter.

pub mod counter;
pub mod gauge;
pub mod histogram;

pub use counter::Counter;
pub use gauge::Gauge;
pub use histogram::Histogram;

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::metric::{Descriptor, MetricKind};
use crate::storage::{Adapter, ScalarUpdate, Update};

/// Read access to the registration data behind a handle.
pub trait Metric {
    /// Returns the family descriptor.
    fn descriptor(&self) -> &Descriptor;

    /// Returns the qualified name.
    fn name(&self) -> &str {
        self.descriptor().qualified_name()
    }

    /// Returns the help text of the first registration.
    fn help(&self) -> &str {
        self.descriptor().help()
    }

    /// Returns the metric kind.
    fn kind(&self) -> MetricKind {
        self.descriptor().kind()
    }

    /// Returns the ordered label names.
    fn label_names(&self) -> &[String] {
        self.descriptor().label_names()
    }
}

/// State shared by all handle types.
#[derive(Clone)]
pub(crate) struct Handle {
    descriptor: Arc<Descriptor>,
    adapter: Arc<dyn Adapter>,
}

impl Handle {
    pub(crate) fn new(descriptor: Arc<Descriptor>, adapter: Arc<dyn Adapter>) -> Self {
        Self {
            descriptor,
            adapter,
        }
    }

    pub(crate) fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub(crate) fn adapter(&self) -> &dyn Adapter {
        self.adapter.as_ref()
    }

    /// Rejects NaN and infinities.
    pub(crate) fn check_finite(&self, value: f64) -> Result<()> {
        if value.is_finite() {
            Ok(())
        } else {
            Err(self.invalid(value))
        }
    }

    pub(crate) fn invalid(&self, value: f64) -> Error {
        Error::InvalidValue {
            name: self.descriptor.qualified_name().to_string(),
            value,
        }
    }

    /// Builds the adapter request for a counter or gauge update.
    pub(crate) fn scalar<'a>(&'a self, label_values: &'a [&'a str], update: Update) -> ScalarUpdate<'a> {
        ScalarUpdate {
            name: self.descriptor.qualified_name(),
            help: self.descriptor.help(),
            label_names: self.descriptor.label_names(),
            label_values,
            update,
        }
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("name", &self.descriptor.qualified_name())
            .field("kind", &self.descriptor.kind())
            .field("label_names", &self.descriptor.label_names())
            .finish()
    }
}
