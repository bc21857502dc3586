//! Gauge handle.

use tracing::trace;

use super::{Handle, Metric};
use crate::error::Result;
use crate::metric::Descriptor;
use crate::storage::Update;

/// A value that can be set directly or moved up and down.
///
/// `set` overwrites, everything else adds a (possibly negative) delta, so
/// concurrent `inc`/`dec` calls from several processes never lose updates.
#[derive(Debug, Clone)]
pub struct Gauge {
    handle: Handle,
}

impl Gauge {
    pub(crate) fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Overwrites the series with `value`.
    pub fn set(&self, value: f64, label_values: &[&str]) -> Result<()> {
        self.update(Update::Set(value), label_values)
    }

    /// Adds 1.
    pub fn inc(&self, label_values: &[&str]) -> Result<()> {
        self.inc_by(1.0, label_values)
    }

    /// Adds `value`, which may be negative.
    pub fn inc_by(&self, value: f64, label_values: &[&str]) -> Result<()> {
        self.update(Update::Add(value), label_values)
    }

    /// Subtracts 1.
    pub fn dec(&self, label_values: &[&str]) -> Result<()> {
        self.dec_by(1.0, label_values)
    }

    /// Subtracts `value`.
    pub fn dec_by(&self, value: f64, label_values: &[&str]) -> Result<()> {
        self.update(Update::Add(-value), label_values)
    }

    fn update(&self, update: Update, label_values: &[&str]) -> Result<()> {
        self.handle.descriptor().check_arity(label_values)?;
        self.handle.check_finite(update.value())?;
        trace!(name = self.name(), ?update, "gauge update");
        self.handle
            .adapter()
            .update_gauge(&self.handle.scalar(label_values, update))
    }
}

impl Metric for Gauge {
    fn descriptor(&self) -> &Descriptor {
        self.handle.descriptor()
    }
}
