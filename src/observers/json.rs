//! JSON observer for serializing snapshots.
//!
//! [`JsonObserver`] serializes collected families (wrapped in a
//! [`Snapshot`]) with serde. The output can be stored to a file, sent over an
//! HTTP API or read back with `serde_json::from_str::<Snapshot>`.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use registro::observers::json::JsonObserver;
//! use registro::registry::CollectorRegistry;
//! use registro::snapshot::Snapshot;
//! use registro::storage::InMemory;
//!
//! let registry = CollectorRegistry::new(Arc::new(InMemory::new()));
//! let g = registry.register_gauge("app", "workers", "Live workers", &[]).unwrap();
//! g.set(4.0, &[]).unwrap();
//!
//! let json = JsonObserver::new().to_json(&registry.collect().unwrap()).unwrap();
//! let back: Snapshot = serde_json::from_str(&json).unwrap();
//! assert_eq!(back.get("app_workers").unwrap().samples[0].value, 4.0);
//! ```

use super::Result;
use crate::registry::CollectorRegistry;
use crate::snapshot::{current_timestamp_ms, MetricFamily, Snapshot};

/// Configuration for the JSON observer.
#[derive(Debug, Clone, Default)]
pub struct JsonConfig {
    /// Whether to pretty-print the JSON output.
    pub pretty: bool,
    /// Whether to stamp the snapshot with the current time.
    pub include_timestamp: bool,
}

/// An observer that serializes metric families to JSON.
///
/// ```rust
/// use registro::observers::json::JsonObserver;
///
/// let observer = JsonObserver::new().pretty(true).include_timestamp(true);
/// let json = observer.to_json(&[]).unwrap();
/// assert!(json.contains("timestamp_ms"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct JsonObserver {
    config: JsonConfig,
}

impl JsonObserver {
    /// Creates a new JSON observer with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new JSON observer with the specified configuration.
    pub fn with_config(config: JsonConfig) -> Self {
        Self { config }
    }

    /// Enables or disables pretty-printing.
    pub fn pretty(mut self, enabled: bool) -> Self {
        self.config.pretty = enabled;
        self
    }

    /// Enables or disables the snapshot timestamp.
    pub fn include_timestamp(mut self, enabled: bool) -> Self {
        self.config.include_timestamp = enabled;
        self
    }

    /// Wraps `families` in a [`Snapshot`], stamped if configured.
    pub fn snapshot(&self, families: &[MetricFamily]) -> Snapshot {
        if self.config.include_timestamp {
            Snapshot::with_timestamp(families.to_vec(), current_timestamp_ms())
        } else {
            Snapshot::new(families.to_vec())
        }
    }

    /// Serializes `families` to a JSON string.
    pub fn to_json(&self, families: &[MetricFamily]) -> Result<String> {
        self.serialize(&self.snapshot(families))
    }

    /// Serializes an existing snapshot as is.
    pub fn serialize(&self, snapshot: &Snapshot) -> Result<String> {
        let json = if self.config.pretty {
            serde_json::to_string_pretty(snapshot)?
        } else {
            serde_json::to_string(snapshot)?
        };
        Ok(json)
    }

    /// Serializes `families` to a JSON byte vector.
    pub fn to_json_bytes(&self, families: &[MetricFamily]) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.snapshot(families))?)
    }

    /// Collects `registry` and serializes the result.
    pub fn render_registry(&self, registry: &CollectorRegistry) -> Result<String> {
        let families = registry.collect()?;
        self.to_json(&families)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::metric::MetricKind;
    use crate::snapshot::Sample;
    use crate::storage::InMemory;

    fn counter() -> MetricFamily {
        MetricFamily {
            name: "requests".into(),
            help: "Total requests".into(),
            kind: MetricKind::Counter,
            label_names: vec!["method".into()],
            buckets: None,
            samples: vec![Sample::new("", vec!["GET".into()], 42.0)],
        }
    }

    #[test]
    fn test_to_json_empty() {
        let json = JsonObserver::new().to_json(&[]).unwrap();
        assert_eq!(json, r#"{"families":[]}"#);
    }

    #[test]
    fn test_to_json_single_family() {
        let json = JsonObserver::new().to_json(&[counter()]).unwrap();
        assert!(json.contains(r#""name":"requests""#));
        assert!(json.contains(r#""kind":"counter""#));
        assert!(json.contains("42"));
        assert!(!json.contains("timestamp_ms"));
    }

    #[test]
    fn test_round_trip() {
        let json = JsonObserver::new().to_json(&[counter()]).unwrap();
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.families, vec![counter()]);
    }

    #[test]
    fn test_pretty_and_timestamp() {
        let json = JsonObserver::new()
            .pretty(true)
            .include_timestamp(true)
            .to_json(&[counter()])
            .unwrap();
        assert!(json.contains('\n'));
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert!(back.timestamp_ms.unwrap() > 0);
    }

    #[test]
    fn test_to_json_bytes() {
        let bytes = JsonObserver::new().to_json_bytes(&[counter()]).unwrap();
        let back: Snapshot = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back.sample_count(), 1);
    }

    #[test]
    fn test_render_registry() {
        let registry = CollectorRegistry::new(Arc::new(InMemory::new()));
        registry
            .register_counter("", "jobs", "Jobs", &[])
            .unwrap()
            .inc_by(3.0, &[])
            .unwrap();
        let json = JsonObserver::new().render_registry(&registry).unwrap();
        assert!(json.contains(r#""name":"jobs""#));
    }

    #[test]
    fn test_config() {
        let observer = JsonObserver::with_config(JsonConfig {
            pretty: true,
            include_timestamp: false,
        });
        assert!(observer.config.pretty);
        assert!(!observer.config.include_timestamp);
    }
}
