//! Text exposition format.
//!
//! [`TextObserver`] renders collected families the way a Prometheus scraper
//! expects them:
//!
//! ```text
//! # HELP test_some_metric this is for testing
//! # TYPE test_some_metric counter
//! test_some_metric{foo="lalal",bar="lululu"} 3
//! ```
//!
//! Every family gets a `# HELP` and a `# TYPE` line, followed by one line per
//! sample. The label block is omitted when a sample has no labels. Values use
//! the shortest representation that round-trips the `f64`
//! (see [`format_value`]). Lines are separated by `\n` and the output ends
//! with a newline.

use std::fmt::Write as _;

use super::sample_labels;
use crate::buckets::format_value;
use crate::snapshot::{MetricFamily, Sample};

/// MIME type of the rendered output.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Renders metric families in the text exposition format.
///
/// # Examples
///
/// ```rust
/// use registro::metric::MetricKind;
/// use registro::observers::text::TextObserver;
/// use registro::snapshot::{MetricFamily, Sample};
///
/// let family = MetricFamily {
///     name: "some_quick_counter".to_string(),
///     help: "just a quick measurement".to_string(),
///     kind: MetricKind::Counter,
///     label_names: vec![],
///     buckets: None,
///     samples: vec![Sample::new("", vec![], 1.0)],
/// };
///
/// assert_eq!(
///     TextObserver::new().render(&[family]),
///     "# HELP some_quick_counter just a quick measurement\n\
///      ## TYPE some_quick_counter counter\n\
///      some_quick_counter 1\n"
/// );
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TextObserver;

impl TextObserver {
    /// Creates a text observer.
    pub fn new() -> Self {
        Self
    }

    /// Returns the MIME type to serve the output with.
    pub fn content_type(&self) -> &'static str {
        CONTENT_TYPE
    }

    /// Renders `families` in order. An empty slice renders as a lone newline.
    pub fn render(&self, families: &[MetricFamily]) -> String {
        let mut lines = Vec::new();
        for family in families {
            lines.push(format!("# HELP {} {}", family.name, escape_help(&family.help)));
            lines.push(format!("# TYPE {} {}", family.name, family.kind));
            for sample in &family.samples {
                lines.push(render_sample(family, sample));
            }
        }
        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}

fn render_sample(family: &MetricFamily, sample: &Sample) -> String {
    let mut line = format!("{}{}", family.name, sample.suffix);
    let mut labels = sample_labels(family, sample).peekable();
    if labels.peek().is_some() {
        line.push('{');
        for (i, (name, value)) in labels.enumerate() {
            if i > 0 {
                line.push(',');
            }
            let _ = write!(line, "{}=\"{}\"", name, escape_label_value(value));
        }
        line.push('}');
    }
    line.push(' ');
    line.push_str(&format_value(sample.value));
    line
}

/// Escapes `\` and newlines in help text.
fn escape_help(help: &str) -> String {
    help.replace('\\', r"\\").replace('\n', r"\n")
}

/// Escapes `\`, newlines and double quotes in label values.
fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', r"\\")
        .replace('\n', r"\n")
        .replace('"', "\\\"")
}
