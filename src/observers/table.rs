//! Table observer for pretty-printing samples.
//!
//! [`TableObserver`] flattens collected families into one row per sample and
//! renders them with the `tabled` crate. Handy for CLIs and debug dumps.
//!
//! # Feature Flag
//!
//! This module requires the `table` feature:
//!
//! ```toml
//! [dependencies]
//! registro = { version = "0.1", features = ["table"] }
//! ```
//!
//! # Examples
//!
//! ```rust,ignore
//! use registro::observers::table::{TableObserver, TableStyle};
//!
//! let families = registry.collect()?;
//! println!("{}", TableObserver::new().with_style(TableStyle::Rounded).render(&families));
//! // ╭────────────────┬───────────┬────────────┬───────╮
//! // │ Name           │ Kind      │ Labels     │ Value │
//! // ├────────────────┼───────────┼────────────┼───────┤
//! // │ requests_total │ counter   │ method=GET │ 3     │
//! // │ latency_bucket │ histogram │ le=0.1     │ 1     │
//! // ╰────────────────┴───────────┴────────────┴───────╯
//! ```

use tabled::{settings::Style, Table, Tabled};

use super::sample_labels;
use crate::buckets::format_value;
use crate::snapshot::MetricFamily;

/// Available table styles for rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TableStyle {
    /// ASCII table with simple characters: +, -, |
    Ascii,
    /// Modern rounded corners (default)
    #[default]
    Rounded,
    /// Sharp corners with box-drawing characters
    Sharp,
    /// Modern style with clean lines
    Modern,
    /// GitHub-flavored Markdown table
    Markdown,
    /// No borders, just spacing
    Blank,
}

/// Configuration for the table observer.
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// The style to use for rendering.
    pub style: TableStyle,
    /// Whether to show the header row.
    pub show_header: bool,
    /// Custom title printed above the table.
    pub title: Option<String>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            style: TableStyle::default(),
            show_header: true,
            title: None,
        }
    }
}

#[derive(Tabled)]
struct SampleRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Labels")]
    labels: String,
    #[tabled(rename = "Value")]
    value: String,
}

/// An observer that renders metric samples as a formatted table.
#[derive(Debug, Clone, Default)]
pub struct TableObserver {
    config: TableConfig,
}

impl TableObserver {
    /// Creates a new table observer with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new table observer with the specified configuration.
    pub fn with_config(config: TableConfig) -> Self {
        Self { config }
    }

    /// Sets the table style.
    pub fn with_style(mut self, style: TableStyle) -> Self {
        self.config.style = style;
        self
    }

    /// Sets whether to show the header row.
    pub fn with_header(mut self, show: bool) -> Self {
        self.config.show_header = show;
        self
    }

    /// Sets a title printed above the table.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.config.title = Some(title.into());
        self
    }

    fn apply_style(&self, table: &mut Table) {
        match self.config.style {
            TableStyle::Ascii => {
                table.with(Style::ascii());
            }
            TableStyle::Rounded => {
                table.with(Style::rounded());
            }
            TableStyle::Sharp => {
                table.with(Style::sharp());
            }
            TableStyle::Modern => {
                table.with(Style::modern());
            }
            TableStyle::Markdown => {
                table.with(Style::markdown());
            }
            TableStyle::Blank => {
                table.with(Style::blank());
            }
        }
    }

    /// Renders one row per sample of `families`, in order.
    pub fn render(&self, families: &[MetricFamily]) -> String {
        let rows: Vec<SampleRow> = families
            .iter()
            .flat_map(|family| {
                family.samples.iter().map(move |sample| SampleRow {
                    name: format!("{}{}", family.name, sample.suffix),
                    kind: family.kind.to_string(),
                    labels: sample_labels(family, sample)
                        .map(|(k, v)| format!("{k}={v}"))
                        .collect::<Vec<_>>()
                        .join(", "),
                    value: format_value(sample.value),
                })
            })
            .collect();

        let mut table = Table::new(&rows);
        self.apply_style(&mut table);

        if !self.config.show_header {
            table.with(tabled::settings::Remove::row(
                tabled::settings::object::Rows::first(),
            ));
        }

        match &self.config.title {
            Some(title) => format!("{}\n{}", title, table),
            None => table.to_string(),
        }
    }
}
