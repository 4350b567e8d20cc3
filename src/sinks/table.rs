//! Table sink for pretty-printing the latest counter values.
//!
//! [`TableSink`] keeps the most recent sample of every counter it receives and
//! renders them as a formatted table using the `tabled` crate.
//!
//! # Feature Flag
//!
//! This module requires the `table` feature:
//!
//! ```toml
//! [dependencies]
//! flussi = { version = "0.1", features = ["table"] }
//! ```
//!
//! # Examples
//!
//! ## Standard format
//!
//! ```rust,ignore
//! use flussi::sinks::table::{TableSink, TableStyle};
//!
//! let sink = TableSink::new().with_style(TableStyle::Rounded);
//! // ... run the pipeline ...
//! println!("{}", sink.render());
//! // ╭────────────────┬───────────┬───────┬──────╮
//! // │ Provider       │ Counter   │ Value │ Unit │
//! // ├────────────────┼───────────┼───────┼──────┤
//! // │ System.Runtime │ CPU Usage │ 12.5  │ %    │
//! // ╰────────────────┴───────────┴───────┴──────╯
//! ```
//!
//! ## Compact format (multiple columns)
//!
//! ```rust,ignore
//! let sink = TableSink::new().compact(true).columns(3);
//! // ╭─────────────────┬──────────────────┬─────────────────╮
//! // │ cpu-usage: 12.5 │ working-set: 120 │ gc-heap-size: 8 │
//! // ╰─────────────────┴──────────────────┴─────────────────╯
//! ```

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tabled::{builder::Builder, settings::Style, Table, Tabled};
use tokio_util::sync::CancellationToken;

use super::{CounterSink, Result};
use crate::sample::CounterSample;

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

/// Configuration for the table sink.
#[derive(Debug, Clone)]
pub struct TableConfig {
    pub style: TableStyle,
    /// Whether to show the header row (only in non-compact mode).
    pub show_header: bool,
    pub title: Option<String>,
    /// Whether to use compact format (name: value in cells).
    pub compact: bool,
    /// Number of columns in compact mode.
    pub columns: usize,
    /// Show display names instead of counter names.
    pub display_names: bool,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            style: TableStyle::default(),
            show_header: true,
            title: None,
            compact: false,
            columns: 1,
            display_names: true,
        }
    }
}

#[derive(Tabled)]
struct SampleRow {
    #[tabled(rename = "Provider")]
    provider: String,
    #[tabled(rename = "Counter")]
    counter: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Unit")]
    unit: String,
}

/// A sink that renders the latest value of every counter as a table.
#[derive(Debug, Default)]
pub struct TableSink {
    config: TableConfig,
    latest: Mutex<BTreeMap<(String, String), CounterSample>>,
}

impl TableSink {
    /// Creates a table sink with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: TableConfig) -> Self {
        Self {
            config,
            latest: Mutex::default(),
        }
    }

    pub fn with_style(mut self, style: TableStyle) -> Self {
        self.config.style = style;
        self
    }

    pub fn with_header(mut self, show: bool) -> Self {
        self.config.show_header = show;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.config.title = Some(title.into());
        self
    }

    /// Enables or disables compact mode.
    pub fn compact(mut self, enabled: bool) -> Self {
        self.config.compact = enabled;
        self
    }

    /// Sets the number of columns in compact mode. Values less than 1 are treated as 1.
    pub fn columns(mut self, count: usize) -> Self {
        self.config.columns = count.max(1);
        self
    }

    /// Uses counter names instead of display names.
    pub fn raw_names(mut self) -> Self {
        self.config.display_names = false;
        self
    }

    /// The latest sample of every counter, ordered by provider then counter.
    pub fn snapshot(&self) -> Vec<CounterSample> {
        self.latest.lock().values().cloned().collect()
    }

    /// Renders the latest values. Empty if nothing was logged.
    pub fn render(&self) -> String {
        let samples = self.snapshot();
        if samples.is_empty() {
            return String::new();
        }

        if self.config.compact {
            self.render_compact(&samples)
        } else {
            self.render_standard(&samples)
        }
    }

    fn label<'a>(&self, sample: &'a CounterSample) -> &'a str {
        if self.config.display_names {
            &sample.display_name
        } else {
            &sample.name
        }
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

    fn titled(&self, table: Table) -> String {
        match &self.config.title {
            Some(title) => format!("{}\n{}", title, table),
            None => table.to_string(),
        }
    }

    fn render_standard(&self, samples: &[CounterSample]) -> String {
        let rows: Vec<SampleRow> = samples
            .iter()
            .map(|s| SampleRow {
                provider: s.provider.clone(),
                counter: self.label(s).to_string(),
                value: s.value.to_string(),
                unit: s.unit.clone(),
            })
            .collect();

        let mut table = Table::new(&rows);
        self.apply_style(&mut table);

        if !self.config.show_header {
            table.with(tabled::settings::Remove::row(
                tabled::settings::object::Rows::first(),
            ));
        }

        self.titled(table)
    }

    fn render_compact(&self, samples: &[CounterSample]) -> String {
        let cells: Vec<String> = samples
            .iter()
            .map(|s| format!("{}: {}", self.label(s), s.value))
            .collect();

        let cols = self.config.columns;
        let mut builder = Builder::default();
        for chunk in cells.chunks(cols) {
            let mut row = chunk.to_vec();
            row.resize(cols, String::new());
            builder.push_record(row);
        }

        let mut table = builder.build();
        self.apply_style(&mut table);
        self.titled(table)
    }
}

#[async_trait]
impl CounterSink for TableSink {
    /// Forgets values from a previous run.
    async fn pipeline_started(&self, _token: CancellationToken) -> Result<()> {
        self.latest.lock().clear();
        Ok(())
    }

    fn log(&self, sample: &CounterSample) -> Result<()> {
        self.latest.lock().insert(
            (sample.provider.clone(), sample.name.clone()),
            sample.clone(),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{SampleValue, SessionId};

    fn sample(provider: &str, name: &str, value: f64) -> CounterSample {
        CounterSample::new(provider, name, SampleValue::Metric(value), SessionId::new("s"))
            .with_display_name(format!("{} (display)", name))
            .with_unit("ms")
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(TableSink::new().render(), "");
    }

    #[test]
    fn test_keeps_latest_value() {
        let sink = TableSink::new();
        sink.log(&sample("P", "a", 1.0)).unwrap();
        sink.log(&sample("P", "a", 2.0)).unwrap();
        sink.log(&sample("P", "b", 3.0)).unwrap();

        let snapshot = sink.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].value, SampleValue::Metric(2.0));
        assert_eq!(snapshot[1].name, "b");
    }

    #[test]
    fn test_render_standard() {
        let sink = TableSink::new().with_style(TableStyle::Ascii);
        sink.log(&sample("System.Runtime", "cpu-usage", 12.5)).unwrap();

        let output = sink.render();
        assert!(output.contains("Provider"));
        assert!(output.contains("System.Runtime"));
        assert!(output.contains("cpu-usage (display)"));
        assert!(output.contains("12.5"));
        assert!(output.contains("ms"));
        assert!(output.contains('+'));
    }

    #[test]
    fn test_render_raw_names_without_header() {
        let sink = TableSink::new().raw_names().with_header(false);
        sink.log(&sample("P", "cpu-usage", 1.0)).unwrap();

        let output = sink.render();
        assert!(!output.contains("Provider"));
        assert!(!output.contains("(display)"));
        assert!(output.contains("cpu-usage"));
    }

    #[test]
    fn test_render_compact_with_title() {
        let sink = TableSink::new()
            .raw_names()
            .compact(true)
            .columns(2)
            .with_title("Counters");
        for (name, v) in [("a", 1.0), ("b", 2.0), ("c", 3.0)] {
            sink.log(&sample("P", name, v)).unwrap();
        }

        let output = sink.render();
        assert!(output.starts_with("Counters\n"));
        assert!(output.contains("a: 1"));
        assert!(output.contains("c: 3"));
        // Three cells in two columns make two rows.
        assert_eq!(output.lines().filter(|l| l.contains(": ")).count(), 2);
    }

    #[tokio::test]
    async fn test_started_clears_previous_run() {
        let sink = TableSink::new();
        sink.log(&sample("P", "a", 1.0)).unwrap();
        sink.pipeline_started(CancellationToken::new()).await.unwrap();
        assert!(sink.snapshot().is_empty());
    }
}
