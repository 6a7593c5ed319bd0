//! 📊 summary.rs: "Did it land?" The question every shipper asks, answered with a table.
//!
//! 🚀 While shipping: an indicatif bar tracks bytes read, with a live tally in the message.
//! After shipping: a comfy-table summary, so the operator can screenshot it for the postmortem.
//!
//! 🦆 The duck read every row. The duck has notes. The duck is keeping them to itself.

use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::UTF8_FULL};
use indicatif::{ProgressBar, ProgressStyle};
use loglift::DeliveryReport;

/// 🔢 "1000000" → "1,000,000". For the humans in the audience.
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ MM:SS, or HH:MM:SS when the run is long enough to need a snack.
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// 📋 Running totals across every dispatch cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct DeliveryTally {
    pub(crate) batches: u64,
    pub(crate) items: u64,
    pub(crate) delivered: u64,
    pub(crate) failed: u64,
    pub(crate) redirected: u64,
    pub(crate) failover_errors: u64,
    pub(crate) not_accepted: u64,
    pub(crate) deferred_executed: u64,
    pub(crate) deferred_failed: u64,
    pub(crate) lost_receipts: u64,
}

impl DeliveryTally {
    pub(crate) fn record(&mut self, report: &DeliveryReport) {
        self.batches += 1;
        self.items += report.batch_size as u64;
        self.delivered += report.delivered_items() as u64;
        self.failed += report.failed_items as u64;
        self.redirected += report.redirected as u64;
        self.failover_errors += report.failover_errors as u64;
        self.deferred_executed += report.deferred.executed as u64;
        self.deferred_failed += report.deferred.failed as u64;
    }

    pub(crate) fn record_not_accepted(&mut self) {
        self.not_accepted += 1;
    }

    /// 💀 The completion task vanished without a report. Should never happen. Counted anyway.
    pub(crate) fn record_lost_receipt(&mut self) {
        self.lost_receipts += 1;
    }

    /// 🍽️ The end-of-run table.
    pub(crate) fn to_table(&self, elapsed: Duration) -> Table {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["Delivery", ""]);

        let rows: [(&str, String); 10] = [
            ("batches dispatched", format_number(self.batches)),
            ("items read", format_number(self.items)),
            ("items delivered", format_number(self.delivered)),
            ("items failed", format_number(self.failed)),
            ("redirected to failover", format_number(self.redirected)),
            ("refused by failover", format_number(self.failover_errors)),
            ("batches not accepted", format_number(self.not_accepted)),
            (
                "deferred ops (failed)",
                format!(
                    "{} ({})",
                    format_number(self.deferred_executed),
                    format_number(self.deferred_failed)
                ),
            ),
            ("lost receipts", format_number(self.lost_receipts)),
            ("elapsed", format_duration(elapsed)),
        ];
        for (label, value) in rows {
            table.add_row(vec![
                Cell::new(label),
                Cell::new(value).set_alignment(CellAlignment::Right),
            ]);
        }
        table
    }
}

/// 🎨 The live progress bar. Hidden when asked, or when stdout isn't a terminal (indicatif decides).
pub(crate) struct ShippingProgress {
    progress_bar: ProgressBar,
    source_name: String,
    start_time: Instant,
}

impl ShippingProgress {
    /// 🚀 `total_size` of 0 means "unknown" (stdin), which gets a spinner instead of a bar.
    pub(crate) fn new(source_name: String, total_size: u64, hidden: bool) -> Self {
        let progress_bar = if hidden {
            ProgressBar::hidden()
        } else if total_size > 0 {
            let bar = ProgressBar::new(total_size);
            let style = ProgressStyle::default_bar()
                .template("{msg}\n| [{bar:40.cyan/blue}] {bytes}/{total_bytes}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-");
            bar.set_style(style);
            bar
        } else {
            ProgressBar::new_spinner()
        };

        Self {
            progress_bar,
            source_name,
            start_time: Instant::now(),
        }
    }

    pub(crate) fn advance(&self, bytes_read: u64) {
        self.progress_bar.inc(bytes_read);
    }

    pub(crate) fn update(&self, tally: &DeliveryTally) {
        self.progress_bar.set_message(format!(
            "source: {} | {} delivered, {} redirected, {} batches | {}",
            self.source_name,
            format_number(tally.delivered),
            format_number(tally.redirected),
            format_number(tally.batches),
            format_duration(self.start_time.elapsed())
        ));
    }

    pub(crate) fn finish(&self) -> Duration {
        self.progress_bar.finish_and_clear();
        self.start_time.elapsed()
    }
}
