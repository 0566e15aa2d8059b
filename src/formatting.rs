// src/formatting.rs

use crate::core::AlertEvent;

/// A trait for formatting a batch of alert events into a single message.
pub trait TextFormatter: Send + Sync {
    fn format_batch(&self, events: &[AlertEvent]) -> String;
}

/// The default formatter for grouped notifications: a "[N alerts grouped]"
/// marker followed by one line per member event, in arrival order.
pub struct SummaryTextFormatter;

impl SummaryTextFormatter {
    fn format_line(&self, event: &AlertEvent) -> String {
        let labels = if event.labels.is_empty() {
            String::new()
        } else {
            let pairs: Vec<String> = event
                .labels
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            format!(" {{{}}}", pairs.join(", "))
        };

        format!(
            "[{}] {}{}: {}",
            event.severity, event.alert_name, labels, event.message
        )
    }
}

impl TextFormatter for SummaryTextFormatter {
    fn format_batch(&self, events: &[AlertEvent]) -> String {
        if events.is_empty() {
            return String::new();
        }
        if events.len() == 1 {
            return events[0].message.clone();
        }

        let lines: Vec<String> = events.iter().map(|event| self.format_line(event)).collect();

        format!("[{} alerts grouped]\n{}", events.len(), lines.join("\n"))
    }
}
