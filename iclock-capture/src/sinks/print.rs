use async_trait::async_trait;

use metrics::{counter, histogram};
use tracing::info;

use crate::api::LogEntry;
use crate::sinks::{LogSink, SinkError};

pub struct PrintSink {}

#[async_trait]
impl LogSink for PrintSink {
    async fn send(&self, entry: LogEntry) -> Result<(), SinkError> {
        let span = tracing::span!(tracing::Level::INFO, "device request");
        let _enter = span.enter();

        info!(
            "data received from {} at {} ({} records, {} skipped)",
            entry.client_ip,
            entry.endpoint,
            entry.records.len(),
            entry.skipped.len()
        );
        histogram!("iclock_entry_record_count").record(entry.records.len() as f64);
        counter!("iclock_entries_logged_total").increment(1);

        for record in &entry.records {
            info!("  {record}");
        }
        for skipped in &entry.skipped {
            info!("skipped line {}: {}", skipped.line, skipped.error);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use time::macros::datetime;

    use super::*;
    use crate::api::DeviceHeaders;
    use crate::parser::parse;

    #[tokio::test]
    async fn print_sink_never_fails() {
        let body = "123456\t2024-01-15 09:00:00\t0\t15\t0\nUSER";
        let entry = LogEntry::new(
            datetime!(2024-01-15 09:00:00 UTC),
            "/cdata",
            "10.0.0.7",
            DeviceHeaders::default(),
            HashMap::new(),
        )
        .with_payload(body.to_string(), Vec::new(), parse(body));

        assert!(PrintSink {}.send(entry).await.is_ok());
    }
}
