use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use metrics::counter;
use time::macros::format_description;
use time::Date;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::api::LogEntry;
use crate::sinks::{LogFile, LogSink, LogStore, SinkError};
use crate::time::to_rfc3339;

pub const ENTRY_SEPARATOR: &str = "========================================";

/// Appends every entry to a main log file and to a per-day file under `log_dir`.
pub struct FileSink {
    log_file: PathBuf,
    log_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSink {
    pub fn new(
        log_file: impl Into<PathBuf>,
        log_dir: impl Into<PathBuf>,
    ) -> anyhow::Result<FileSink> {
        let log_dir = log_dir.into();
        std::fs::create_dir_all(&log_dir)?;

        Ok(FileSink {
            log_file: log_file.into(),
            log_dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn daily_file(&self, date: Date) -> PathBuf {
        let day = date
            .format(format_description!("[year]-[month]-[day]"))
            .unwrap_or_else(|_| date.to_string());
        self.log_dir.join(format!("attendance_{day}.txt"))
    }

    fn path(&self, file: LogFile) -> PathBuf {
        match file {
            LogFile::Main => self.log_file.clone(),
            LogFile::Daily(date) => self.daily_file(date),
        }
    }
}

async fn append(path: &Path, block: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(block.as_bytes()).await?;
    file.flush().await
}

/// Renders an entry as a text block with one `Key: Value` per line.
/// Multi-line values are written as JSON so each key stays on a single line.
pub fn render(entry: &LogEntry) -> Result<String, SinkError> {
    let unknown = || "Unknown".to_string();

    let mut block = String::new();
    block.push('\n');
    block.push_str(ENTRY_SEPARATOR);
    block.push('\n');
    block.push_str(&format!("Timestamp: {}\n", to_rfc3339(entry.timestamp)));
    block.push_str(&format!("Endpoint: {}\n", entry.endpoint));
    block.push_str(&format!("Client IP: {}\n", entry.client_ip));
    block.push_str(&format!(
        "Device User-Agent: {}\n",
        entry.headers.user_agent.clone().unwrap_or_else(unknown)
    ));
    block.push_str(&format!(
        "Content-Type: {}\n",
        entry.headers.content_type.clone().unwrap_or_else(unknown)
    ));
    block.push_str(&format!(
        "Content-Length: {}\n",
        entry.headers.content_length.clone().unwrap_or_else(unknown)
    ));
    block.push_str(&format!(
        "Raw Body: {}\n",
        serde_json::to_string(&entry.raw_body)?
    ));
    if !entry.form.is_empty() {
        block.push_str(&format!(
            "Form Data: {}\n",
            serde_json::to_string(&entry.form)?
        ));
    }
    if let Some(grammar) = entry.grammar {
        block.push_str(&format!("Grammar: {}\n", serde_json::to_string(&grammar)?));
    }
    block.push_str(&format!(
        "Parsed Data: {}\n",
        serde_json::to_string(&entry.records)?
    ));
    if !entry.skipped.is_empty() {
        block.push_str(&format!(
            "Skipped Lines: {}\n",
            serde_json::to_string(&entry.skipped)?
        ));
    }
    block.push_str(&format!(
        "Query Parameters: {}\n",
        serde_json::to_string(&entry.query)?
    ));
    block.push_str(ENTRY_SEPARATOR);
    block.push_str("\n\n");

    Ok(block)
}

/// Splits a log file back into entries, one map of `Key: Value` lines each.
pub fn parse_entries(contents: &str) -> Vec<BTreeMap<String, String>> {
    contents
        .split(ENTRY_SEPARATOR)
        .filter(|block| !block.trim().is_empty())
        .map(|block| {
            block
                .lines()
                .filter_map(|line| line.split_once(':'))
                .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
                .collect()
        })
        .collect()
}

#[async_trait]
impl LogSink for FileSink {
    async fn send(&self, entry: LogEntry) -> Result<(), SinkError> {
        let block = render(&entry)?;
        let daily = self.daily_file(entry.timestamp.date());

        let _guard = self.write_lock.lock().await;
        append(&self.log_file, &block).await?;
        append(&daily, &block).await?;

        counter!("iclock_entries_logged_total").increment(1);
        Ok(())
    }
}

#[async_trait]
impl LogStore for FileSink {
    async fn read(&self, file: LogFile) -> Result<Option<String>, SinkError> {
        match tokio::fs::read_to_string(self.path(file)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn clear(&self) -> Result<(), SinkError> {
        let _guard = self.write_lock.lock().await;
        tokio::fs::write(&self.log_file, "").await?;
        Ok(())
    }

    fn location(&self) -> String {
        self.log_file.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use time::macros::{date, datetime};

    use super::*;
    use crate::api::DeviceHeaders;
    use crate::parser::parse;

    fn entry(endpoint: &str, body: &str) -> LogEntry {
        LogEntry::new(
            datetime!(2024-01-15 09:00:00 UTC),
            endpoint,
            "10.0.0.7",
            DeviceHeaders {
                user_agent: Some("iClock Proxy/1.09".to_string()),
                content_type: None,
                content_length: Some(body.len().to_string()),
            },
            HashMap::from([("SN".to_string(), "K90PRO001".to_string())]),
        )
        .with_payload(body.to_string(), Vec::new(), parse(body))
    }

    #[test]
    fn renders_one_key_per_line() {
        let block = render(&entry("/cdata", "USER PIN=7\tName=Alice\n1\t2")).unwrap();

        assert!(block.contains("Timestamp: 2024-01-15T09:00:00Z\n"));
        assert!(block.contains("Endpoint: /cdata\n"));
        assert!(block.contains("Content-Type: Unknown\n"));
        assert!(block.contains("Raw Body: \"USER PIN=7\\tName=Alice\\n1\\t2\"\n"));
        assert!(block.contains("Skipped Lines: "));
        assert!(block.contains("Query Parameters: {\"SN\":\"K90PRO001\"}\n"));
        assert!(block.trim().starts_with(ENTRY_SEPARATOR));
        assert!(block.trim().ends_with(ENTRY_SEPARATOR));
    }

    #[test]
    fn parses_rendered_entries_back() {
        let mut contents =
            render(&entry("/cdata", "1\t2024-01-15 09:00:00\t0\t15\t0")).unwrap();
        contents.push_str(&render(&entry("/cdata.php", "")).unwrap());

        let entries = parse_entries(&contents);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["Endpoint"], "/cdata");
        assert_eq!(entries[0]["Timestamp"], "2024-01-15T09:00:00Z");
        assert_eq!(entries[0]["Client IP"], "10.0.0.7");
        assert!(entries[0]["Parsed Data"].contains("\"user_pin\":\"1\""));
        assert_eq!(entries[1]["Endpoint"], "/cdata.php");
        assert_eq!(entries[1]["Parsed Data"], "[]");
    }

    #[test]
    fn daily_file_name_uses_date() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("main.txt"), dir.path().join("logs")).unwrap();

        assert_eq!(
            sink.daily_file(date!(2024 - 01 - 05)),
            dir.path().join("logs").join("attendance_2024-01-05.txt")
        );
    }

    #[tokio::test]
    async fn appends_to_main_and_daily_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("main.txt"), dir.path().join("logs")).unwrap();

        assert_eq!(sink.read(LogFile::Main).await.unwrap(), None);

        sink.send(entry("/cdata", "1\t2024-01-15 09:00:00\t0\t15\t0"))
            .await
            .unwrap();
        sink.send(entry("/cdata.php", "")).await.unwrap();

        let main = sink.read(LogFile::Main).await.unwrap().unwrap();
        let daily = sink
            .read(LogFile::Daily(date!(2024 - 01 - 15)))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(main, daily);
        assert!(main.contains("Endpoint: /cdata\n"));
        assert!(main.contains("Endpoint: /cdata.php\n"));
        assert_eq!(main.matches(ENTRY_SEPARATOR).count(), 4);
    }

    #[tokio::test]
    async fn concurrent_entries_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(
            FileSink::new(dir.path().join("main.txt"), dir.path().join("logs")).unwrap(),
        );

        let mut handles = Vec::new();
        for i in 0..20 {
            let sink = sink.clone();
            handles.push(tokio::spawn(async move {
                let body = format!("{i}\t2024-01-15 09:00:00\t0\t1\t0");
                sink.send(entry(&format!("/cdata/{i}"), &body)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let main = sink.read(LogFile::Main).await.unwrap().unwrap();
        let blocks: Vec<&str> = main
            .split(ENTRY_SEPARATOR)
            .map(str::trim)
            .filter(|block| !block.is_empty())
            .collect();

        assert_eq!(blocks.len(), 20);
        for block in blocks {
            assert_eq!(block.matches("Timestamp: ").count(), 1);
            assert_eq!(block.matches("Query Parameters: ").count(), 1);
        }
    }

    #[tokio::test]
    async fn clear_truncates_main_log() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("main.txt"), dir.path().join("logs")).unwrap();

        sink.send(entry("/cdata", "")).await.unwrap();
        sink.clear().await.unwrap();

        assert_eq!(sink.read(LogFile::Main).await.unwrap(), Some(String::new()));
        // daily files are kept
        assert!(sink
            .read(LogFile::Daily(date!(2024 - 01 - 15)))
            .await
            .unwrap()
            .is_some());
    }
}
