//! Append-only structured log for generation runs.
//!
//! One compact JSON object per line in `events.jsonl`. Every line carries
//! `event`, `job_id` and `at`; caller fields are merged after the defaults
//! and may shadow them.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

#[derive(Debug, Clone)]
pub struct RunLog {
    inner: Arc<RunLogInner>,
}

#[derive(Debug)]
struct RunLogInner {
    path: PathBuf,
    job_id: String,
    lock: Mutex<()>,
}

impl RunLog {
    pub fn new(path: impl Into<PathBuf>, job_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RunLogInner {
                path: path.into(),
                job_id: job_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn job_id(&self) -> &str {
        &self.inner.job_id
    }

    /// Append one event line. Returns the full object that was written.
    pub fn emit(&self, event: &str, fields: &[(&str, Value)]) -> anyhow::Result<Value> {
        let mut line = Map::new();
        line.insert("event".to_string(), Value::String(event.to_string()));
        line.insert(
            "job_id".to_string(),
            Value::String(self.inner.job_id.clone()),
        );
        line.insert(
            "at".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        for (key, value) in fields {
            line.insert((*key).to_string(), value.clone());
        }

        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let rendered = serde_json::to_string(&line)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("run log lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(rendered.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(Value::Object(line))
    }

    /// Shorthand for an event with no extra fields.
    pub fn record(&self, event: &str) -> anyhow::Result<Value> {
        self.emit(event, &[])
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use serde_json::{json, Value};

    use super::RunLog;

    #[test]
    fn emit_appends_one_object_per_line() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let log = RunLog::new(&path, "job-7");

        log.emit("pack_started", &[("styles", json!(5))])?;
        log.record("pack_finished")?;

        let content = std::fs::read_to_string(&path)?;
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: Value = serde_json::from_str(lines[0])?;
        assert_eq!(first["event"], json!("pack_started"));
        assert_eq!(first["job_id"], json!("job-7"));
        assert_eq!(first["styles"], json!(5));
        DateTime::parse_from_rfc3339(first["at"].as_str().unwrap_or(""))?;

        let second: Value = serde_json::from_str(lines[1])?;
        assert_eq!(second["event"], json!("pack_finished"));
        Ok(())
    }

    #[test]
    fn caller_fields_shadow_defaults() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let log = RunLog::new(temp.path().join("events.jsonl"), "job-7");
        let written = log.emit("x", &[("job_id", json!("override"))])?;
        assert_eq!(written["job_id"], json!("override"));
        Ok(())
    }

    #[test]
    fn emit_creates_missing_parent_directories() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested/run/events.jsonl");
        let log = RunLog::new(&path, "job-7");
        log.record("started")?;
        assert!(path.exists());
        Ok(())
    }
}
