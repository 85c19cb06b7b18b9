use crate::sink::memory::DEFAULT_MEMORY_SINK_CAPACITY;
use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::PathBuf;

/// Which [`crate::sink::ResultSink`] the service writes lane results to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkKind {
    Memory,
    Jsonl(PathBuf),
}

#[derive(Debug, Clone)]
pub struct CongestionServiceConfig {
    /// Address to bind the HTTP server to
    pub bind_addr: String,

    /// Node ID for this service instance
    pub node_id: String,

    pub sink: SinkKind,

    /// Recent results retained per lane for trend queries
    pub sink_capacity: usize,
}

impl CongestionServiceConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr =
            env::var("CONGESTION_SERVICE_ADDR").unwrap_or_else(|_| "0.0.0.0:8090".to_string());

        let node_id = env::var("NODE_ID").unwrap_or_else(|_| {
            format!(
                "congestion-service-{}",
                hostname::get()
                    .ok()
                    .and_then(|h| h.into_string().ok())
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
            )
        });

        let sink = parse_sink(
            env::var("RESULT_SINK").ok().as_deref(),
            env::var("RESULT_SINK_PATH").ok(),
        )?;

        let sink_capacity = env::var("RESULT_SINK_CAPACITY")
            .ok()
            .map(|s| s.parse::<usize>().context("Invalid RESULT_SINK_CAPACITY"))
            .transpose()?
            .unwrap_or(DEFAULT_MEMORY_SINK_CAPACITY);

        Ok(Self {
            bind_addr,
            node_id,
            sink,
            sink_capacity,
        })
    }
}

fn parse_sink(kind: Option<&str>, path: Option<String>) -> Result<SinkKind> {
    match kind.map(str::to_ascii_lowercase).as_deref() {
        None | Some("") | Some("memory") => Ok(SinkKind::Memory),
        Some("jsonl") => {
            let path = path.ok_or_else(|| anyhow!("RESULT_SINK=jsonl requires RESULT_SINK_PATH"))?;
            Ok(SinkKind::Jsonl(PathBuf::from(path)))
        }
        Some(other) => Err(anyhow!("Unknown RESULT_SINK '{}' (expected memory or jsonl)", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sink() {
        assert_eq!(parse_sink(None, None).unwrap(), SinkKind::Memory);
        assert_eq!(parse_sink(Some("Memory"), None).unwrap(), SinkKind::Memory);
        assert_eq!(
            parse_sink(Some("jsonl"), Some("/tmp/lanes.jsonl".to_string())).unwrap(),
            SinkKind::Jsonl(PathBuf::from("/tmp/lanes.jsonl"))
        );
        assert!(parse_sink(Some("jsonl"), None).is_err());
        assert!(parse_sink(Some("kafka"), None).is_err());
    }
}
