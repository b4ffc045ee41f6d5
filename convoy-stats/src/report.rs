//! Report sink for external dashboard and bot collaborators

use std::path::{Path, PathBuf};

use crate::aggregate::AggregateStats;
use crate::error::StatsResult;

/// Writes each aggregate to a fixed path as JSON. The write goes through a
/// temp file plus rename, so a reader never sees a partial document.
pub struct ReportWriter {
    path: PathBuf,
}

impl ReportWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write(&self, stats: &AggregateStats) -> StatsResult<()> {
        let body = serde_json::to_vec_pretty(stats)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample() -> AggregateStats {
        AggregateStats {
            total_clients: 230,
            workers: Vec::new(),
            generation: 12,
            collected_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn report_round_trips_through_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path().join("stats.json"));

        let stats = sample();
        writer.write(&stats).await.unwrap();

        let body = std::fs::read_to_string(writer.path()).unwrap();
        let parsed: AggregateStats = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed, stats);
    }

    #[tokio::test]
    async fn writes_create_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path().join("reports/latest/stats.json"));

        writer.write(&sample()).await.unwrap();
        assert!(writer.path().exists());
    }

    #[tokio::test]
    async fn rewrites_replace_the_previous_report() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path().join("stats.json"));

        writer.write(&sample()).await.unwrap();
        let mut second = sample();
        second.total_clients = 999;
        writer.write(&second).await.unwrap();

        let body = std::fs::read_to_string(writer.path()).unwrap();
        let parsed: AggregateStats = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed.total_clients, 999);
    }
}
