use std::sync::{Arc, Weak};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::Engine;

/// Background task that compacts the WAL once enough appends pile up.
/// Exits when the engine is dropped.
pub async fn run_compactor(engine: Weak<Engine>) {
    let Some(every) = engine.upgrade().map(|e| e.config().compact_interval) else {
        return;
    };
    let mut interval = tokio::time::interval(every);
    interval.tick().await;
    loop {
        interval.tick().await;
        let Some(engine) = engine.upgrade() else {
            debug!("engine dropped, compactor exiting");
            return;
        };
        let threshold = engine.config().compact_threshold;
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => info!(appends, "compacted WAL"),
            Err(e) => warn!("WAL compaction failed, will retry: {e}"),
        }
    }
}

/// Start [`run_compactor`] for `engine`.
pub fn spawn(engine: &Arc<Engine>) -> JoinHandle<()> {
    tokio::spawn(run_compactor(Arc::downgrade(engine)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::model::DateRange;
    use crate::notify::NotifyHub;
    use chrono::NaiveDate;
    use std::time::Duration;
    use ulid::Ulid;

    fn test_config(name: &str) -> EngineConfig {
        let dir = std::env::temp_dir().join("stayline_test_compactor").join(name);
        let _ = std::fs::remove_dir_all(&dir);
        EngineConfig {
            data_dir: dir,
            compact_threshold: 3,
            compact_interval: Duration::from_millis(20),
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn compacts_after_threshold() {
        let engine = Arc::new(Engine::new(test_config("threshold"), Arc::new(NotifyHub::new())).unwrap());
        let lid = Ulid::new();
        let owner = Ulid::new();
        engine.register_listing(lid, owner, 10_000, 2).await.unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        for day in [1, 5, 9] {
            let start = NaiveDate::from_ymd_opt(2024, 2, day).unwrap();
            let end = NaiveDate::from_ymd_opt(2024, 2, day + 2).unwrap();
            engine
                .admit_on(lid, DateRange::new(start, end).unwrap(), Ulid::new(), today)
                .await
                .unwrap();
        }
        assert!(engine.wal_appends_since_compact().await >= 3);

        let handle = spawn(&engine);
        let mut compacted = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if engine.wal_appends_since_compact().await == 0 {
                compacted = true;
                break;
            }
        }
        assert!(compacted, "compactor never ran");

        drop(engine);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("compactor should exit once the engine is gone")
            .unwrap();
    }
}
