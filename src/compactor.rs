use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::engine::Engine;

/// Background task that rewrites the WAL once enough appends accumulate.
/// Bookings are never deleted, so without compaction the log only grows with
/// churn from lobby joins/leaves and window edits.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            debug!("compactor idle: {appends}/{threshold} appends");
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => info!("compacted WAL after {appends} appends"),
            Err(e) => tracing::warn!("WAL compaction failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::engine::EngineConfig;
    use crate::feed::ChangeFeed;
    use crate::model::TimeRange;
    use chrono::NaiveDate;
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("pitchlock_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn compaction_collapses_lobby_churn() {
        let path = test_wal_path("lobby_churn.wal");
        let engine = Arc::new(
            Engine::new(
                path.clone(),
                Arc::new(ChangeFeed::new()),
                Arc::new(SystemClock),
                EngineConfig::default(),
            )
            .unwrap(),
        );

        let pitch = Ulid::new();
        let owner = Ulid::new();
        engine.register_pitch(pitch, owner, None).await.unwrap();

        let lobby = Ulid::new();
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        engine
            .create_lobby(lobby, Ulid::new(), pitch, date, TimeRange::new(1080, 1200), 2, 4, None)
            .await
            .unwrap();

        // Churn: the same player joins and leaves repeatedly
        let player = Ulid::new();
        for _ in 0..20 {
            engine.join_lobby(lobby, player).await.unwrap();
            engine.leave_lobby(lobby, player).await.unwrap();
        }

        let before = engine.wal_appends_since_compact().await;
        assert!(before >= 42);

        engine.compact_wal().await.unwrap();
        assert_eq!(engine.wal_appends_since_compact().await, 0);

        // Replayed state matches: lobby exists, empty, open
        drop(engine);
        let engine = Engine::new(
            path,
            Arc::new(ChangeFeed::new()),
            Arc::new(SystemClock),
            EngineConfig::default(),
        )
        .unwrap();
        let replayed = engine.get_lobby(lobby).await.unwrap();
        assert_eq!(replayed.player_count(), 0);
        assert_eq!(replayed.status, crate::model::LobbyStatus::Open);
    }
}
