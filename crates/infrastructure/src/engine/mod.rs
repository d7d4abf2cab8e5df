#[cfg(feature = "rqbit")]
mod close_signal;
pub mod memory;
pub mod piece_book;
#[cfg(feature = "rqbit")]
pub mod rqbit;

pub use memory::{MemoryEngine, MemoryTorrent, PeerConnection, PeerRejection, PeerTransport};
pub use piece_book::PieceBook;
#[cfg(feature = "rqbit")]
pub use rqbit::RqbitEngine;

use domain::{DomainError, EngineConfig, TorrentEngine};
use std::sync::Arc;

/// Creates the swarm engine this build was compiled with.
#[cfg(feature = "rqbit")]
pub async fn create_engine(config: &EngineConfig) -> Result<Arc<dyn TorrentEngine>, DomainError> {
    Ok(Arc::new(RqbitEngine::start(config).await?))
}

/// Creates the swarm engine this build was compiled with. Builds without
/// default features carry no swarm backend.
#[cfg(not(feature = "rqbit"))]
pub async fn create_engine(config: &EngineConfig) -> Result<Arc<dyn TorrentEngine>, DomainError> {
    tracing::debug!(port = config.listen_port, "no swarm backend compiled in");
    Err(DomainError::EngineInit(
        "built without a swarm backend; rebuild with the `rqbit` feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn scratch(dir: &Path) -> EngineConfig {
        EngineConfig {
            listen_port: 0,
            data_dir: dir.to_path_buf(),
            ..EngineConfig::default()
        }
    }

    #[cfg(feature = "rqbit")]
    #[tokio::test]
    async fn default_build_starts_a_swarm_session() {
        let dir = tempfile::tempdir().unwrap();
        let engine = create_engine(&scratch(dir.path())).await.unwrap();
        assert!(!engine.has_blocklist());
        engine.close().await;
        engine.close().await;
    }

    #[cfg(feature = "rqbit")]
    #[tokio::test]
    async fn rqbit_refuses_to_start_without_tcp() {
        let dir = tempfile::tempdir().unwrap();
        let result = create_engine(&EngineConfig {
            allow_tcp: false,
            ..scratch(dir.path())
        })
        .await;
        assert!(matches!(result, Err(DomainError::EngineInit(_))));
    }

    #[cfg(not(feature = "rqbit"))]
    #[tokio::test]
    async fn builds_without_a_backend_fail_at_startup() {
        let dir = tempfile::tempdir().unwrap();
        let result = create_engine(&scratch(dir.path())).await;
        assert!(matches!(result, Err(DomainError::EngineInit(_))));
    }
}
