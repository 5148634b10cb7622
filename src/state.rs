use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::{AppConfig, StorageConfig};
use crate::estimation::gateway::{DisabledEstimator, Estimator};
use crate::estimation::gemini::GeminiEstimator;
use crate::estimation::sessions::SessionRegistry;
use crate::persistence::{self, Persister};
use crate::storage::{FileStorage, Storage, StorageClient};
use crate::tracker::{Action, Clock, Outcome, Tracker};

#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<Mutex<Tracker>>,
    pub sessions: Arc<Mutex<SessionRegistry>>,
    pub estimator: Arc<dyn Estimator>,
    pub persister: Persister,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        let storage = match &config.storage {
            StorageConfig::File { data_dir } => {
                info!(data_dir = %data_dir.display(), "using file storage");
                Arc::new(FileStorage::new(data_dir.clone())) as Arc<dyn StorageClient>
            }
            StorageConfig::S3 {
                endpoint,
                bucket,
                access_key,
                secret_key,
                region,
            } => {
                info!(%endpoint, %bucket, "using s3 storage");
                Arc::new(Storage::new(endpoint, bucket, access_key, secret_key, region).await?)
                    as Arc<dyn StorageClient>
            }
        };

        let estimator = match GeminiEstimator::from_config(&config.gemini)? {
            Some(gemini) => Arc::new(gemini) as Arc<dyn Estimator>,
            None => {
                warn!("GEMINI_API_KEY not set; food estimation disabled");
                Arc::new(DisabledEstimator) as Arc<dyn Estimator>
            }
        };

        Ok(Self::from_parts(&config.data_key, storage, estimator).await)
    }

    /// Loads the saved tracker from `storage` and starts the snapshot writer.
    pub async fn from_parts(
        data_key: &str,
        storage: Arc<dyn StorageClient>,
        estimator: Arc<dyn Estimator>,
    ) -> Self {
        let tracker = persistence::load(storage.as_ref(), data_key).await;
        let persister = Persister::spawn(storage, data_key.to_string());
        Self {
            tracker: Arc::new(Mutex::new(tracker)),
            sessions: Arc::new(Mutex::new(SessionRegistry::default())),
            estimator,
            persister,
        }
    }

    /// Applies one action and queues a snapshot if anything changed.
    pub async fn dispatch(&self, action: Action) -> Outcome {
        self.dispatch_at(action, &Clock::system()).await
    }

    pub async fn dispatch_at(&self, action: Action, clock: &Clock) -> Outcome {
        let mut tracker = self.tracker.lock().await;
        let outcome = tracker.dispatch(action, clock);
        if outcome.is_applied() {
            self.persister.save(&tracker);
        }
        outcome
    }

    #[cfg(test)]
    pub async fn fake() -> Self {
        Self::fake_with(Arc::new(DisabledEstimator)).await
    }

    #[cfg(test)]
    pub async fn fake_with(estimator: Arc<dyn Estimator>) -> Self {
        use crate::config::DEFAULT_DATA_KEY;
        use crate::storage::fake::MemoryStorage;

        Self::from_parts(
            DEFAULT_DATA_KEY,
            Arc::new(MemoryStorage::default()),
            estimator,
        )
        .await
    }
}
