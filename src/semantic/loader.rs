//! Lazy, memoized loading of the embedding model.
//!
//! The model download takes seconds on first use, so concurrent callers
//! must share one in-flight load instead of each starting their own.
//! tokio's OnceCell runs a single initializer at a time and lets every
//! waiter observe its result; a boolean "loading" flag alone would let
//! two concurrent first calls both see "not loaded" and both load.
//!
//! A failed load is latched and never retried within the session: the
//! caller is expected to stay on substring search from then on.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;

use crate::config::SemanticSearchConfig;
use crate::semantic::encoder::{EncoderError, FastembedEncoder, TextEncoder};

type EncoderFactory = dyn Fn() -> Result<Arc<dyn TextEncoder>, EncoderError> + Send + Sync;

pub struct ModelLoader {
    cell: OnceCell<Arc<dyn TextEncoder>>,
    factory: Arc<EncoderFactory>,
    loads: AtomicU64,
    failure: Mutex<Option<String>>,
}

impl ModelLoader {
    pub fn new(factory: Arc<EncoderFactory>) -> Self {
        Self {
            cell: OnceCell::new(),
            factory,
            loads: AtomicU64::new(0),
            failure: Mutex::new(None),
        }
    }

    /// Loader backed by a fastembed model cached under `cache_dir`.
    pub fn from_config(config: &SemanticSearchConfig, cache_dir: PathBuf) -> Self {
        let model_name = config.model.clone();
        Self::new(Arc::new(move || {
            let encoder = FastembedEncoder::new(&model_name, cache_dir.clone())?;
            Ok(Arc::new(encoder) as Arc<dyn TextEncoder>)
        }))
    }

    /// Get the loaded encoder, loading it on first call.
    ///
    /// Concurrent calls before the first load completes await the same
    /// in-flight load; exactly one underlying load is performed.
    pub async fn get(&self) -> Result<Arc<dyn TextEncoder>, EncoderError> {
        {
            let failure = self.failure.lock().unwrap();
            if let Some(message) = failure.as_ref() {
                return Err(EncoderError::BackendInit(message.clone()));
            }
        }

        let result = self
            .cell
            .get_or_try_init(|| async {
                self.loads.fetch_add(1, Ordering::SeqCst);
                let factory = self.factory.clone();
                // the load downloads model files and spins up the
                // inference runtime, keep it off the async workers
                tokio::task::spawn_blocking(move || factory())
                    .await
                    .map_err(|err| EncoderError::InitFailed(err.to_string()))?
            })
            .await;

        match result {
            Ok(encoder) => Ok(encoder.clone()),
            Err(err) => {
                *self.failure.lock().unwrap() = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Whether the model finished loading.
    pub fn is_ready(&self) -> bool {
        self.cell.initialized()
    }

    /// How many underlying loads have been started.
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::testutil::StubEncoder;
    use std::time::Duration;

    fn slow_stub_factory(delay: Duration) -> Arc<EncoderFactory> {
        Arc::new(move || {
            std::thread::sleep(delay);
            Ok(Arc::new(StubEncoder::unit()) as Arc<dyn TextEncoder>)
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_first_calls_share_one_load() {
        let loader = ModelLoader::new(slow_stub_factory(Duration::from_millis(50)));

        let (a, b) = tokio::join!(loader.get(), loader.get());
        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(loader.load_count(), 1);
        assert!(loader.is_ready());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_repeated_calls_reuse_the_loaded_model() {
        let loader = ModelLoader::new(slow_stub_factory(Duration::from_millis(1)));

        loader.get().await.unwrap();
        loader.get().await.unwrap();
        assert_eq!(loader.load_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failed_load_is_latched() {
        let loader = ModelLoader::new(Arc::new(|| {
            Err(EncoderError::BackendInit("no compute device".to_string()))
        }));

        assert!(loader.get().await.is_err());
        assert!(matches!(
            loader.get().await,
            Err(EncoderError::BackendInit(_))
        ));
        assert!(!loader.is_ready());
        // the second call must not start another load
        assert_eq!(loader.load_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_not_ready_before_first_load() {
        let loader = ModelLoader::new(slow_stub_factory(Duration::from_millis(1)));
        assert!(!loader.is_ready());
        assert_eq!(loader.load_count(), 0);
    }
}
