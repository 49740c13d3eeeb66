use super::error::DetectError;
use super::pool::RecognizerPool;
use super::recognizer::{RecognizerFactory, RecognizerRole};
use crate::config::PoolConfig;
use image::GrayImage;
use log::info;
use std::sync::{Arc, Mutex, MutexGuard};

struct PoolSet {
    label: Arc<RecognizerPool>,
    countdown: Arc<RecognizerPool>,
}

/// 解码上下文：持有两组识别器池，显式初始化与销毁
///
/// Built once per process and passed by reference into the scan. Both
/// `initialize` and `teardown` are idempotent, and a torn-down context can
/// be initialized again.
pub struct DecoderContext {
    factory: Arc<dyn RecognizerFactory>,
    config: PoolConfig,
    pools: Mutex<Option<PoolSet>>,
}

impl DecoderContext {
    pub fn new(factory: Arc<dyn RecognizerFactory>, config: PoolConfig) -> Self {
        Self {
            factory,
            config,
            pools: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<PoolSet>> {
        self.pools.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn initialize(&self) -> Result<(), DetectError> {
        let mut pools = self.lock();
        if pools.is_some() {
            return Ok(());
        }

        info!(
            "🔧 DecoderContext: creating pools (label: {}, countdown: {})",
            self.config.label_handles, self.config.countdown_handles
        );
        let pool = |role: RecognizerRole| {
            RecognizerPool::new(role, self.config.capacity(role), Arc::clone(&self.factory))
        };
        let label = pool(RecognizerRole::Label)?;
        let countdown = pool(RecognizerRole::Countdown)?;

        // one live handle per role proves the engine loads before scanning
        label.warm(1)?;
        countdown.warm(1)?;

        *pools = Some(PoolSet { label, countdown });
        info!("✅ DecoderContext initialized");
        Ok(())
    }

    pub fn teardown(&self) {
        if let Some(set) = self.lock().take() {
            set.label.close();
            set.countdown.close();
            info!("🗑️ DecoderContext: recognizer pools released");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().is_some()
    }

    pub fn pool(&self, role: RecognizerRole) -> Result<Arc<RecognizerPool>, DetectError> {
        let pools = self.lock();
        let set = pools.as_ref().ok_or(DetectError::NotInitialized)?;
        Ok(match role {
            RecognizerRole::Label => Arc::clone(&set.label),
            RecognizerRole::Countdown => Arc::clone(&set.countdown),
        })
    }

    /// Run one raster through a pooled recognizer for `role`.
    pub fn recognize(&self, role: RecognizerRole, raster: &GrayImage) -> Result<String, DetectError> {
        let pool = self.pool(role)?;
        let mut handle = pool.acquire()?;
        let text = handle.step(raster)?;
        if self.config.resets_after_step(role) {
            handle.reset();
        }
        Ok(text)
    }
}

impl Drop for DecoderContext {
    fn drop(&mut self) {
        self.teardown();
    }
}
