use super::error::DetectError;
use super::recognizer::{Recognizer, RecognizerFactory, RecognizerRole};
use log::{debug, warn};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

struct PoolState {
    idle: Vec<Box<dyn Recognizer>>,
    created: usize,
    closed: bool,
}

/// 固定容量的识别器池
///
/// Handles are created lazily up to `capacity`. `acquire` blocks while every
/// handle is borrowed; returning a handle never blocks.
pub struct RecognizerPool {
    role: RecognizerRole,
    capacity: usize,
    factory: Arc<dyn RecognizerFactory>,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl RecognizerPool {
    pub fn new(
        role: RecognizerRole,
        capacity: usize,
        factory: Arc<dyn RecognizerFactory>,
    ) -> Result<Arc<Self>, DetectError> {
        if capacity == 0 {
            return Err(DetectError::InvalidPoolSize(role));
        }

        Ok(Arc::new(Self {
            role,
            capacity,
            factory,
            state: Mutex::new(PoolState {
                idle: Vec::with_capacity(capacity),
                created: 0,
                closed: false,
            }),
            available: Condvar::new(),
        }))
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn role(&self) -> RecognizerRole {
        self.role
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn idle_count(&self) -> usize {
        self.lock().idle.len()
    }

    pub fn created_count(&self) -> usize {
        self.lock().created
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Eagerly build handles until `count` exist (capped at capacity).
    pub fn warm(&self, count: usize) -> Result<(), DetectError> {
        let target = count.min(self.capacity);
        loop {
            {
                let mut state = self.lock();
                if state.closed {
                    return Err(DetectError::PoolClosed(self.role));
                }
                if state.created >= target {
                    return Ok(());
                }
                state.created += 1;
            }

            match self.factory.create(self.role) {
                Ok(handle) => self.release(handle),
                Err(e) => {
                    self.lock().created -= 1;
                    return Err(e);
                }
            }
        }
    }

    /// Borrow a handle, blocking until one is free.
    pub fn acquire(self: &Arc<Self>) -> Result<PooledRecognizer, DetectError> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return Err(DetectError::PoolClosed(self.role));
            }
            if let Some(handle) = state.idle.pop() {
                return Ok(PooledRecognizer {
                    pool: Arc::clone(self),
                    handle: Some(handle),
                });
            }
            if state.created < self.capacity {
                state.created += 1;
                drop(state);
                return match self.factory.create(self.role) {
                    Ok(handle) => Ok(PooledRecognizer {
                        pool: Arc::clone(self),
                        handle: Some(handle),
                    }),
                    Err(e) => {
                        self.lock().created -= 1;
                        self.available.notify_one();
                        Err(e)
                    }
                };
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Put a handle back. A closed or already-full pool drops it instead.
    pub fn release(&self, handle: Box<dyn Recognizer>) {
        let mut state = self.lock();
        if state.closed {
            debug!("🗑️ {} pool closed, disposing returned handle", self.role);
            return;
        }
        if state.idle.len() >= self.capacity {
            warn!(
                "⚠️ {} pool already holds {} idle handles, discarding returned handle",
                self.role,
                state.idle.len()
            );
            return;
        }
        state.idle.push(handle);
        drop(state);
        self.available.notify_one();
    }

    /// Dispose idle handles and refuse further acquisitions. Idempotent.
    pub fn close(&self) {
        let drained = {
            let mut state = self.lock();
            state.closed = true;
            std::mem::take(&mut state.idle)
        };
        self.available.notify_all();
        if !drained.is_empty() {
            debug!("🗑️ {} pool: disposed {} handles", self.role, drained.len());
        }
    }
}

/// 借出的识别器，离开作用域时自动归还
pub struct PooledRecognizer {
    pool: Arc<RecognizerPool>,
    handle: Option<Box<dyn Recognizer>>,
}

impl Deref for PooledRecognizer {
    type Target = dyn Recognizer;

    fn deref(&self) -> &Self::Target {
        self.handle.as_deref().expect("handle is only taken on drop")
    }
}

impl DerefMut for PooledRecognizer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.handle
            .as_deref_mut()
            .expect("handle is only taken on drop")
    }
}

impl Drop for PooledRecognizer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.pool.release(handle);
        }
    }
}
