//! Single-shot completion handles.
//!
//! A [`Completion`] is invoked exactly once. Completing it consumes it; if
//! it is dropped first (the job never ran, or the work panicked) the drop
//! delivers [`StoreError::Worker`] instead.

use std::fmt;

use feedstore_core::{StoreError, StoreResult};

type Callback<T> = Box<dyn FnOnce(StoreResult<T>) + Send + 'static>;

pub struct Completion<T> {
    callback: Option<Callback<T>>,
    operation: &'static str,
}

impl<T> Completion<T> {
    pub fn new<F>(operation: &'static str, callback: F) -> Self
    where
        F: FnOnce(StoreResult<T>) + Send + 'static,
    {
        Self {
            callback: Some(Box::new(callback)),
            operation,
        }
    }

    /// Name of the store operation this completion belongs to.
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Deliver the outcome.
    pub fn complete(mut self, result: StoreResult<T>) {
        self.deliver(result);
    }

    fn deliver(&mut self, result: StoreResult<T>) {
        if let Some(callback) = self.callback.take() {
            if let Err(e) = &result {
                tracing::warn!(operation = self.operation, error = %e, "Store operation failed");
            } else {
                tracing::debug!(operation = self.operation, "Store operation completed");
            }
            callback(result);
        }
    }
}

impl<T> Drop for Completion<T> {
    fn drop(&mut self) {
        if self.callback.is_some() {
            let operation = self.operation;
            self.deliver(Err(StoreError::worker(format!(
                "{operation} was abandoned before completing"
            ))));
        }
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("operation", &self.operation)
            .field("pending", &self.callback.is_some())
            .finish()
    }
}
