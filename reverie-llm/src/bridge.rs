//! Driving HTTP futures from the engine's synchronous traits.
//!
//! Inside a multi-threaded tokio runtime the future runs on the caller's
//! runtime through `block_in_place`. Anywhere else it runs on a private
//! current-thread runtime.

use std::future::Future;

use tokio::runtime::{Builder, Handle, Runtime, RuntimeFlavor};

use crate::error::LlmError;

/// A private runtime plus the logic for picking where a future runs.
pub(crate) struct Blocking {
    runtime: Option<Runtime>,
}

impl Blocking {
    /// Start the fallback runtime.
    pub(crate) fn new() -> Result<Self, LlmError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| LlmError::ConfigError(format!("runtime: {e}")))?;
        Ok(Self { runtime: Some(runtime) })
    }

    /// Run `fut` to completion.
    pub(crate) fn block_on<T, F>(&self, fut: F) -> Result<T, LlmError>
    where
        F: Future<Output = Result<T, LlmError>> + Send,
        T: Send,
    {
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(fut))
            }
            // A current-thread runtime cannot be blocked from inside; drive
            // the request on a scoped thread instead.
            Ok(_) => {
                let runtime = self.own_runtime()?;
                std::thread::scope(|s| {
                    s.spawn(|| runtime.block_on(fut))
                        .join()
                        .map_err(|_| LlmError::RequestFailed("LLM worker panicked".into()))?
                })
            }
            Err(_) => self.own_runtime()?.block_on(fut),
        }
    }

    fn own_runtime(&self) -> Result<&Runtime, LlmError> {
        self.runtime
            .as_ref()
            .ok_or_else(|| LlmError::ConfigError("runtime already shut down".into()))
    }
}

impl Drop for Blocking {
    fn drop(&mut self) {
        // Dropping a runtime blocks, which panics inside an async context.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
