use super::Runtime;

use std::thread;

/// Builder for configuring and creating a [`Runtime`].
///
/// # Examples
///
/// ```rust,ignore
/// let runtime = RuntimeBuilder::new()
///     .worker_threads(4)
///     .thread_name("lock-workers")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct RuntimeBuilder {
    worker_threads: usize,
    thread_name: String,
}

impl RuntimeBuilder {
    /// Creates a builder with one worker per logical CPU, falling back to
    /// `1` if that cannot be determined.
    pub fn new() -> Self {
        let worker_threads = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            worker_threads,
            thread_name: "tandem-worker".to_owned(),
        }
    }

    /// Sets the number of worker threads.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn worker_threads(mut self, n: usize) -> Self {
        assert!(n > 0, "worker_threads must be > 0");

        self.worker_threads = n;
        self
    }

    /// Sets the prefix of worker thread names; workers are suffixed with
    /// their index.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Starts the worker threads and returns the runtime.
    pub fn build(self) -> Runtime {
        Runtime::new(self.worker_threads, &self.thread_name)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
