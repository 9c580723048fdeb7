//! The backend seam: where commands are executed and deliveries produced.

#[cfg(feature = "http")]
pub mod http;
pub mod memory;

#[cfg(feature = "http")]
pub use self::http::HttpBackend;
pub use self::memory::MemoryBackend;

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::time::Duration;

use crate::command::Command;
use crate::delivery::Delivery;
use crate::errors::{Result, WarrenError};

// ---------------------------------------------------------------------------
// Backend trait
// ---------------------------------------------------------------------------

/// A pluggable execution engine for queue operations.
///
/// This trait is object-safe and uses `Pin<Box<dyn Future>>` for async
/// support. [`submit`](Backend::submit) is the synchronous accept/reject
/// gate; a rejected command produces no deliveries, ever. Accepted commands
/// are executed by [`process`](Backend::process), which drains everything
/// pending and yields the resulting [`Delivery`] sequence: per command,
/// results first, then exactly one [`Delivery::Complete`].
///
/// Implement this trait to plug in custom engines; `"memory"` and `"http"`
/// ship in-tree.
///
/// # Example
///
/// ```rust
/// use std::pin::Pin;
/// use warren::backend::Backend;
/// use warren::{Command, Delivery};
///
/// #[derive(Debug, Default)]
/// struct NullBackend {
///     pending: usize,
/// }
///
/// impl Backend for NullBackend {
///     fn submit(&mut self, _command: Command) -> warren::Result<()> {
///         self.pending += 1;
///         Ok(())
///     }
///
///     fn process(
///         &mut self,
///     ) -> Pin<Box<dyn std::future::Future<Output = warren::Result<Vec<Delivery>>> + Send + '_>>
///     {
///         Box::pin(async move {
///             let completions = std::mem::take(&mut self.pending);
///             Ok(vec![Delivery::Complete; completions])
///         })
///     }
/// }
/// ```
pub trait Backend: Send + Debug {
    /// Accept or reject a command. `Err` means no deliveries will ever
    /// fire for this attempt.
    fn submit(&mut self, command: Command) -> Result<()>;

    /// Execute everything accepted so far and yield the deliveries in
    /// completion order.
    fn process(&mut self)
        -> Pin<Box<dyn Future<Output = Result<Vec<Delivery>>> + Send + '_>>;
}

// ---------------------------------------------------------------------------
// Backend configuration
// ---------------------------------------------------------------------------

/// Settings handed to a backend factory at construction.
///
/// Each backend reads what applies to it: `"http"` requires `url` and
/// honors `timeout` and `headers`; `"memory"` honors only `max_pending`.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use warren::BackendConfig;
///
/// let config = BackendConfig::new()
///     .url("http://localhost:8080")
///     .header("X-Tenant-Id", "tenant-42")
///     .timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, Default)]
pub struct BackendConfig {
    /// Server URL, for network backends.
    pub url: Option<String>,
    /// Custom headers applied to every request.
    pub headers: HashMap<String, String>,
    /// Request timeout. Defaults to 30 seconds.
    pub timeout: Option<Duration>,
    /// Bound on commands accepted but not yet processed. `None` means
    /// unbounded; exceeding a bound rejects the submission.
    pub max_pending: Option<usize>,
}

impl BackendConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Add a custom header.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Bound the submission queue.
    pub fn max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = Some(max_pending);
        self
    }
}

// ---------------------------------------------------------------------------
// Backend registry
// ---------------------------------------------------------------------------

/// Factory signature for registered backends.
pub type BackendFactory = Box<dyn Fn(&BackendConfig) -> Result<Box<dyn Backend>> + Send + Sync>;

struct RegistryEntry {
    factory: BackendFactory,
    instance_size: usize,
}

/// A table of constructible backends, keyed by name.
///
/// Nothing is ambient: a [`Client`](crate::Client) resolves its backend
/// against the registry it was built with, so tests and embedders can
/// supply their own table. [`with_defaults`](Self::with_defaults) carries
/// the in-tree backends.
pub struct BackendRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl BackendRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// A registry holding the in-tree backends: `"memory"`, and `"http"`
    /// when that feature is enabled.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("memory", mem::size_of::<MemoryBackend>(), |config| {
            Ok(Box::new(MemoryBackend::new(config)))
        });
        #[cfg(feature = "http")]
        registry.register("http", mem::size_of::<HttpBackend>(), |config| {
            Ok(Box::new(HttpBackend::new(config)?))
        });
        registry
    }

    /// Register a backend under `name`, replacing any previous entry.
    /// `instance_size` is the byte size reported by
    /// [`instance_size`](Self::instance_size), for callers that account
    /// for backend storage.
    pub fn register<F>(&mut self, name: impl Into<String>, instance_size: usize, factory: F)
    where
        F: Fn(&BackendConfig) -> Result<Box<dyn Backend>> + Send + Sync + 'static,
    {
        let name = name.into();
        tracing::debug!(backend = %name, "registering backend");
        self.entries.insert(
            name,
            RegistryEntry {
                factory: Box::new(factory),
                instance_size,
            },
        );
    }

    /// Construct the backend registered under `name`.
    pub fn create(&self, name: &str, config: &BackendConfig) -> Result<Box<dyn Backend>> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| WarrenError::UnknownBackend(name.to_string()))?;
        (entry.factory)(config)
    }

    /// Byte size of one instance of the named backend, `None` if
    /// unregistered.
    pub fn instance_size(&self, name: &str) -> Option<usize> {
        self.entries.get(name).map(|entry| entry.instance_size)
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.names())
            .finish()
    }
}
