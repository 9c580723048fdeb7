/// Selection controls for list and batch operations.
///
/// Every field defaults to "not specified"; backends apply only what is
/// set. Create operations take no filters.
///
/// # Example
///
/// ```rust
/// use warren::MessageFilters;
///
/// let filters = MessageFilters::new()
///     .with_marker("msg-41")
///     .with_limit(10)
///     .with_match_hidden(true);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageFilters {
    /// Resume enumeration strictly after this id or name.
    pub marker: Option<String>,
    /// Cap on the number of results.
    pub limit: Option<u32>,
    /// Include hidden messages in multi-message operations (default: false).
    pub match_hidden: bool,
    /// Long-poll hint in seconds, forwarded to network backends. The
    /// in-memory backend ignores it.
    pub wait: Option<u32>,
}

impl MessageFilters {
    /// Create filters with nothing specified.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the enumeration marker.
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    /// Set the result cap.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Include or exclude hidden messages in multi-message operations.
    pub fn with_match_hidden(mut self, match_hidden: bool) -> Self {
        self.match_hidden = match_hidden;
        self
    }

    /// Set the long-poll hint in seconds.
    pub fn with_wait(mut self, wait: u32) -> Self {
        self.wait = Some(wait);
        self
    }
}
