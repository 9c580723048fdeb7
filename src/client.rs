use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::allocator::{Allocator, DefaultAllocator};
use crate::attributes::{AttributesId, ChargedAttributes, MessageAttributes};
use crate::backend::{Backend, BackendConfig, BackendRegistry};
use crate::command::Command;
use crate::delivery::{Delivery, Verbosity};
use crate::errors::WarrenError;
use crate::filters::MessageFilters;
use crate::message::Message;

// ---------------------------------------------------------------------------
// Client options
// ---------------------------------------------------------------------------

bitflags::bitflags! {
    /// Behavior switches on a [`Client`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ClientOptions: u32 {
        /// Drain the backend to completion inside every submitting call,
        /// so its deliveries have been dispatched by the time the call
        /// returns.
        const AUTOPROCESS = 1 << 0;
    }
}

// ---------------------------------------------------------------------------
// Client builder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Client`].
pub struct ClientBuilder {
    backend: Option<String>,
    registry: Option<BackendRegistry>,
    config: BackendConfig,
    allocator: Option<Arc<dyn Allocator>>,
    options: ClientOptions,
}

impl ClientBuilder {
    fn new() -> Self {
        Self {
            backend: None,
            registry: None,
            config: BackendConfig::new(),
            allocator: None,
            options: ClientOptions::empty(),
        }
    }

    /// Name the backend to connect through (e.g. `"memory"`, `"http"`).
    /// Required.
    pub fn backend(mut self, name: impl Into<String>) -> Self {
        self.backend = Some(name.into());
        self
    }

    /// Resolve the backend name against this registry instead of the
    /// default table.
    pub fn registry(mut self, registry: BackendRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the server URL, for network backends.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = Some(url.into());
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Add a custom header applied to every request.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.insert(key.into(), value.into());
        self
    }

    /// Bound the backend's submission queue.
    pub fn max_pending(mut self, max_pending: usize) -> Self {
        self.config.max_pending = Some(max_pending);
        self
    }

    /// Charge attribute-object storage to this allocator.
    pub fn allocator(mut self, allocator: Arc<dyn Allocator>) -> Self {
        self.allocator = Some(allocator);
        self
    }

    /// Start with the given options set.
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the client.
    pub fn build(self) -> crate::Result<Client> {
        let backend_name = self
            .backend
            .ok_or_else(|| WarrenError::Builder("backend is required".into()))?;
        let registry = self.registry.unwrap_or_default();
        let backend = registry.create(&backend_name, &self.config)?;

        Ok(Client {
            backend,
            backend_name,
            allocator: self
                .allocator
                .unwrap_or_else(|| Arc::new(DefaultAllocator)),
            options: self.options,
            attributes: HashMap::new(),
            next_attributes_id: 0,
            handlers: Handlers::default(),
        })
    }
}

// ---------------------------------------------------------------------------
// Handler slots
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Handlers {
    message: Option<Box<dyn FnMut(&Message) + Send>>,
    queues: Option<Box<dyn FnMut(&[String]) + Send>>,
    accounts: Option<Box<dyn FnMut(&[String]) + Send>>,
    log: Option<Box<dyn FnMut(Verbosity, &str) + Send>>,
    complete: Option<Box<dyn FnMut() + Send>>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// A queue client: submits commands to its backend and dispatches the
/// resulting deliveries to registered handler slots.
///
/// A client owns its backend exclusively and is single-threaded
/// cooperative: no internal tasks or locks, and suspension happens only
/// inside the backend drain. It is `Send` but requires `&mut` for every
/// mutation, so cross-context use needs external synchronization.
///
/// Results never come back through return values. Register a handler per
/// result class you care about; classes without a handler are silently
/// dropped. With [`ClientOptions::AUTOPROCESS`] set, each operation
/// drains the backend before returning; otherwise deliveries wait for an
/// explicit [`process`](Client::process) call.
///
/// # Example
///
/// ```rust,ignore
/// use warren::{Client, ClientOptions, MessageAttributes};
///
/// let mut client = Client::builder()
///     .backend("memory")
///     .options(ClientOptions::AUTOPROCESS)
///     .build()?;
///
/// client.on_message(|message| {
///     println!("got {} ({} bytes)", message.id, message.body.len());
/// });
/// client.on_complete(|| println!("done"));
///
/// let attrs = MessageAttributes::new().with_ttl(300);
/// client
///     .create_message("acct", "jobs", "m1", b"payload".to_vec())
///     .attributes(&attrs)
///     .await?;
/// client.get_messages("acct", "jobs").await?;
/// ```
pub struct Client {
    backend: Box<dyn Backend>,
    backend_name: String,
    allocator: Arc<dyn Allocator>,
    options: ClientOptions,
    attributes: HashMap<AttributesId, MessageAttributes>,
    next_attributes_id: u64,
    handlers: Handlers,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Name of the backend this client was built with.
    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    // -----------------------------------------------------------------------
    // Options
    // -----------------------------------------------------------------------

    /// The current option mask.
    pub fn options(&self) -> ClientOptions {
        self.options
    }

    /// Turn the given options on.
    pub fn add_options(&mut self, options: ClientOptions) {
        self.options |= options;
    }

    /// Turn the given options off.
    pub fn remove_options(&mut self, options: ClientOptions) {
        self.options &= !options;
    }

    // -----------------------------------------------------------------------
    // Handler registration
    // -----------------------------------------------------------------------

    /// Register the message handler, called once per delivered message.
    pub fn on_message<F>(&mut self, handler: F)
    where
        F: FnMut(&Message) + Send + 'static,
    {
        self.handlers.message = Some(Box::new(handler));
    }

    /// Register the queue-list handler, called once per enumeration with
    /// the full set.
    pub fn on_queues<F>(&mut self, handler: F)
    where
        F: FnMut(&[String]) + Send + 'static,
    {
        self.handlers.queues = Some(Box::new(handler));
    }

    /// Register the account-list handler, called once per enumeration
    /// with the full set.
    pub fn on_accounts<F>(&mut self, handler: F)
    where
        F: FnMut(&[String]) + Send + 'static,
    {
        self.handlers.accounts = Some(Box::new(handler));
    }

    /// Register the log handler. A delivery at error verbosity or above
    /// means the operation's results are unreliable even though its
    /// completion still fires.
    pub fn on_log<F>(&mut self, handler: F)
    where
        F: FnMut(Verbosity, &str) + Send + 'static,
    {
        self.handlers.log = Some(Box::new(handler));
    }

    /// Register the completion handler, called exactly once per accepted
    /// command.
    pub fn on_complete<F>(&mut self, handler: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.handlers.complete = Some(Box::new(handler));
    }

    /// Empty every handler slot. Subsequent deliveries of all classes are
    /// silently dropped.
    pub fn clear_handlers(&mut self) {
        self.handlers = Handlers::default();
    }

    // -----------------------------------------------------------------------
    // Managed and charged attributes
    // -----------------------------------------------------------------------

    /// Create a fresh attribute object in this client's registry.
    ///
    /// The storage is charged to the client's allocator; a refusal
    /// surfaces as [`WarrenError::OutOfMemory`] and nothing is created.
    pub fn create_attributes(&mut self) -> crate::Result<AttributesId> {
        self.create_attributes_from(&MessageAttributes::new())
    }

    /// Create a registry attribute object cloned from `src`. Registry
    /// membership itself is never copied, only the values.
    pub fn create_attributes_from(
        &mut self,
        src: &MessageAttributes,
    ) -> crate::Result<AttributesId> {
        self.allocator.allocate(MessageAttributes::size())?;
        let id = AttributesId(self.next_attributes_id);
        self.next_attributes_id += 1;
        self.attributes.insert(id, src.clone());
        Ok(id)
    }

    /// Borrow a registry attribute object, `None` if `id` was freed.
    pub fn attributes(&self, id: AttributesId) -> Option<&MessageAttributes> {
        self.attributes.get(&id)
    }

    /// Mutably borrow a registry attribute object.
    pub fn attributes_mut(&mut self, id: AttributesId) -> Option<&mut MessageAttributes> {
        self.attributes.get_mut(&id)
    }

    /// Unlink and release a registry attribute object. Every other id
    /// stays valid. A stale id is an [`WarrenError::InvalidArgument`].
    pub fn free_attributes(&mut self, id: AttributesId) -> crate::Result<()> {
        if self.attributes.remove(&id).is_none() {
            return Err(WarrenError::InvalidArgument(format!("{id} is not live")));
        }
        self.allocator.release(MessageAttributes::size());
        Ok(())
    }

    /// Number of live registry attribute objects.
    pub fn attributes_count(&self) -> usize {
        self.attributes.len()
    }

    /// Create a caller-owned attribute object whose storage is charged to
    /// this client's allocator. The registry is not involved; the charge
    /// is released when the value drops.
    pub fn charged_attributes(&self) -> crate::Result<ChargedAttributes> {
        self.charged_attributes_from(&MessageAttributes::new())
    }

    /// Charged counterpart of [`create_attributes_from`](Self::create_attributes_from).
    pub fn charged_attributes_from(
        &self,
        src: &MessageAttributes,
    ) -> crate::Result<ChargedAttributes> {
        self.allocator.allocate(MessageAttributes::size())?;
        Ok(ChargedAttributes::new(src.clone(), Arc::clone(&self.allocator)))
    }

    // -----------------------------------------------------------------------
    // Message operations
    // -----------------------------------------------------------------------

    /// Store a message, creating its queue and account as needed.
    ///
    /// Returns a [`CreateRequest`] for attaching attributes before
    /// sending; with no attributes the request can be `.await`ed
    /// directly since it implements `IntoFuture`.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// // Plain create
    /// client.create_message("acct", "jobs", "m1", b"payload".to_vec()).await?;
    ///
    /// // With attributes
    /// let attrs = MessageAttributes::new().with_hide(60);
    /// client
    ///     .create_message("acct", "jobs", "m2", b"later".to_vec())
    ///     .attributes(&attrs)
    ///     .send()
    ///     .await?;
    /// ```
    pub fn create_message(
        &mut self,
        account: impl Into<String>,
        queue: impl Into<String>,
        message_id: impl Into<String>,
        body: impl Into<Vec<u8>>,
    ) -> CreateRequest<'_> {
        CreateRequest {
            client: self,
            account: account.into(),
            queue: queue.into(),
            message_id: message_id.into(),
            body: body.into(),
            attributes: AttrSource::None,
        }
    }

    /// Apply attribute changes to one message, hidden or not.
    pub fn update_message(
        &mut self,
        account: impl Into<String>,
        queue: impl Into<String>,
        message_id: impl Into<String>,
    ) -> UpdateRequest<'_> {
        UpdateRequest {
            client: self,
            account: account.into(),
            queue: queue.into(),
            message_id: Some(message_id.into()),
            attributes: AttrSource::None,
            filters: None,
        }
    }

    /// Apply attribute changes to every matching message. Hidden messages
    /// are skipped unless the filters say otherwise.
    pub fn update_messages(
        &mut self,
        account: impl Into<String>,
        queue: impl Into<String>,
    ) -> UpdateRequest<'_> {
        UpdateRequest {
            client: self,
            account: account.into(),
            queue: queue.into(),
            message_id: None,
            attributes: AttrSource::None,
            filters: None,
        }
    }

    /// Fetch one message by id, hidden or not. A missing id is the empty
    /// outcome: completion fires with no message delivery.
    pub fn get_message(
        &mut self,
        account: impl Into<String>,
        queue: impl Into<String>,
        message_id: impl Into<String>,
    ) -> QueryRequest<'_> {
        self.query(Command::GetMessage {
            account: account.into(),
            queue: queue.into(),
            message_id: message_id.into(),
            filters: None,
        })
    }

    /// Fetch every matching message.
    pub fn get_messages(
        &mut self,
        account: impl Into<String>,
        queue: impl Into<String>,
    ) -> QueryRequest<'_> {
        self.query(Command::GetMessages {
            account: account.into(),
            queue: queue.into(),
            filters: None,
        })
    }

    /// Remove one message by id, hidden or not.
    pub fn delete_message(
        &mut self,
        account: impl Into<String>,
        queue: impl Into<String>,
        message_id: impl Into<String>,
    ) -> QueryRequest<'_> {
        self.query(Command::DeleteMessage {
            account: account.into(),
            queue: queue.into(),
            message_id: message_id.into(),
            filters: None,
        })
    }

    /// Remove every matching message.
    pub fn delete_messages(
        &mut self,
        account: impl Into<String>,
        queue: impl Into<String>,
    ) -> QueryRequest<'_> {
        self.query(Command::DeleteMessages {
            account: account.into(),
            queue: queue.into(),
            filters: None,
        })
    }

    // -----------------------------------------------------------------------
    // Queue and account operations
    // -----------------------------------------------------------------------

    /// Enumerate the account's queues.
    pub fn get_queues(&mut self, account: impl Into<String>) -> QueryRequest<'_> {
        self.query(Command::GetQueues {
            account: account.into(),
            filters: None,
        })
    }

    /// Remove matching queues and their messages.
    pub fn delete_queues(&mut self, account: impl Into<String>) -> QueryRequest<'_> {
        self.query(Command::DeleteQueues {
            account: account.into(),
            filters: None,
        })
    }

    /// Enumerate accounts.
    pub fn get_accounts(&mut self) -> QueryRequest<'_> {
        self.query(Command::GetAccounts { filters: None })
    }

    /// Remove matching accounts and everything under them.
    pub fn delete_accounts(&mut self) -> QueryRequest<'_> {
        self.query(Command::DeleteAccounts { filters: None })
    }

    fn query(&mut self, command: Command) -> QueryRequest<'_> {
        QueryRequest {
            client: self,
            command,
        }
    }

    // -----------------------------------------------------------------------
    // Draining
    // -----------------------------------------------------------------------

    /// Drain the backend and dispatch every delivery to its handler slot,
    /// in delivery order. Within one command results precede its
    /// completion; across commands the order is the backend's.
    pub async fn process(&mut self) -> crate::Result<()> {
        let deliveries = self.backend.process().await?;
        tracing::debug!(count = deliveries.len(), "dispatching deliveries");
        for delivery in deliveries {
            self.dispatch(delivery);
        }
        Ok(())
    }

    /// Validate, submit, and (with AUTOPROCESS) drain.
    async fn finish(&mut self, command: Command) -> crate::Result<()> {
        command.validate()?;
        tracing::debug!(
            command = command.kind(),
            backend = %self.backend_name,
            "submitting command"
        );
        self.backend.submit(command)?;
        if self.options.contains(ClientOptions::AUTOPROCESS) {
            self.process().await?;
        }
        Ok(())
    }

    fn dispatch(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::Message(message) => {
                if let Some(handler) = self.handlers.message.as_mut() {
                    handler(&message);
                }
            }
            Delivery::Queues(names) => {
                if let Some(handler) = self.handlers.queues.as_mut() {
                    handler(&names);
                }
            }
            Delivery::Accounts(names) => {
                if let Some(handler) = self.handlers.accounts.as_mut() {
                    handler(&names);
                }
            }
            Delivery::Log { level, text } => match self.handlers.log.as_mut() {
                Some(handler) => handler(level, &text),
                None if level.is_error() => {
                    tracing::warn!(%level, "dropped backend log: {text}");
                }
                None => {}
            },
            Delivery::Complete => {
                if let Some(handler) = self.handlers.complete.as_mut() {
                    handler();
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Tear the client down, noting any managed attributes still live.
    /// Dropping without `close` releases them just the same.
    pub fn close(self) {
        if !self.attributes.is_empty() {
            tracing::warn!(
                count = self.attributes.len(),
                "closing client with live managed attributes"
            );
        }
    }

    fn resolve(&self, source: AttrSource) -> crate::Result<Option<MessageAttributes>> {
        match source {
            AttrSource::None => Ok(None),
            AttrSource::Inline(attributes) => Ok(Some(attributes)),
            AttrSource::Managed(id) => {
                let attributes = self
                    .attributes
                    .get(&id)
                    .ok_or_else(|| WarrenError::InvalidArgument(format!("{id} is not live")))?;
                Ok(Some(attributes.clone()))
            }
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        // Balance the allocator for whatever the caller never freed.
        for _ in self.attributes.drain() {
            self.allocator.release(MessageAttributes::size());
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("backend", &self.backend_name)
            .field("options", &self.options)
            .field("managed_attributes", &self.attributes.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Request builders
// ---------------------------------------------------------------------------

/// Where a request's attributes come from: nothing, a snapshot of a
/// caller value, or a registry id resolved at send time.
enum AttrSource {
    None,
    Inline(MessageAttributes),
    Managed(AttributesId),
}

/// A pending create-message request, created via [`Client::create_message`].
///
/// Finish with [`send`](Self::send), or `.await` it directly.
pub struct CreateRequest<'a> {
    client: &'a mut Client,
    account: String,
    queue: String,
    message_id: String,
    body: Vec<u8>,
    attributes: AttrSource,
}

impl<'a> CreateRequest<'a> {
    /// Attach a snapshot of the given attributes.
    pub fn attributes(mut self, attributes: &MessageAttributes) -> Self {
        self.attributes = AttrSource::Inline(attributes.clone());
        self
    }

    /// Attach a registry attribute object, read when the request is sent.
    pub fn managed_attributes(mut self, id: AttributesId) -> Self {
        self.attributes = AttrSource::Managed(id);
        self
    }

    /// Submit the request.
    pub async fn send(self) -> crate::Result<()> {
        let attributes = self.client.resolve(self.attributes)?;
        let command = Command::CreateMessage {
            account: self.account,
            queue: self.queue,
            message_id: self.message_id,
            body: self.body,
            attributes,
        };
        self.client.finish(command).await
    }
}

impl<'a> std::future::IntoFuture for CreateRequest<'a> {
    type Output = crate::Result<()>;
    type IntoFuture = std::pin::Pin<Box<dyn std::future::Future<Output = Self::Output> + Send + 'a>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.send())
    }
}

/// A pending update request for one message or a whole queue, created via
/// [`Client::update_message`] / [`Client::update_messages`].
pub struct UpdateRequest<'a> {
    client: &'a mut Client,
    account: String,
    queue: String,
    message_id: Option<String>,
    attributes: AttrSource,
    filters: Option<MessageFilters>,
}

impl<'a> UpdateRequest<'a> {
    /// Attach a snapshot of the given attributes.
    pub fn attributes(mut self, attributes: &MessageAttributes) -> Self {
        self.attributes = AttrSource::Inline(attributes.clone());
        self
    }

    /// Attach a registry attribute object, read when the request is sent.
    pub fn managed_attributes(mut self, id: AttributesId) -> Self {
        self.attributes = AttrSource::Managed(id);
        self
    }

    /// Attach selection filters.
    pub fn filters(mut self, filters: &MessageFilters) -> Self {
        self.filters = Some(filters.clone());
        self
    }

    /// Submit the request.
    pub async fn send(self) -> crate::Result<()> {
        let attributes = self.client.resolve(self.attributes)?;
        let command = match self.message_id {
            Some(message_id) => Command::UpdateMessage {
                account: self.account,
                queue: self.queue,
                message_id,
                attributes,
                filters: self.filters,
            },
            None => Command::UpdateMessages {
                account: self.account,
                queue: self.queue,
                attributes,
                filters: self.filters,
            },
        };
        self.client.finish(command).await
    }
}

impl<'a> std::future::IntoFuture for UpdateRequest<'a> {
    type Output = crate::Result<()>;
    type IntoFuture = std::pin::Pin<Box<dyn std::future::Future<Output = Self::Output> + Send + 'a>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.send())
    }
}

/// A pending fetch, delete, or enumeration request.
pub struct QueryRequest<'a> {
    client: &'a mut Client,
    command: Command,
}

impl<'a> QueryRequest<'a> {
    /// Attach selection filters.
    pub fn filters(mut self, filters: &MessageFilters) -> Self {
        set_filters(&mut self.command, filters.clone());
        self
    }

    /// Submit the request.
    pub async fn send(self) -> crate::Result<()> {
        self.client.finish(self.command).await
    }
}

impl<'a> std::future::IntoFuture for QueryRequest<'a> {
    type Output = crate::Result<()>;
    type IntoFuture = std::pin::Pin<Box<dyn std::future::Future<Output = Self::Output> + Send + 'a>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.send())
    }
}

fn set_filters(command: &mut Command, new: MessageFilters) {
    match command {
        Command::UpdateMessage { filters, .. }
        | Command::UpdateMessages { filters, .. }
        | Command::GetMessage { filters, .. }
        | Command::GetMessages { filters, .. }
        | Command::DeleteMessage { filters, .. }
        | Command::DeleteMessages { filters, .. }
        | Command::GetQueues { filters, .. }
        | Command::DeleteQueues { filters, .. }
        | Command::GetAccounts { filters }
        | Command::DeleteAccounts { filters } => *filters = Some(new),
        Command::CreateMessage { .. } => {}
    }
}
