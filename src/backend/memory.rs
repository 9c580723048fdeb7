//! In-process backend with full delivery semantics and no server.

use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::pin::Pin;

use crate::attributes::{AttributeSet, MessageAttributes};
use crate::backend::{Backend, BackendConfig};
use crate::command::Command;
use crate::delivery::{Delivery, Verbosity};
use crate::errors::{Result, WarrenError};
use crate::filters::MessageFilters;
use crate::message::Message;

#[derive(Debug, Clone)]
struct StoredMessage {
    body: Vec<u8>,
    ttl: u32,
    hide: u32,
}

type QueueStore = BTreeMap<String, StoredMessage>;
type AccountStore = BTreeMap<String, QueueStore>;

/// A backend that executes commands against process-local state.
///
/// Registered as `"memory"`. Accounts and queues come into being with
/// their first message and vanish with their last one. A message with a
/// nonzero hide value is invisible to multi-message operations (unless
/// the filters say otherwise) but is always addressable by id. TTL values
/// are retained as metadata; nothing expires on its own.
///
/// Commands accepted by [`submit`](Backend::submit) run on the next
/// [`process`](Backend::process), in submission order. That order is a
/// private choice of this backend, not part of the delivery contract.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    accounts: BTreeMap<String, AccountStore>,
    pending: VecDeque<Command>,
    max_pending: Option<usize>,
}

impl MemoryBackend {
    /// Create a memory backend. Only `max_pending` is read from the
    /// configuration.
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            max_pending: config.max_pending,
            ..Self::default()
        }
    }

    /// Commands accepted but not yet processed.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn drain_pending(&mut self) -> Vec<Delivery> {
        let mut out = Vec::new();
        while let Some(command) = self.pending.pop_front() {
            tracing::debug!(command = command.kind(), "executing command");
            self.execute(command, &mut out);
            out.push(Delivery::Complete);
        }
        out
    }

    fn execute(&mut self, command: Command, out: &mut Vec<Delivery>) {
        match command {
            Command::CreateMessage {
                account,
                queue,
                message_id,
                body,
                attributes,
            } => {
                let attributes = attributes.unwrap_or_default();
                let stored = StoredMessage {
                    body,
                    ttl: attributes.ttl(),
                    hide: attributes.hide(),
                };
                self.accounts
                    .entry(account)
                    .or_default()
                    .entry(queue)
                    .or_default()
                    .insert(message_id, stored);
            }
            Command::GetMessage {
                account,
                queue,
                message_id,
                ..
            } => {
                if let Some(stored) = self.message(&account, &queue, &message_id) {
                    out.push(Delivery::Message(to_message(&message_id, stored)));
                }
            }
            Command::UpdateMessage {
                account,
                queue,
                message_id,
                attributes,
                ..
            } => {
                match self.message_mut(&account, &queue, &message_id) {
                    Some(stored) => {
                        apply_attributes(stored, attributes.as_ref());
                        out.push(Delivery::Message(to_message(&message_id, stored)));
                    }
                    None => out.push(Delivery::log(
                        Verbosity::Warn,
                        format!("update_message: no message {message_id:?} in {account}/{queue}"),
                    )),
                }
            }
            Command::DeleteMessage {
                account,
                queue,
                message_id,
                ..
            } => {
                let removed = self
                    .accounts
                    .get_mut(&account)
                    .and_then(|queues| queues.get_mut(&queue))
                    .and_then(|messages| messages.remove(&message_id));
                if removed.is_none() {
                    out.push(Delivery::log(
                        Verbosity::Warn,
                        format!("delete_message: no message {message_id:?} in {account}/{queue}"),
                    ));
                }
                self.prune(&account, &queue);
            }
            Command::GetMessages {
                account,
                queue,
                filters,
            } => {
                for id in self.select_ids(&account, &queue, filters.as_ref()) {
                    if let Some(stored) = self.message(&account, &queue, &id) {
                        out.push(Delivery::Message(to_message(&id, stored)));
                    }
                }
            }
            Command::UpdateMessages {
                account,
                queue,
                attributes,
                filters,
            } => {
                for id in self.select_ids(&account, &queue, filters.as_ref()) {
                    if let Some(stored) = self.message_mut(&account, &queue, &id) {
                        apply_attributes(stored, attributes.as_ref());
                        out.push(Delivery::Message(to_message(&id, stored)));
                    }
                }
            }
            Command::DeleteMessages {
                account,
                queue,
                filters,
            } => {
                for id in self.select_ids(&account, &queue, filters.as_ref()) {
                    if let Some(queues) = self.accounts.get_mut(&account) {
                        if let Some(messages) = queues.get_mut(&queue) {
                            messages.remove(&id);
                        }
                    }
                }
                self.prune(&account, &queue);
            }
            Command::GetQueues { account, filters } => {
                let names = self
                    .accounts
                    .get(&account)
                    .map(|queues| filter_names(queues.keys(), filters.as_ref()))
                    .unwrap_or_default();
                if !names.is_empty() {
                    out.push(Delivery::Queues(names));
                }
            }
            Command::DeleteQueues { account, filters } => {
                if let Some(queues) = self.accounts.get_mut(&account) {
                    for name in filter_names(queues.keys(), filters.as_ref()) {
                        queues.remove(&name);
                    }
                    if queues.is_empty() {
                        self.accounts.remove(&account);
                    }
                }
            }
            Command::GetAccounts { filters } => {
                let names = filter_names(self.accounts.keys(), filters.as_ref());
                if !names.is_empty() {
                    out.push(Delivery::Accounts(names));
                }
            }
            Command::DeleteAccounts { filters } => {
                for name in filter_names(self.accounts.keys(), filters.as_ref()) {
                    self.accounts.remove(&name);
                }
            }
        }
    }

    fn message(&self, account: &str, queue: &str, id: &str) -> Option<&StoredMessage> {
        self.accounts.get(account)?.get(queue)?.get(id)
    }

    fn message_mut(&mut self, account: &str, queue: &str, id: &str) -> Option<&mut StoredMessage> {
        self.accounts.get_mut(account)?.get_mut(queue)?.get_mut(id)
    }

    /// Ids of the messages a multi-message operation addresses, selected
    /// before any mutation so a hidden message stays untouched even when
    /// the update would reveal it.
    fn select_ids(
        &self,
        account: &str,
        queue: &str,
        filters: Option<&MessageFilters>,
    ) -> Vec<String> {
        let Some(messages) = self.accounts.get(account).and_then(|queues| queues.get(queue))
        else {
            return Vec::new();
        };
        let match_hidden = filters.is_some_and(|f| f.match_hidden);
        let marker = filters.and_then(|f| f.marker.as_deref());
        let cap = filters.and_then(|f| f.limit).map_or(usize::MAX, |l| l as usize);

        let mut ids = Vec::new();
        for (id, stored) in messages {
            if ids.len() >= cap {
                break;
            }
            if stored.hide > 0 && !match_hidden {
                continue;
            }
            if let Some(marker) = marker {
                if id.as_str() <= marker {
                    continue;
                }
            }
            ids.push(id.clone());
        }
        ids
    }

    /// Drop the queue if it holds no messages, then the account if it
    /// holds no queues.
    fn prune(&mut self, account: &str, queue: &str) {
        if let Some(queues) = self.accounts.get_mut(account) {
            if queues.get(queue).is_some_and(BTreeMap::is_empty) {
                queues.remove(queue);
            }
            if queues.is_empty() {
                self.accounts.remove(account);
            }
        }
    }
}

impl Backend for MemoryBackend {
    fn submit(&mut self, command: Command) -> Result<()> {
        if let Some(max) = self.max_pending {
            if self.pending.len() >= max {
                return Err(WarrenError::SubmissionRejected(format!(
                    "{} refused: {} commands already pending (bound {max})",
                    command.kind(),
                    self.pending.len()
                )));
            }
        }
        tracing::debug!(command = command.kind(), "queued command");
        self.pending.push_back(command);
        Ok(())
    }

    fn process(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Delivery>>> + Send + '_>> {
        Box::pin(async move { Ok(self.drain_pending()) })
    }
}

fn apply_attributes(stored: &mut StoredMessage, attributes: Option<&MessageAttributes>) {
    let Some(attributes) = attributes else { return };
    if attributes.check(AttributeSet::TTL) {
        stored.ttl = attributes.ttl();
    }
    if attributes.check(AttributeSet::HIDE) {
        stored.hide = attributes.hide();
    }
}

fn to_message(id: &str, stored: &StoredMessage) -> Message {
    let attributes = MessageAttributes::new()
        .with_ttl(stored.ttl)
        .with_hide(stored.hide);
    Message::new(id, stored.body.clone(), attributes)
}

fn filter_names<'a, I>(names: I, filters: Option<&MessageFilters>) -> Vec<String>
where
    I: Iterator<Item = &'a String>,
{
    let marker = filters.and_then(|f| f.marker.as_deref());
    let cap = filters.and_then(|f| f.limit).map_or(usize::MAX, |l| l as usize);

    let mut out = Vec::new();
    for name in names {
        if out.len() >= cap {
            break;
        }
        if let Some(marker) = marker {
            if name.as_str() <= marker {
                continue;
            }
        }
        out.push(name.clone());
    }
    out
}
