use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::attributes::{AttributeSet, MessageAttributes};
use crate::backend::{Backend, BackendConfig};
use crate::command::Command;
use crate::delivery::{Delivery, Verbosity};
use crate::errors::{Result, WarrenError};
use crate::filters::MessageFilters;
use crate::message::Message;

const BASE_PATH: &str = "/v1.0";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A backend that talks to a queue server over HTTP.
///
/// Registered as `"http"`. The wire layout is this backend's own:
///
/// - accounts live at `{url}/v1.0`, queues at `{url}/v1.0/{account}`,
///   messages at `{url}/v1.0/{account}/{queue}[/{id}]`;
/// - GET enumerates or fetches, DELETE removes, PUT creates a message,
///   POST updates attributes;
/// - message bodies are base64 inside JSON documents, list responses are
///   wrapped objects (`{"queues": [...]}`), filters travel as query
///   parameters.
///
/// A 404 on a fetch is the ordinary empty result. A 404 on a single
/// update or delete yields a `Warn` log. Any other failure after
/// submission becomes an error-verbosity log delivery while the
/// command's completion still fires.
#[derive(Debug)]
pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
    headers: HashMap<String, String>,
    pending: VecDeque<Command>,
    max_pending: Option<usize>,
}

impl HttpBackend {
    /// Create an HTTP backend. `config.url` is required; `timeout`
    /// defaults to 30 seconds; `headers` are applied to every request.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| WarrenError::Builder("http backend requires a url".into()))?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()?;
        Ok(Self {
            base_url: url.trim_end_matches('/').to_string(),
            client,
            headers: config.headers.clone(),
            pending: VecDeque::new(),
            max_pending: config.max_pending,
        })
    }

    /// Build a URL under the versioned base path, percent-encoding each
    /// segment.
    fn url(&self, segments: &[&str]) -> String {
        let mut url = format!("{}{}", self.base_url, BASE_PATH);
        for segment in segments {
            url.push('/');
            url.push_str(&urlencoding::encode(segment));
        }
        url
    }

    async fn send(&self, mut req: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        for (key, value) in &self.headers {
            req = req.header(key.as_str(), value.as_str());
        }
        Ok(req.send().await?)
    }

    async fn execute(&self, command: &Command) -> Result<Vec<Delivery>> {
        match command {
            Command::CreateMessage {
                account,
                queue,
                message_id,
                body,
                attributes,
            } => {
                let dto = CreateMessageRequest {
                    body: general_purpose::STANDARD.encode(body),
                    ttl: assigned(attributes.as_ref(), AttributeSet::TTL, MessageAttributes::ttl),
                    hide: assigned(attributes.as_ref(), AttributeSet::HIDE, MessageAttributes::hide),
                };
                let url = self.url(&[account, queue, message_id]);
                let response = self.send(self.client.put(&url).json(&dto)).await?;
                match check_status(response).await? {
                    Some(_) => Ok(Vec::new()),
                    None => Err(WarrenError::Transport(format!("PUT {url} returned 404"))),
                }
            }
            Command::UpdateMessage {
                account,
                queue,
                message_id,
                attributes,
                filters,
            } => {
                let dto = attributes_request(attributes.as_ref());
                let req = self
                    .client
                    .post(self.url(&[account, queue, message_id]))
                    .query(&filter_query(filters.as_ref()))
                    .json(&dto);
                match check_status(self.send(req).await?).await? {
                    None => Ok(vec![Delivery::log(
                        Verbosity::Warn,
                        format!("update_message: no message {message_id:?} in {account}/{queue}"),
                    )]),
                    Some(response) => match parse_json::<MessageDto>(response).await? {
                        Some(dto) => Ok(vec![Delivery::Message(dto.into_message()?)]),
                        None => Ok(Vec::new()),
                    },
                }
            }
            Command::UpdateMessages {
                account,
                queue,
                attributes,
                filters,
            } => {
                let dto = attributes_request(attributes.as_ref());
                let req = self
                    .client
                    .post(self.url(&[account, queue]))
                    .query(&filter_query(filters.as_ref()))
                    .json(&dto);
                self.message_list(req).await
            }
            Command::GetMessage {
                account,
                queue,
                message_id,
                filters,
            } => {
                let req = self
                    .client
                    .get(self.url(&[account, queue, message_id]))
                    .query(&filter_query(filters.as_ref()));
                match check_status(self.send(req).await?).await? {
                    None => Ok(Vec::new()),
                    Some(response) => match parse_json::<MessageDto>(response).await? {
                        Some(dto) => Ok(vec![Delivery::Message(dto.into_message()?)]),
                        None => Ok(Vec::new()),
                    },
                }
            }
            Command::GetMessages {
                account,
                queue,
                filters,
            } => {
                let req = self
                    .client
                    .get(self.url(&[account, queue]))
                    .query(&filter_query(filters.as_ref()));
                self.message_list(req).await
            }
            Command::DeleteMessage {
                account,
                queue,
                message_id,
                filters,
            } => {
                let req = self
                    .client
                    .delete(self.url(&[account, queue, message_id]))
                    .query(&filter_query(filters.as_ref()));
                match check_status(self.send(req).await?).await? {
                    None => Ok(vec![Delivery::log(
                        Verbosity::Warn,
                        format!("delete_message: no message {message_id:?} in {account}/{queue}"),
                    )]),
                    Some(_) => Ok(Vec::new()),
                }
            }
            Command::DeleteMessages {
                account,
                queue,
                filters,
            } => {
                let req = self
                    .client
                    .delete(self.url(&[account, queue]))
                    .query(&filter_query(filters.as_ref()));
                check_status(self.send(req).await?).await?;
                Ok(Vec::new())
            }
            Command::GetQueues { account, filters } => {
                let req = self
                    .client
                    .get(self.url(&[account]))
                    .query(&filter_query(filters.as_ref()));
                match check_status(self.send(req).await?).await? {
                    None => Ok(Vec::new()),
                    Some(response) => {
                        let names = parse_json::<QueuesResponse>(response)
                            .await?
                            .map(|r| r.queues)
                            .unwrap_or_default();
                        Ok(if names.is_empty() {
                            Vec::new()
                        } else {
                            vec![Delivery::Queues(names)]
                        })
                    }
                }
            }
            Command::DeleteQueues { account, filters } => {
                let req = self
                    .client
                    .delete(self.url(&[account]))
                    .query(&filter_query(filters.as_ref()));
                check_status(self.send(req).await?).await?;
                Ok(Vec::new())
            }
            Command::GetAccounts { filters } => {
                let req = self
                    .client
                    .get(self.url(&[]))
                    .query(&filter_query(filters.as_ref()));
                match check_status(self.send(req).await?).await? {
                    None => Ok(Vec::new()),
                    Some(response) => {
                        let names = parse_json::<AccountsResponse>(response)
                            .await?
                            .map(|r| r.accounts)
                            .unwrap_or_default();
                        Ok(if names.is_empty() {
                            Vec::new()
                        } else {
                            vec![Delivery::Accounts(names)]
                        })
                    }
                }
            }
            Command::DeleteAccounts { filters } => {
                let req = self
                    .client
                    .delete(self.url(&[]))
                    .query(&filter_query(filters.as_ref()));
                check_status(self.send(req).await?).await?;
                Ok(Vec::new())
            }
        }
    }

    /// Shared path for operations answered with a wrapped message list.
    /// A 404 is the empty result.
    async fn message_list(&self, req: reqwest::RequestBuilder) -> Result<Vec<Delivery>> {
        match check_status(self.send(req).await?).await? {
            None => Ok(Vec::new()),
            Some(response) => {
                let dtos = parse_json::<MessagesResponse>(response)
                    .await?
                    .map(|r| r.messages)
                    .unwrap_or_default();
                dtos.into_iter()
                    .map(|dto| Ok(Delivery::Message(dto.into_message()?)))
                    .collect()
            }
        }
    }
}

impl Backend for HttpBackend {
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
        Box::pin(async move {
            let commands: Vec<Command> = self.pending.drain(..).collect();
            let mut out = Vec::new();
            for command in commands {
                tracing::debug!(command = command.kind(), "executing command");
                match self.execute(&command).await {
                    Ok(mut deliveries) => out.append(&mut deliveries),
                    Err(err) => out.push(Delivery::log(
                        Verbosity::Error,
                        format!("{} failed: {err}", command.kind()),
                    )),
                }
                out.push(Delivery::Complete);
            }
            Ok(out)
        })
    }
}

// ---------------------------------------------------------------------------
// Status and body handling
// ---------------------------------------------------------------------------

/// `Ok(None)` on 404, the response on success, `Err` otherwise.
async fn check_status(response: reqwest::Response) -> Result<Option<reqwest::Response>> {
    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {body}")
        };
        return Err(WarrenError::Transport(message));
    }
    Ok(Some(response))
}

/// Parse a JSON body, treating an empty body as absent.
async fn parse_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<Option<T>> {
    let body = response.bytes().await?;
    if body.is_empty() {
        return Ok(None);
    }
    serde_json::from_slice(&body)
        .map(Some)
        .map_err(|e| {
            WarrenError::Serialization(format!(
                "failed to parse response: {} (body: {})",
                e,
                String::from_utf8_lossy(&body)
            ))
        })
}

fn assigned(
    attributes: Option<&MessageAttributes>,
    bit: AttributeSet,
    field: fn(&MessageAttributes) -> u32,
) -> Option<u32> {
    attributes.filter(|a| a.check(bit)).map(field)
}

fn attributes_request(attributes: Option<&MessageAttributes>) -> AttributesRequest {
    AttributesRequest {
        ttl: assigned(attributes, AttributeSet::TTL, MessageAttributes::ttl),
        hide: assigned(attributes, AttributeSet::HIDE, MessageAttributes::hide),
    }
}

fn filter_query(filters: Option<&MessageFilters>) -> Vec<(&'static str, String)> {
    let mut query = Vec::new();
    let Some(filters) = filters else {
        return query;
    };
    if let Some(marker) = &filters.marker {
        query.push(("marker", marker.clone()));
    }
    if let Some(limit) = filters.limit {
        query.push(("limit", limit.to_string()));
    }
    if filters.match_hidden {
        query.push(("match_hidden", "true".to_string()));
    }
    if let Some(wait) = filters.wait {
        query.push(("wait", wait.to_string()));
    }
    query
}

// ---------------------------------------------------------------------------
// Wire DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct CreateMessageRequest {
    body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hide: Option<u32>,
}

#[derive(Debug, Serialize)]
struct AttributesRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hide: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct MessageDto {
    id: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    ttl: Option<u32>,
    #[serde(default)]
    hide: Option<u32>,
}

impl MessageDto {
    fn into_message(self) -> Result<Message> {
        let body = match self.body {
            Some(encoded) => general_purpose::STANDARD
                .decode(encoded.as_bytes())
                .map_err(|e| {
                    WarrenError::Serialization(format!("invalid base64 message body: {e}"))
                })?,
            None => Vec::new(),
        };
        let mut attributes = MessageAttributes::new();
        if let Some(ttl) = self.ttl {
            attributes.set_ttl(ttl);
        }
        if let Some(hide) = self.hide {
            attributes.set_hide(hide);
        }
        Ok(Message::new(self.id, body, attributes))
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    messages: Vec<MessageDto>,
}

#[derive(Debug, Deserialize)]
struct QueuesResponse {
    queues: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AccountsResponse {
    accounts: Vec<String>,
}
