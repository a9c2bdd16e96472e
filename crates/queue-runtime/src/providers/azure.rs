//! Azure Storage Queue provider implementation.
//!
//! Talks to the Queue service REST API directly over HTTP:
//! - Shared Key authorization (HMAC-SHA256 over the canonical request)
//! - Connection string parsing, including the local storage emulator
//! - XML response parsing for message lists and service errors
//!
//! ## Message Encoding
//!
//! Message bodies are sent base64-encoded in the `MessageText` element, which is
//! what the storage SDKs do by default, so binary payloads survive the XML
//! transport.
//!
//! ## Example
//!
//! ```no_run
//! use queue_runtime::{AzureStorageQueueConfig, ProviderConfig, QueueClientFactory, QueueConfig, QueueName};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = QueueConfig {
//!     provider: ProviderConfig::AzureStorageQueue(AzureStorageQueueConfig::from_connection_string(
//!         "UseDevelopmentStorage=true",
//!     )),
//! };
//!
//! let client = QueueClientFactory::create_client(&config, QueueName::new("work-items".to_string())?)?;
//! client.create_if_not_exists().await?;
//! # Ok(())
//! # }
//! ```

use crate::client::QueueProvider;
use crate::error::{ConfigurationError, QueueError, SerializationError, ValidationError};
use crate::message::{Message, MessageId, QueueName, ReceiptHandle, ReceivedMessage, Timestamp};
use crate::provider::{AzureStorageQueueConfig, ProviderType};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client as HttpClient, Method, StatusCode};
use sha2::Sha256;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};
use url::Url;

#[cfg(test)]
#[path = "azure_tests.rs"]
mod tests;

/// REST API version sent with every request
const STORAGE_API_VERSION: &str = "2020-10-02";

/// Account name used by the local storage emulator
const DEVELOPMENT_ACCOUNT_NAME: &str = "devstoreaccount1";

/// Well-known, publicly documented key of the local storage emulator
const DEVELOPMENT_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

/// Queue endpoint of the local storage emulator
const DEVELOPMENT_QUEUE_ENDPOINT: &str = "http://127.0.0.1:10001/devstoreaccount1";

// ============================================================================
// Error Types
// ============================================================================

/// Azure Storage Queue specific errors
#[derive(Debug, thiserror::Error)]
pub enum AzureStorageError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("Storage service error: {code} - {message}")]
    ServiceError { code: String, message: String },

    #[error("Invalid configuration: {0}")]
    ConfigurationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] SerializationError),
}

impl AzureStorageError {
    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Authentication(_) => false,
            Self::NetworkError(_) => true,
            Self::Timeout(_) => true,
            Self::QueueNotFound(_) => false,
            Self::MessageNotFound(_) => false,
            Self::ServiceError { .. } => true,
            Self::ConfigurationError(_) => false,
            Self::SerializationError(_) => false,
        }
    }

    /// Map Azure error to QueueError
    pub fn to_queue_error(self) -> QueueError {
        match self {
            Self::Authentication(message) => QueueError::AuthenticationFailed { message },
            Self::NetworkError(message) => QueueError::ConnectionFailed { message },
            Self::Timeout(secs) => QueueError::Timeout {
                duration: Duration::seconds(secs as i64),
            },
            Self::QueueNotFound(queue_name) => QueueError::QueueNotFound { queue_name },
            Self::MessageNotFound(receipt) => QueueError::MessageNotFound { receipt },
            Self::ServiceError { code, message } => QueueError::ProviderError {
                provider: ProviderType::AzureStorageQueue.to_string(),
                code,
                message,
            },
            Self::ConfigurationError(message) => {
                QueueError::ConfigurationError(ConfigurationError::Invalid { message })
            }
            Self::SerializationError(e) => QueueError::SerializationError(e),
        }
    }
}

// ============================================================================
// Connection String
// ============================================================================

/// Storage account coordinates parsed from a connection string
#[derive(Clone, PartialEq, Eq)]
pub struct StorageAccount {
    account_name: String,
    account_key: Vec<u8>,
    queue_endpoint: Url,
}

impl StorageAccount {
    /// Parse a storage connection string.
    ///
    /// Accepts `DefaultEndpointsProtocol`, `AccountName`, `AccountKey`,
    /// `EndpointSuffix`, `QueueEndpoint` and `UseDevelopmentStorage=true`.
    pub fn parse(connection_string: &str) -> Result<Self, ConfigurationError> {
        let mut protocol = None;
        let mut account_name = None;
        let mut account_key = None;
        let mut endpoint_suffix = None;
        let mut queue_endpoint = None;
        let mut development = false;

        for segment in connection_string.split(';').map(str::trim) {
            if segment.is_empty() {
                continue;
            }

            let (key, value) = segment.split_once('=').ok_or_else(|| ConfigurationError::Parsing {
                message: format!("connection string segment '{}' is not key=value", segment),
            })?;

            match key.trim().to_ascii_lowercase().as_str() {
                "defaultendpointsprotocol" => protocol = Some(value.trim().to_string()),
                "accountname" => account_name = Some(value.trim().to_string()),
                "accountkey" => account_key = Some(value.trim().to_string()),
                "endpointsuffix" => endpoint_suffix = Some(value.trim().to_string()),
                "queueendpoint" => queue_endpoint = Some(value.trim().to_string()),
                "usedevelopmentstorage" => development = value.trim().eq_ignore_ascii_case("true"),
                "sharedaccesssignature" => {
                    return Err(ConfigurationError::Invalid {
                        message: "shared access signature credentials are not supported; use an account key"
                            .to_string(),
                    })
                }
                // Endpoints for other storage services are irrelevant here.
                _ => {}
            }
        }

        if development {
            account_name.get_or_insert_with(|| DEVELOPMENT_ACCOUNT_NAME.to_string());
            account_key.get_or_insert_with(|| DEVELOPMENT_ACCOUNT_KEY.to_string());
            queue_endpoint.get_or_insert_with(|| DEVELOPMENT_QUEUE_ENDPOINT.to_string());
        }

        let account_name = account_name.ok_or_else(|| ConfigurationError::Missing {
            key: "AccountName".to_string(),
        })?;
        let account_key = account_key.ok_or_else(|| ConfigurationError::Missing {
            key: "AccountKey".to_string(),
        })?;
        let account_key = STANDARD
            .decode(account_key)
            .map_err(|e| ConfigurationError::Invalid {
                message: format!("AccountKey is not valid base64: {}", e),
            })?;

        let endpoint = match queue_endpoint {
            Some(endpoint) => endpoint,
            None => format!(
                "{}://{}.queue.{}",
                protocol.as_deref().unwrap_or("https"),
                account_name,
                endpoint_suffix.as_deref().unwrap_or("core.windows.net")
            ),
        };
        let queue_endpoint = Url::parse(&endpoint).map_err(|e| ConfigurationError::Invalid {
            message: format!("queue endpoint '{}' is not a valid URL: {}", endpoint, e),
        })?;

        Ok(Self {
            account_name,
            account_key,
            queue_endpoint,
        })
    }

    /// Storage account name
    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    /// Base URL of the Queue service
    pub fn queue_endpoint(&self) -> &Url {
        &self.queue_endpoint
    }

    /// URL of `queue`, optionally followed by extra path segments
    fn queue_url(&self, queue: &QueueName, suffix: &str) -> Result<Url, AzureStorageError> {
        let raw = format!(
            "{}/{}{}",
            self.queue_endpoint.as_str().trim_end_matches('/'),
            queue.as_str(),
            suffix
        );
        Url::parse(&raw).map_err(|e| {
            AzureStorageError::ConfigurationError(format!("invalid queue URL '{}': {}", raw, e))
        })
    }
}

// Never let the key reach a log line.
impl fmt::Debug for StorageAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageAccount")
            .field("account_name", &self.account_name)
            .field("account_key", &"<redacted>")
            .field("queue_endpoint", &self.queue_endpoint.as_str())
            .finish()
    }
}

// ============================================================================
// Shared Key Signing
// ============================================================================

type HmacSha256 = Hmac<Sha256>;

/// Shared Key request signer for the Queue service
///
/// Implements the Shared Key authorization scheme:
/// 1. Build the string to sign (verb, standard headers, canonical headers, canonical resource)
/// 2. HMAC-SHA256 it with the decoded account key
/// 3. Send `SharedKey {account}:{base64 signature}` as the Authorization header
///
/// ## References
///
/// - [Authorize with Shared Key](https://learn.microsoft.com/rest/api/storageservices/authorize-with-shared-key)
#[derive(Clone)]
struct SharedKeySigner {
    account_name: String,
    account_key: Vec<u8>,
}

impl SharedKeySigner {
    fn new(account: &StorageAccount) -> Self {
        Self {
            account_name: account.account_name.clone(),
            account_key: account.account_key.clone(),
        }
    }

    /// Build the canonical string to sign.
    ///
    /// `ms_headers` holds the `x-ms-*` headers sent with the request.
    fn string_to_sign(
        &self,
        method: &Method,
        url: &Url,
        content_length: usize,
        ms_headers: &[(&str, String)],
    ) -> String {
        // Content-Length is signed as an empty string when zero.
        let content_length = if content_length == 0 {
            String::new()
        } else {
            content_length.to_string()
        };

        let mut canonical_headers = ms_headers
            .iter()
            .map(|(name, value)| format!("{}:{}\n", name.to_ascii_lowercase(), value.trim()))
            .collect::<Vec<_>>();
        canonical_headers.sort();

        format!(
            "{}\n\n\n{}\n\n\n\n\n\n\n\n\n{}{}",
            method.as_str(),
            content_length,
            canonical_headers.concat(),
            self.canonical_resource(url)
        )
    }

    /// Account-qualified path followed by sorted, decoded query parameters
    fn canonical_resource(&self, url: &Url) -> String {
        let mut resource = format!("/{}{}", self.account_name, url.path());

        let mut params: Vec<(String, Vec<String>)> = Vec::new();
        for (name, value) in url.query_pairs() {
            let name = name.to_ascii_lowercase();
            match params.iter_mut().find(|(existing, _)| *existing == name) {
                Some((_, values)) => values.push(value.into_owned()),
                None => params.push((name, vec![value.into_owned()])),
            }
        }
        params.sort_by(|a, b| a.0.cmp(&b.0));

        for (name, mut values) in params {
            values.sort();
            resource.push_str(&format!("\n{}:{}", name, values.join(",")));
        }

        resource
    }

    /// Compute the Authorization header value for a string to sign
    fn authorization(&self, string_to_sign: &str) -> Result<String, AzureStorageError> {
        let mut mac = HmacSha256::new_from_slice(&self.account_key).map_err(|e| {
            AzureStorageError::ConfigurationError(format!("unusable account key: {}", e))
        })?;
        mac.update(string_to_sign.as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());

        Ok(format!("SharedKey {}:{}", self.account_name, signature))
    }
}

/// RFC 1123 date used by the `x-ms-date` header
fn rfc1123(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

// ============================================================================
// XML Payloads
// ============================================================================

/// A `QueueMessage` element from a Get Messages or Put Message response
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct QueueMessageXml {
    message_id: Option<String>,
    insertion_time: Option<String>,
    expiration_time: Option<String>,
    pop_receipt: Option<String>,
    time_next_visible: Option<String>,
    dequeue_count: Option<String>,
    message_text: Option<String>,
}

/// Parse a `QueueMessagesList` document
fn parse_queue_messages(xml: &str) -> Result<Vec<QueueMessageXml>, SerializationError> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut messages = Vec::new();
    let mut current: Option<QueueMessageXml> = None;
    let mut element: Option<Vec<u8>> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                if e.name().as_ref() == b"QueueMessage" {
                    current = Some(QueueMessageXml::default());
                } else {
                    element = Some(e.name().as_ref().to_vec());
                }
            }
            Ok(Event::Text(e)) => {
                if let (Some(message), Some(name)) = (current.as_mut(), element.as_deref()) {
                    let text = e
                        .unescape()
                        .map_err(|e| SerializationError::InvalidXml {
                            message: e.to_string(),
                        })?
                        .into_owned();
                    match name {
                        b"MessageId" => message.message_id = Some(text),
                        b"InsertionTime" => message.insertion_time = Some(text),
                        b"ExpirationTime" => message.expiration_time = Some(text),
                        b"PopReceipt" => message.pop_receipt = Some(text),
                        b"TimeNextVisible" => message.time_next_visible = Some(text),
                        b"DequeueCount" => message.dequeue_count = Some(text),
                        b"MessageText" => message.message_text = Some(text),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                if e.name().as_ref() == b"QueueMessage" {
                    if let Some(message) = current.take() {
                        messages.push(message);
                    }
                }
                element = None;
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SerializationError::InvalidXml {
                    message: e.to_string(),
                })
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(messages)
}

/// Parse a service error document into an error code and message
fn parse_error_document(xml: &str) -> (Option<String>, Option<String>) {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut error_code = None;
    let mut error_message = None;
    let mut in_code = false;
    let mut in_message = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"Code" => in_code = true,
                b"Message" => in_message = true,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_code {
                    error_code = e.unescape().ok().map(|s| s.into_owned());
                    in_code = false;
                } else if in_message {
                    error_message = e.unescape().ok().map(|s| s.into_owned());
                    in_message = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    (error_code, error_message)
}

/// Map a failed response onto a provider error
fn classify_error_response(status: StatusCode, body: &str) -> AzureStorageError {
    let (code, message) = parse_error_document(body);
    let code = code.unwrap_or_else(|| status.as_u16().to_string());
    // The service appends request ids on further lines.
    let message = message
        .map(|m| m.lines().next().unwrap_or_default().to_string())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string()
        });

    match code.as_str() {
        "QueueNotFound" => AzureStorageError::QueueNotFound(message),
        "MessageNotFound" | "PopReceiptMismatch" => AzureStorageError::MessageNotFound(message),
        "AuthenticationFailed" | "AuthorizationFailure" | "InsufficientAccountPermissions" => {
            AzureStorageError::Authentication(format!("{}: {}", code, message))
        }
        _ if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN => {
            AzureStorageError::Authentication(format!("{}: {}", code, message))
        }
        _ => AzureStorageError::ServiceError { code, message },
    }
}

fn parse_storage_time(field: &str, value: Option<&String>) -> Result<Timestamp, SerializationError> {
    let value = value.ok_or_else(|| SerializationError::MissingElement {
        element: field.to_string(),
    })?;
    DateTime::parse_from_rfc2822(value)
        .map(|dt| Timestamp::from_datetime(dt.with_timezone(&Utc)))
        .map_err(|e| SerializationError::InvalidXml {
            message: format!("{} '{}' is not an RFC 1123 date: {}", field, value, e),
        })
}

fn required<'a>(field: &str, value: &'a Option<String>) -> Result<&'a str, SerializationError> {
    value
        .as_deref()
        .ok_or_else(|| SerializationError::MissingElement {
            element: field.to_string(),
        })
}

impl QueueMessageXml {
    fn into_received_message(self) -> Result<ReceivedMessage, SerializationError> {
        let message_id = MessageId::from_str(required("MessageId", &self.message_id)?).map_err(
            |_| SerializationError::MissingElement {
                element: "MessageId".to_string(),
            },
        )?;
        let pop_receipt = required("PopReceipt", &self.pop_receipt)?.to_string();
        let text = self.message_text.unwrap_or_default();
        let body = match STANDARD.decode(&text) {
            Ok(decoded) => decoded,
            Err(e) => {
                // Messages written by other producers may carry plain text.
                warn!(
                    message_id = %message_id,
                    error = %e,
                    "Message text is not base64, delivering it unchanged"
                );
                text.into_bytes()
            }
        };
        let delivery_count = self
            .dequeue_count
            .as_deref()
            .and_then(|count| count.parse().ok())
            .unwrap_or(1);
        let inserted_at = parse_storage_time("InsertionTime", self.insertion_time.as_ref())?;
        let next_visible_at = parse_storage_time("TimeNextVisible", self.time_next_visible.as_ref())?;

        Ok(ReceivedMessage {
            receipt_handle: ReceiptHandle::new(
                message_id.clone(),
                pop_receipt,
                ProviderType::AzureStorageQueue,
            ),
            message_id,
            body: Bytes::from(body),
            delivery_count,
            inserted_at,
            next_visible_at,
        })
    }
}

/// Clamp a duration into whole seconds accepted by the service
fn duration_seconds(field: &str, duration: Duration, minimum: i64) -> Result<i64, ValidationError> {
    let seconds = duration.num_seconds();
    if seconds < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            message: "must not be negative".to_string(),
        });
    }

    let maximum = ProviderType::AzureStorageQueue.max_visibility_timeout_seconds();
    if seconds > maximum {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            message: format!("must be at most {} seconds", maximum),
        });
    }

    Ok(seconds.max(minimum))
}

// ============================================================================
// Azure Storage Queue Provider
// ============================================================================

/// Azure Storage Queue provider implementation
///
/// This provider implements the QueueProvider trait over the Queue service
/// REST API. It is stateless apart from the HTTP connection pool and can be
/// shared across tasks using `Arc`.
pub struct AzureStorageQueueProvider {
    http_client: HttpClient,
    signer: SharedKeySigner,
    account: StorageAccount,
    config: AzureStorageQueueConfig,
}

impl AzureStorageQueueProvider {
    /// Create new Azure Storage Queue provider
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The connection string is malformed or lacks credentials
    /// - The HTTP client cannot be constructed
    pub fn new(config: AzureStorageQueueConfig) -> Result<Self, QueueError> {
        let account = StorageAccount::parse(&config.connection_string)?;

        let http_client = HttpClient::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| QueueError::ConnectionFailed {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            http_client,
            signer: SharedKeySigner::new(&account),
            account,
            config,
        })
    }

    /// Make a signed HTTP request, returning status and body of a successful response
    async fn make_request(
        &self,
        method: Method,
        url: Url,
        body: Option<String>,
    ) -> Result<(StatusCode, String), AzureStorageError> {
        let ms_headers = vec![
            ("x-ms-date", rfc1123(&Utc::now())),
            ("x-ms-version", STORAGE_API_VERSION.to_string()),
        ];
        let content_length = body.as_ref().map(|b| b.len()).unwrap_or(0);
        let string_to_sign = self
            .signer
            .string_to_sign(&method, &url, content_length, &ms_headers);
        let authorization = self.signer.authorization(&string_to_sign)?;

        debug!(method = %method, url = %url, "Sending storage queue request");

        let mut request = self
            .http_client
            .request(method, url)
            .header("Authorization", authorization);
        for (name, value) in ms_headers {
            request = request.header(name, value);
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AzureStorageError::Timeout(self.config.request_timeout_seconds)
            } else if e.is_connect() {
                AzureStorageError::NetworkError(format!("Connection failed: {}", e))
            } else {
                AzureStorageError::NetworkError(format!("HTTP request failed: {}", e))
            }
        })?;

        let status = response.status();
        let response_body = response.text().await.map_err(|e| {
            AzureStorageError::NetworkError(format!("Failed to read response body: {}", e))
        })?;

        if !status.is_success() {
            return Err(classify_error_response(status, &response_body));
        }

        Ok((status, response_body))
    }
}

impl fmt::Debug for AzureStorageQueueProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureStorageQueueProvider")
            .field("account", &self.account)
            .field("config", &self.config)
            .finish()
    }
}

#[async_trait]
impl QueueProvider for AzureStorageQueueProvider {
    async fn create_queue_if_not_exists(&self, queue: &QueueName) -> Result<bool, QueueError> {
        let url = self
            .account
            .queue_url(queue, "")
            .map_err(|e| e.to_queue_error())?;

        match self.make_request(Method::PUT, url, None).await {
            Ok((status, _)) => Ok(status == StatusCode::CREATED),
            // Exists with different metadata; still usable.
            Err(AzureStorageError::ServiceError { code, .. }) if code == "QueueAlreadyExists" => {
                Ok(false)
            }
            Err(e) => Err(e.to_queue_error()),
        }
    }

    async fn receive_message(
        &self,
        queue: &QueueName,
        visibility_timeout: Duration,
    ) -> Result<Option<ReceivedMessage>, QueueError> {
        let visibility = duration_seconds("visibility_timeout", visibility_timeout, 1)?;

        let mut url = self
            .account
            .queue_url(queue, "/messages")
            .map_err(|e| e.to_queue_error())?;
        url.query_pairs_mut()
            .append_pair("numofmessages", "1")
            .append_pair("visibilitytimeout", &visibility.to_string());

        let (_, body) = self
            .make_request(Method::GET, url, None)
            .await
            .map_err(|e| match e {
                AzureStorageError::QueueNotFound(_) => QueueError::QueueNotFound {
                    queue_name: queue.to_string(),
                },
                other => other.to_queue_error(),
            })?;

        let message = parse_queue_messages(&body)?
            .into_iter()
            .next()
            .map(QueueMessageXml::into_received_message)
            .transpose()?;

        Ok(message)
    }

    async fn delete_message(
        &self,
        queue: &QueueName,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueError> {
        let mut url = self
            .account
            .queue_url(queue, &format!("/messages/{}", receipt.message_id()))
            .map_err(|e| e.to_queue_error())?;
        url.query_pairs_mut()
            .append_pair("popreceipt", receipt.handle());

        self.make_request(Method::DELETE, url, None)
            .await
            .map_err(|e| match e {
                AzureStorageError::MessageNotFound(_) => QueueError::MessageNotFound {
                    receipt: receipt.to_string(),
                },
                other => other.to_queue_error(),
            })?;

        Ok(())
    }

    async fn send_message(
        &self,
        queue: &QueueName,
        message: &Message,
        initial_visibility_delay: Duration,
    ) -> Result<MessageId, QueueError> {
        let visibility = duration_seconds("initial_visibility_delay", initial_visibility_delay, 0)?;

        let encoded = STANDARD.encode(&message.body);
        let max_size = self.provider_type().max_message_size();
        if encoded.len() > max_size {
            return Err(QueueError::MessageTooLarge {
                size: encoded.len(),
                max_size,
            });
        }

        let mut url = self
            .account
            .queue_url(queue, "/messages")
            .map_err(|e| e.to_queue_error())?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("visibilitytimeout", &visibility.to_string());
            if let Some(ttl) = message.time_to_live {
                query.append_pair("messagettl", &ttl.num_seconds().to_string());
            }
        }

        let body = format!(
            "<QueueMessage><MessageText>{}</MessageText></QueueMessage>",
            encoded
        );

        let (_, response) = self
            .make_request(Method::POST, url, Some(body))
            .await
            .map_err(|e| match e {
                AzureStorageError::QueueNotFound(_) => QueueError::QueueNotFound {
                    queue_name: queue.to_string(),
                },
                other => other.to_queue_error(),
            })?;

        let created = parse_queue_messages(&response)?;
        let message_id = created
            .first()
            .and_then(|m| m.message_id.as_deref())
            .ok_or_else(|| SerializationError::MissingElement {
                element: "MessageId".to_string(),
            })?;

        Ok(MessageId::from_str(message_id)?)
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::AzureStorageQueue
    }
}
