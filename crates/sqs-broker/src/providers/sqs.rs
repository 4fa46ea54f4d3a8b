//! AWS SQS gateway over the SQS query API.
//!
//! Requests are form-encoded `POST`s signed with AWS Signature Version 4 and
//! responses are XML. Talking HTTP directly keeps the provider testable
//! against a mocked endpoint.
//!
//! ## Credentials
//!
//! Explicit keys from [`SqsGatewayConfig`], usually read from the standard
//! `AWS_*` environment variables by [`SqsGatewayConfig::from_env`]. A gateway
//! without credentials can be built, but every call fails with
//! [`QueueError::AuthenticationFailed`].
//!
//! ## Example
//!
//! ```no_run
//! use sqs_broker::providers::{SqsGateway, SqsGatewayConfig};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let gateway = SqsGateway::new(SqsGatewayConfig::from_env("eu-west-1"))?;
//! # Ok(())
//! # }
//! ```

use crate::config::SERVICE_BATCH_LIMIT;
use crate::error::{ConfigurationError, QueueError, SerializationError};
use crate::gateway::QueueGateway;
use crate::message::{
    BatchResultErrorEntry, MessageAttributeValue, OutboundMessage, ReceiptHandle, ReceiveRequest,
    ReceivedMessage, SendBatchOutput, SendBatchResultEntry,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;
use tracing::debug;

#[cfg(test)]
#[path = "sqs_tests.rs"]
mod tests;

const API_VERSION: &str = "2012-11-05";
const PROVIDER_NAME: &str = "AwsSqs";

// ============================================================================
// Configuration
// ============================================================================

/// Connection settings for [`SqsGateway`]
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqsGatewayConfig {
    pub region: String,
    /// Overrides `https://sqs.{region}.amazonaws.com`, e.g. for LocalStack
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    /// HTTP timeout; must exceed the long-polling wait
    pub request_timeout_seconds: u64,
}

impl Default for SqsGatewayConfig {
    fn default() -> Self {
        Self {
            region: crate::config::default_region(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            request_timeout_seconds: 30,
        }
    }
}

impl SqsGatewayConfig {
    /// Configuration for `region` with credentials and endpoint from the
    /// standard AWS environment variables
    pub fn from_env(region: &str) -> Self {
        let var = |key: &str| std::env::var(key).ok().filter(|value| !value.is_empty());

        Self {
            region: region.to_string(),
            endpoint: var("AWS_ENDPOINT_URL_SQS").or_else(|| var("AWS_ENDPOINT_URL")),
            access_key_id: var("AWS_ACCESS_KEY_ID"),
            secret_access_key: var("AWS_SECRET_ACCESS_KEY"),
            session_token: var("AWS_SESSION_TOKEN"),
            ..Self::default()
        }
    }
}

impl fmt::Debug for SqsGatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqsGatewayConfig")
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Failures specific to the SQS HTTP exchange
#[derive(Debug, thiserror::Error)]
enum SqsError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Invalid receipt handle: {0}")]
    InvalidReceipt(String),

    #[error("SQS service error: {code} - {message}")]
    Service { code: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SqsError {
    fn into_queue_error(self) -> QueueError {
        match self {
            Self::Authentication(message) => QueueError::AuthenticationFailed { message },
            Self::Network(message) => QueueError::ConnectionFailed { message },
            Self::Timeout(duration) => QueueError::Timeout { duration },
            Self::QueueNotFound(queue_url) => QueueError::QueueNotFound { queue_url },
            Self::InvalidReceipt(receipt) => QueueError::ReceiptHandleInvalid { receipt },
            Self::Service { code, message } => QueueError::ProviderError {
                provider: PROVIDER_NAME.to_string(),
                code,
                message,
            },
            Self::Serialization(message) => {
                QueueError::SerializationError(SerializationError::Xml { message })
            }
        }
    }
}

fn xml_error(error: impl fmt::Display) -> SqsError {
    SqsError::Serialization(format!("XML parsing error: {}", error))
}

// ============================================================================
// AWS Signature V4 Signing
// ============================================================================

type HmacSha256 = Hmac<Sha256>;

/// AWS Signature Version 4 signer
///
/// 1. Canonical request (method, URI, query, headers, payload hash)
/// 2. String to sign (algorithm, timestamp, scope, request hash)
/// 3. Signing key (4-level HMAC chain)
/// 4. Signature and `Authorization` header
#[derive(Clone)]
struct AwsV4Signer {
    access_key: String,
    secret_key: String,
    session_token: Option<String>,
    region: String,
    service: String,
}

impl AwsV4Signer {
    fn new(
        access_key: String,
        secret_key: String,
        session_token: Option<String>,
        region: String,
    ) -> Self {
        Self {
            access_key,
            secret_key,
            session_token,
            region,
            service: "sqs".to_string(),
        }
    }

    /// Headers to add to a `POST /` request carrying `body`
    fn sign_request(
        &self,
        host: &str,
        body: &str,
        timestamp: &DateTime<Utc>,
    ) -> Vec<(String, String)> {
        let date_stamp = timestamp.format("%Y%m%d").to_string();
        let amz_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();

        // Canonical headers must be lowercase and sorted by name
        let mut canonical_headers = format!("host:{}\nx-amz-date:{}\n", host, amz_date);
        let mut signed_headers = "host;x-amz-date".to_string();
        if let Some(token) = &self.session_token {
            canonical_headers.push_str(&format!("x-amz-security-token:{}\n", token));
            signed_headers.push_str(";x-amz-security-token");
        }

        let payload_hash = format!("{:x}", Sha256::digest(body.as_bytes()));

        let canonical_request = format!(
            "POST\n/\n\n{}\n{}\n{}",
            canonical_headers, signed_headers, payload_hash
        );

        let algorithm = "AWS4-HMAC-SHA256";
        let credential_scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp, self.region, self.service
        );
        let canonical_request_hash = format!("{:x}", Sha256::digest(canonical_request.as_bytes()));

        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            algorithm, amz_date, credential_scope, canonical_request_hash
        );

        let signature = self.calculate_signature(&string_to_sign, &date_stamp);

        let authorization_header = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            algorithm, self.access_key, credential_scope, signed_headers, signature
        );

        let mut headers = vec![
            ("Authorization".to_string(), authorization_header),
            ("x-amz-date".to_string(), amz_date),
        ];
        if let Some(token) = &self.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers
    }

    /// kSigning = HMAC(HMAC(HMAC(HMAC("AWS4" + secret, date), region), service), "aws4_request")
    fn calculate_signature(&self, string_to_sign: &str, date_stamp: &str) -> String {
        let k_secret = format!("AWS4{}", self.secret_key);
        let k_date = hmac_sha256(k_secret.as_bytes(), date_stamp.as_bytes());
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, self.service.as_bytes());
        let k_signing = hmac_sha256(&k_service, b"aws4_request");
        let signature = hmac_sha256(&k_signing, string_to_sign.as_bytes());

        hex::encode(signature)
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

// ============================================================================
// SQS Gateway
// ============================================================================

/// [`QueueGateway`] backed by AWS SQS.
///
/// Holds only immutable state and a pooled HTTP client; share it across tasks
/// with `Arc`.
pub struct SqsGateway {
    http_client: HttpClient,
    signer: Option<AwsV4Signer>,
    config: SqsGatewayConfig,
    endpoint: String,
    host: String,
}

impl SqsGateway {
    /// Create a gateway from configuration
    ///
    /// # Errors
    ///
    /// - region empty or endpoint not a valid URL
    /// - HTTP client construction fails
    pub fn new(config: SqsGatewayConfig) -> Result<Self, QueueError> {
        if config.region.is_empty() {
            return Err(ConfigurationError::Missing {
                key: "region".to_string(),
            }
            .into());
        }

        let signer = match (&config.access_key_id, &config.secret_access_key) {
            (Some(access_key), Some(secret_key)) => Some(AwsV4Signer::new(
                access_key.clone(),
                secret_key.clone(),
                config.session_token.clone(),
                config.region.clone(),
            )),
            _ => None,
        };

        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://sqs.{}.amazonaws.com", config.region));
        let endpoint = endpoint.trim_end_matches('/').to_string();

        let parsed = url::Url::parse(&endpoint).map_err(|e| ConfigurationError::Invalid {
            message: format!("Invalid SQS endpoint '{}': {}", endpoint, e),
        })?;
        let host = match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(ConfigurationError::Invalid {
                    message: format!("SQS endpoint '{}' has no host", endpoint),
                }
                .into())
            }
        };

        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| QueueError::ConnectionFailed {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            http_client,
            signer,
            config,
            endpoint,
            host,
        })
    }

    /// Endpoint requests are sent to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Perform one signed SQS action and return the response body
    async fn call(&self, params: BTreeMap<String, String>) -> Result<String, SqsError> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| SqsError::Authentication("No credentials configured".to_string()))?;

        let body = encode_form(&params);
        let auth_headers = signer.sign_request(&self.host, &body, &Utc::now());

        let mut request = self
            .http_client
            .post(format!("{}/", self.endpoint))
            .header("content-type", "application/x-www-form-urlencoded");
        for (key, value) in auth_headers {
            request = request.header(key, value);
        }

        let response = request.body(body).send().await.map_err(|e| {
            if e.is_timeout() {
                SqsError::Timeout(Duration::from_secs(self.config.request_timeout_seconds))
            } else if e.is_connect() {
                SqsError::Network(format!("Connection failed: {}", e))
            } else {
                SqsError::Network(format!("HTTP request failed: {}", e))
            }
        })?;

        let status = response.status();
        let response_body = response
            .text()
            .await
            .map_err(|e| SqsError::Network(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(parse_error_response(&response_body, status.as_u16()));
        }

        Ok(response_body)
    }
}

impl fmt::Debug for SqsGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqsGateway")
            .field("config", &self.config)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[async_trait]
impl QueueGateway for SqsGateway {
    async fn receive_messages(
        &self,
        request: &ReceiveRequest,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let params = receive_message_params(request);
        let response = self.call(params).await.map_err(|e| e.into_queue_error())?;
        let messages =
            parse_receive_message_response(&response).map_err(|e| e.into_queue_error())?;

        debug!(
            queue_url = %request.queue_url,
            count = messages.len(),
            "Received messages from SQS"
        );
        Ok(messages)
    }

    async fn delete_message(
        &self,
        queue_url: &str,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueError> {
        let mut params = action_params("DeleteMessage", queue_url);
        params.insert("ReceiptHandle".to_string(), receipt.as_str().to_string());

        // DeleteMessage returns an empty result on success
        self.call(params).await.map_err(|e| e.into_queue_error())?;
        Ok(())
    }

    async fn send_message_batch(
        &self,
        queue_url: &str,
        entries: &[OutboundMessage],
    ) -> Result<SendBatchOutput, QueueError> {
        if entries.len() > SERVICE_BATCH_LIMIT {
            return Err(QueueError::BatchTooLarge {
                size: entries.len(),
                max_size: SERVICE_BATCH_LIMIT,
            });
        }

        let params = send_message_batch_params(queue_url, entries);
        let response = self.call(params).await.map_err(|e| e.into_queue_error())?;
        let output =
            parse_send_message_batch_response(&response).map_err(|e| e.into_queue_error())?;

        debug!(
            queue_url = %queue_url,
            successful = output.successful.len(),
            failed = output.failed.len(),
            "Sent message batch to SQS"
        );
        Ok(output)
    }

    fn max_batch_size(&self) -> usize {
        SERVICE_BATCH_LIMIT
    }
}

// ============================================================================
// Request Encoding
// ============================================================================

fn action_params(action: &str, queue_url: &str) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    params.insert("Action".to_string(), action.to_string());
    params.insert("Version".to_string(), API_VERSION.to_string());
    params.insert("QueueUrl".to_string(), queue_url.to_string());
    params
}

fn encode_form(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn receive_message_params(request: &ReceiveRequest) -> BTreeMap<String, String> {
    let mut params = action_params("ReceiveMessage", &request.queue_url);
    params.insert(
        "MaxNumberOfMessages".to_string(),
        request.max_number_of_messages.to_string(),
    );
    params.insert(
        "WaitTimeSeconds".to_string(),
        request.wait_time_seconds.to_string(),
    );
    if let Some(visibility_timeout) = request.visibility_timeout {
        params.insert(
            "VisibilityTimeout".to_string(),
            visibility_timeout.to_string(),
        );
    }
    for (idx, name) in request.attribute_names.iter().enumerate() {
        params.insert(format!("AttributeName.{}", idx + 1), name.clone());
    }
    for (idx, name) in request.message_attribute_names.iter().enumerate() {
        params.insert(format!("MessageAttributeName.{}", idx + 1), name.clone());
    }
    params
}

fn send_message_batch_params(
    queue_url: &str,
    entries: &[OutboundMessage],
) -> BTreeMap<String, String> {
    let mut params = action_params("SendMessageBatch", queue_url);

    for (idx, entry) in entries.iter().enumerate() {
        let prefix = format!("SendMessageBatchRequestEntry.{}", idx + 1);

        params.insert(format!("{}.Id", prefix), entry.id.clone());
        params.insert(format!("{}.MessageBody", prefix), entry.body.clone());
        if let Some(delay) = entry.delay_seconds {
            params.insert(format!("{}.DelaySeconds", prefix), delay.to_string());
        }
        if let Some(group_id) = &entry.group_id {
            params.insert(format!("{}.MessageGroupId", prefix), group_id.clone());
        }
        if let Some(deduplication_id) = &entry.deduplication_id {
            params.insert(
                format!("{}.MessageDeduplicationId", prefix),
                deduplication_id.clone(),
            );
        }
        insert_attribute_params(
            &mut params,
            &format!("{}.MessageAttribute", prefix),
            &entry.attributes,
        );
        insert_attribute_params(
            &mut params,
            &format!("{}.MessageSystemAttribute", prefix),
            &entry.system_attributes,
        );
    }

    params
}

fn insert_attribute_params(
    params: &mut BTreeMap<String, String>,
    prefix: &str,
    attributes: &HashMap<String, MessageAttributeValue>,
) {
    // Sorted so the request body is deterministic
    let mut names: Vec<&String> = attributes.keys().collect();
    names.sort();

    for (idx, name) in names.into_iter().enumerate() {
        let value = &attributes[name];
        let prefix = format!("{}.{}", prefix, idx + 1);

        params.insert(format!("{}.Name", prefix), name.clone());
        params.insert(format!("{}.Value.DataType", prefix), value.data_type.clone());
        if let Some(string_value) = &value.string_value {
            params.insert(format!("{}.Value.StringValue", prefix), string_value.clone());
        }
        if let Some(binary_value) = &value.binary_value {
            params.insert(
                format!("{}.Value.BinaryValue", prefix),
                STANDARD.encode(binary_value),
            );
        }
    }
}

// ============================================================================
// Response Parsing
// ============================================================================

/// Last `n` element names of the current path, outermost first
fn path_tail(path: &[String], n: usize) -> Vec<&str> {
    path[path.len().saturating_sub(n)..]
        .iter()
        .map(String::as_str)
        .collect()
}

#[derive(Default)]
struct PartialMessage {
    message_id: Option<String>,
    receipt_handle: String,
    body: String,
    md5_of_body: Option<String>,
    attributes: HashMap<String, String>,
    message_attributes: HashMap<String, MessageAttributeValue>,
}

#[derive(Default)]
struct PartialAttribute {
    name: String,
    value: String,
    data_type: String,
    string_value: Option<String>,
    binary_value: Option<String>,
}

fn append(target: &mut Option<String>, text: &str) {
    target.get_or_insert_with(String::new).push_str(text);
}

fn parse_receive_message_response(xml: &str) -> Result<Vec<ReceivedMessage>, SqsError> {
    let mut reader = Reader::from_str(xml);

    let mut messages = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut current = PartialMessage::default();
    let mut attribute = PartialAttribute::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                match name.as_str() {
                    "Message" => current = PartialMessage::default(),
                    "Attribute" | "MessageAttribute" => attribute = PartialAttribute::default(),
                    _ => {}
                }
                path.push(name);
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(xml_error)?;
                match path_tail(&path, 3).as_slice() {
                    [.., "Message", "MessageId"] => append(&mut current.message_id, &text),
                    [.., "Message", "ReceiptHandle"] => current.receipt_handle.push_str(&text),
                    [.., "Message", "Body"] => current.body.push_str(&text),
                    [.., "Message", "MD5OfBody"] => append(&mut current.md5_of_body, &text),
                    [.., "Attribute", "Name"] | [.., "MessageAttribute", "Name"] => {
                        attribute.name.push_str(&text)
                    }
                    [.., "Attribute", "Value"] => attribute.value.push_str(&text),
                    ["MessageAttribute", "Value", "DataType"] => {
                        attribute.data_type.push_str(&text)
                    }
                    ["MessageAttribute", "Value", "StringValue"] => {
                        append(&mut attribute.string_value, &text)
                    }
                    ["MessageAttribute", "Value", "BinaryValue"] => {
                        append(&mut attribute.binary_value, &text)
                    }
                    _ => {}
                }
            }
            Ok(Event::End(_)) => {
                let Some(name) = path.pop() else {
                    return Err(xml_error("unbalanced end tag"));
                };
                match name.as_str() {
                    "Attribute" => {
                        let attribute = std::mem::take(&mut attribute);
                        current.attributes.insert(attribute.name, attribute.value);
                    }
                    "MessageAttribute" => {
                        let attribute = std::mem::take(&mut attribute);
                        let value = decode_message_attribute(&attribute)?;
                        current.message_attributes.insert(attribute.name, value);
                    }
                    "Message" => {
                        let message = std::mem::take(&mut current);
                        let receipt_handle =
                            ReceiptHandle::new(message.receipt_handle).map_err(|_| {
                                SqsError::Serialization(
                                    "ReceiptHandle missing from received message".to_string(),
                                )
                            })?;
                        messages.push(ReceivedMessage {
                            message_id: message.message_id,
                            receipt_handle,
                            body: message.body,
                            md5_of_body: message.md5_of_body,
                            attributes: message.attributes,
                            message_attributes: message.message_attributes,
                        });
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(messages)
}

fn decode_message_attribute(
    attribute: &PartialAttribute,
) -> Result<MessageAttributeValue, SqsError> {
    let binary_value = attribute
        .binary_value
        .as_ref()
        .map(|encoded| {
            STANDARD.decode(encoded.trim()).map_err(|e| {
                SqsError::Serialization(format!(
                    "Attribute '{}' is not valid base64: {}",
                    attribute.name, e
                ))
            })
        })
        .transpose()?;

    Ok(MessageAttributeValue {
        data_type: attribute.data_type.clone(),
        string_value: attribute.string_value.clone(),
        binary_value: binary_value.map(Into::into),
    })
}

#[derive(Default)]
struct PartialResultEntry {
    id: String,
    message_id: String,
    md5_of_message_body: Option<String>,
    md5_of_message_attributes: Option<String>,
    md5_of_message_system_attributes: Option<String>,
    sequence_number: Option<String>,
    code: String,
    message: Option<String>,
    sender_fault: String,
}

fn parse_send_message_batch_response(xml: &str) -> Result<SendBatchOutput, SqsError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut output = SendBatchOutput::default();
    let mut path: Vec<String> = Vec::new();
    let mut entry = PartialResultEntry::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name == "SendMessageBatchResultEntry" || name == "BatchResultErrorEntry" {
                    entry = PartialResultEntry::default();
                }
                path.push(name);
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(xml_error)?;
                match path_tail(&path, 2).as_slice() {
                    [_, "Id"] => entry.id.push_str(&text),
                    ["SendMessageBatchResultEntry", "MessageId"] => {
                        entry.message_id.push_str(&text)
                    }
                    ["SendMessageBatchResultEntry", "MD5OfMessageBody"] => {
                        append(&mut entry.md5_of_message_body, &text)
                    }
                    ["SendMessageBatchResultEntry", "MD5OfMessageAttributes"] => {
                        append(&mut entry.md5_of_message_attributes, &text)
                    }
                    ["SendMessageBatchResultEntry", "MD5OfMessageSystemAttributes"] => {
                        append(&mut entry.md5_of_message_system_attributes, &text)
                    }
                    ["SendMessageBatchResultEntry", "SequenceNumber"] => {
                        append(&mut entry.sequence_number, &text)
                    }
                    ["BatchResultErrorEntry", "Code"] => entry.code.push_str(&text),
                    ["BatchResultErrorEntry", "Message"] => append(&mut entry.message, &text),
                    ["BatchResultErrorEntry", "SenderFault"] => entry.sender_fault.push_str(&text),
                    _ => {}
                }
            }
            Ok(Event::End(_)) => {
                let Some(name) = path.pop() else {
                    return Err(xml_error("unbalanced end tag"));
                };
                match name.as_str() {
                    "SendMessageBatchResultEntry" => {
                        let entry = std::mem::take(&mut entry);
                        output.successful.push(SendBatchResultEntry {
                            id: entry.id,
                            message_id: entry.message_id,
                            md5_of_message_body: entry.md5_of_message_body,
                            md5_of_message_attributes: entry.md5_of_message_attributes,
                            md5_of_message_system_attributes: entry
                                .md5_of_message_system_attributes,
                            sequence_number: entry.sequence_number,
                        });
                    }
                    "BatchResultErrorEntry" => {
                        let entry = std::mem::take(&mut entry);
                        output.failed.push(BatchResultErrorEntry {
                            id: entry.id,
                            code: entry.code,
                            message: entry.message,
                            sender_fault: entry.sender_fault.eq_ignore_ascii_case("true"),
                        });
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(output)
}

/// Map an error response body onto [`SqsError`]
fn parse_error_response(xml: &str, status_code: u16) -> SqsError {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut code = String::new();
    let mut message = String::new();
    let mut path: Vec<String> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                path.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().map(|s| s.into_owned()).unwrap_or_default();
                match path_tail(&path, 2).as_slice() {
                    ["Error", "Code"] => code.push_str(&text),
                    ["Error", "Message"] => message.push_str(&text),
                    _ => {}
                }
            }
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    if code.is_empty() {
        code = format!("HTTP{}", status_code);
    }
    if message.is_empty() {
        message = "Unknown error".to_string();
    }

    match code.as_str() {
        "AWS.SimpleQueueService.NonExistentQueue" | "QueueDoesNotExist" => {
            SqsError::QueueNotFound(message)
        }
        "InvalidClientTokenId"
        | "UnrecognizedClientException"
        | "SignatureDoesNotMatch"
        | "MissingAuthenticationToken"
        | "ExpiredToken"
        | "AccessDenied"
        | "AccessDeniedException" => SqsError::Authentication(format!("{}: {}", code, message)),
        "ReceiptHandleIsInvalid" | "InvalidReceiptHandle" => SqsError::InvalidReceipt(message),
        _ if status_code == 401 || status_code == 403 => {
            SqsError::Authentication(format!("{}: {}", code, message))
        }
        _ => SqsError::Service { code, message },
    }
}
