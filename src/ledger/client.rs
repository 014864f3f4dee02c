//!
//! GraphQL client for the remote ledger service.
//!
//! This module provides an async client that implements [`RemoteLedger`] over GraphQL queries and
//! mutations sent as HTTP POST requests. Transport failures and server-side errors map to
//! `NetworkUnavailable`; GraphQL errors on the transfer mutation map to `Rejected`.

use crate::ledger::{LedgerError, ProcessTransferRequest, RecipientProfile, RemoteLedger};

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

const TRANSFER_BY_HASH_QUERY: &str = r#"
    query TransferByHash($hash: String!) {
        transferByHash(hash: $hash) {
            id
        }
    }
"#;

const PROCESS_TRANSFER_MUTATION: &str = r#"
    mutation ProcessTransfer($input: ProcessTransferInput!) {
        processTransfer(input: $input) {
            transferId
        }
    }
"#;

const RECIPIENT_BY_PAYMENT_ID_QUERY: &str = r#"
    query RecipientByPaymentId($paymentId: String!) {
        recipientByPaymentId(paymentId: $paymentId) {
            id
            userId
            displayName
            paymentId
        }
    }
"#;

/// A single entry of a GraphQL `errors` array.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlError {
	pub message: String,
}

/// Body of a GraphQL response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphQlResponse {
	#[serde(default)]
	pub data: Option<serde_json::Value>,
	#[serde(default)]
	pub errors: Vec<GraphQlError>,
}

impl GraphQlResponse {
	fn error_message(&self) -> Option<String> {
		if self.errors.is_empty() {
			return None;
		}
		Some(
			self.errors
				.iter()
				.map(|e| e.message.as_str())
				.collect::<Vec<_>>()
				.join("; "),
		)
	}

	fn field(&self, name: &str) -> Option<&serde_json::Value> {
		self.data.as_ref().and_then(|data| data.get(name))
	}
}

/// Remote ledger GraphQL client
#[derive(Clone)]
pub struct GraphQlLedgerClient {
	/// The underlying HTTP client for GraphQL requests.
	http_client: Client,
	/// The GraphQL HTTP endpoint.
	ledger_url: String,
}

impl GraphQlLedgerClient {
	/// Create a new ledger client.
	///
	/// # Arguments
	/// * `ledger_url` - The HTTP endpoint for GraphQL requests.
	/// * `request_timeout` - Transport-level timeout for each request.
	pub fn new(ledger_url: String, request_timeout: Duration) -> Result<Self, LedgerError> {
		let http_client = Client::builder()
			.timeout(request_timeout)
			.build()
			.map_err(|e| {
				LedgerError::NetworkUnavailable(format!("Failed to create HTTP client: {}", e))
			})?;

		info!("Created ledger client for {}", ledger_url);
		Ok(Self {
			http_client,
			ledger_url,
		})
	}

	/// Execute a GraphQL request.
	///
	/// # Returns
	/// The decoded GraphQL response (which may still carry `errors`), or a `LedgerError` if the
	/// request could not be completed.
	pub async fn execute_query(
		&self,
		query: &str,
		variables: serde_json::Value,
	) -> Result<GraphQlResponse, LedgerError> {
		let request_body = json!({
			"query": query,
			"variables": variables
		});

		let response = self
			.http_client
			.post(&self.ledger_url)
			.header("Content-Type", "application/json")
			.json(&request_body)
			.send()
			.await?;

		let status = response.status();
		if !status.is_success() {
			return Err(classify_http_status(status));
		}

		let body: GraphQlResponse = response.json().await?;
		Ok(body)
	}
}

#[async_trait::async_trait]
impl RemoteLedger for GraphQlLedgerClient {
	async fn duplicate_exists(&self, hash: &str) -> Result<bool, LedgerError> {
		let response = self
			.execute_query(TRANSFER_BY_HASH_QUERY, json!({ "hash": hash }))
			.await?;
		let exists = parse_transfer_exists(&response)?;
		debug!("Duplicate check for {}: {}", hash, exists);
		Ok(exists)
	}

	async fn process_transfer(
		&self,
		request: &ProcessTransferRequest,
	) -> Result<String, LedgerError> {
		let variables = json!({ "input": serde_json::to_value(request)? });
		let response = self
			.execute_query(PROCESS_TRANSFER_MUTATION, variables)
			.await?;
		let transfer_id = parse_transfer_id(&response)?;
		info!(
			"Ledger accepted transfer {} as {}",
			request.hash, transfer_id
		);
		Ok(transfer_id)
	}

	async fn lookup_recipient_by_payment_id(
		&self,
		payment_id: &str,
	) -> Result<Option<RecipientProfile>, LedgerError> {
		let response = self
			.execute_query(
				RECIPIENT_BY_PAYMENT_ID_QUERY,
				json!({ "paymentId": payment_id }),
			)
			.await?;
		parse_recipient(&response)
	}
}

/// Server-side and throttling statuses are transient; anything else means the request itself is
/// wrong.
pub fn classify_http_status(status: StatusCode) -> LedgerError {
	if status.is_server_error()
		|| status == StatusCode::REQUEST_TIMEOUT
		|| status == StatusCode::TOO_MANY_REQUESTS
	{
		LedgerError::NetworkUnavailable(format!("HTTP error: {}", status))
	} else {
		LedgerError::InvalidResponse(format!("HTTP error: {}", status))
	}
}

fn parse_transfer_exists(response: &GraphQlResponse) -> Result<bool, LedgerError> {
	if let Some(message) = response.error_message() {
		return Err(LedgerError::InvalidResponse(format!(
			"GraphQL errors: {}",
			message
		)));
	}
	match response.field("transferByHash") {
		Some(serde_json::Value::Null) | None if response.data.is_some() => Ok(false),
		Some(serde_json::Value::Object(_)) => Ok(true),
		_ => Err(LedgerError::InvalidResponse(
			"transferByHash missing from response".to_string(),
		)),
	}
}

fn parse_transfer_id(response: &GraphQlResponse) -> Result<String, LedgerError> {
	if let Some(message) = response.error_message() {
		return Err(LedgerError::Rejected(message));
	}
	response
		.field("processTransfer")
		.and_then(|result| result.get("transferId"))
		.and_then(|id| id.as_str())
		.map(str::to_string)
		.ok_or_else(|| {
			LedgerError::InvalidResponse("processTransfer returned no transferId".to_string())
		})
}

fn parse_recipient(response: &GraphQlResponse) -> Result<Option<RecipientProfile>, LedgerError> {
	if let Some(message) = response.error_message() {
		return Err(LedgerError::InvalidResponse(format!(
			"GraphQL errors: {}",
			message
		)));
	}
	match response.field("recipientByPaymentId") {
		Some(serde_json::Value::Null) | None => Ok(None),
		Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn response(body: serde_json::Value) -> GraphQlResponse {
		serde_json::from_value(body).expect("valid GraphQL response body")
	}

	#[test]
	fn test_transfer_exists_parsing() {
		let found = response(json!({ "data": { "transferByHash": { "id": "t-1" } } }));
		assert!(parse_transfer_exists(&found).expect("parses"));

		let missing = response(json!({ "data": { "transferByHash": null } }));
		assert!(!parse_transfer_exists(&missing).expect("parses"));

		let empty = response(json!({}));
		assert!(matches!(
			parse_transfer_exists(&empty),
			Err(LedgerError::InvalidResponse(_))
		));
	}

	#[test]
	fn test_process_transfer_errors_are_rejections() {
		let rejected = response(json!({
			"data": null,
			"errors": [{ "message": "insufficient funds" }, { "message": "limit reached" }]
		}));
		match parse_transfer_id(&rejected) {
			Err(LedgerError::Rejected(message)) => {
				assert_eq!(message, "insufficient funds; limit reached")
			}
			other => panic!("expected rejection, got {:?}", other),
		}

		let accepted = response(json!({ "data": { "processTransfer": { "transferId": "tx-9" } } }));
		assert_eq!(parse_transfer_id(&accepted).expect("parses"), "tx-9");
	}

	#[test]
	fn test_recipient_parsing() {
		let found = response(json!({
			"data": {
				"recipientByPaymentId": {
					"id": "p-1",
					"userId": "u-1",
					"displayName": "Ada",
					"paymentId": "PAY-ADA"
				}
			}
		}));
		let profile = parse_recipient(&found)
			.expect("parses")
			.expect("profile present");
		assert_eq!(profile.user_id, "u-1");
		assert_eq!(profile.display_name.as_deref(), Some("Ada"));

		let missing = response(json!({ "data": { "recipientByPaymentId": null } }));
		assert!(parse_recipient(&missing).expect("parses").is_none());
	}

	#[test]
	fn test_http_status_classification() {
		assert!(matches!(
			classify_http_status(StatusCode::BAD_GATEWAY),
			LedgerError::NetworkUnavailable(_)
		));
		assert!(matches!(
			classify_http_status(StatusCode::TOO_MANY_REQUESTS),
			LedgerError::NetworkUnavailable(_)
		));
		assert!(matches!(
			classify_http_status(StatusCode::BAD_REQUEST),
			LedgerError::InvalidResponse(_)
		));
	}

	#[test]
	fn test_request_serializes_with_camel_case_fields() {
		let request = ProcessTransferRequest {
			sender_id: "s".to_string(),
			receiver_id: "r".to_string(),
			amount: "100".parse().expect("amount"),
			description: None,
			is_offline: true,
			hash: "abc".to_string(),
			device_id: "d".to_string(),
		};
		let value = serde_json::to_value(&request).expect("serializes");
		assert_eq!(value["senderId"], "s");
		assert_eq!(value["amount"], "100.00");
		assert_eq!(value["isOffline"], true);
		assert_eq!(value["deviceId"], "d");
	}
}
