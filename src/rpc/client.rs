//! Solana JSON-RPC client
//!
//! Implements [`LedgerNode`] with plain JSON-RPC 2.0 over HTTP:
//! `getBalance`, `getLatestBlockhash`, `sendTransaction`,
//! `getSignatureStatuses` and `getBlockHeight`.

use super::{ConfirmationOutcome, LedgerNode, NodeProvider, RpcError, SendOptions};
use crate::config::RpcConfig;
use crate::types::{Environment, FreshnessToken, Hash, Pubkey, Signature};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Commitment level used for reads and confirmation
const COMMITMENT: &str = "confirmed";

/// Consecutive failed status polls tolerated while confirming
const MAX_POLL_FAILURES: u32 = 10;

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockhashValue {
    blockhash: String,
    last_valid_block_height: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureStatus {
    err: Option<Value>,
    confirmation_status: Option<String>,
}

impl SignatureStatus {
    fn outcome(&self) -> Option<ConfirmationOutcome> {
        if let Some(err) = &self.err {
            return Some(ConfirmationOutcome::Failed(err.to_string()));
        }
        match self.confirmation_status.as_deref() {
            Some("confirmed") | Some("finalized") => Some(ConfirmationOutcome::Confirmed),
            _ => None,
        }
    }
}

/// JSON-RPC client for a single cluster endpoint
pub struct RpcClient {
    client: Client,
    url: url::Url,
    poll_interval: Duration,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(url: url::Url) -> Self {
        Self::with_poll_interval(url, Duration::from_secs(1))
    }

    /// Create with a custom confirmation poll interval
    pub fn with_poll_interval(url: url::Url, poll_interval: Duration) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            url,
            poll_interval,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &url::Url {
        &self.url
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        tracing::trace!(method, id, "RPC request");

        let response = self
            .client
            .post(self.url.clone())
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let parsed: RpcResponse<T> = response.json().await?;
        parse_response(parsed)
    }

    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureStatus>, RpcError> {
        let statuses: WithContext<Vec<Option<SignatureStatus>>> = self
            .call(
                "getSignatureStatuses",
                json!([[signature.to_string()], { "searchTransactionHistory": false }]),
            )
            .await?;
        Ok(statuses.value.into_iter().next().flatten())
    }

    async fn block_height(&self) -> Result<u64, RpcError> {
        self.call("getBlockHeight", json!([{ "commitment": COMMITMENT }]))
            .await
    }

    /// One confirmation check: `None` while still pending
    ///
    /// A signature the node already knows is never reported expired. Expiry
    /// needs the height past `last_valid_block_height` and a second lookup
    /// that still finds no status.
    async fn poll_confirmation(
        &self,
        signature: &Signature,
        token: &FreshnessToken,
    ) -> Result<Option<ConfirmationOutcome>, RpcError> {
        if let Some(status) = self.signature_status(signature).await? {
            return Ok(status.outcome());
        }

        let height = self.block_height().await?;
        if height <= token.last_valid_block_height {
            return Ok(None);
        }

        // It may have landed between the two reads
        match self.signature_status(signature).await? {
            Some(status) => Ok(status.outcome()),
            None => {
                tracing::debug!(%signature, height, "Blockhash expired with no status");
                Ok(Some(ConfirmationOutcome::Expired))
            }
        }
    }
}

fn parse_response<T>(response: RpcResponse<T>) -> Result<T, RpcError> {
    if let Some(error) = response.error {
        return Err(RpcError::Rpc {
            code: error.code,
            message: error.message,
        });
    }
    response
        .result
        .ok_or_else(|| RpcError::InvalidResponse("missing result".to_string()))
}

#[async_trait]
impl LedgerNode for RpcClient {
    async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64, RpcError> {
        let balance: WithContext<u64> = self
            .call(
                "getBalance",
                json!([pubkey.to_string(), { "commitment": COMMITMENT }]),
            )
            .await?;
        Ok(balance.value)
    }

    async fn get_latest_blockhash(&self) -> Result<FreshnessToken, RpcError> {
        let latest: WithContext<BlockhashValue> = self
            .call("getLatestBlockhash", json!([{ "commitment": COMMITMENT }]))
            .await?;
        let blockhash: Hash = latest
            .value
            .blockhash
            .parse()
            .map_err(|e| RpcError::InvalidResponse(format!("blockhash: {}", e)))?;
        Ok(FreshnessToken {
            blockhash,
            last_valid_block_height: latest.value.last_valid_block_height,
        })
    }

    async fn send_transaction(
        &self,
        transaction: &[u8],
        options: SendOptions,
    ) -> Result<Signature, RpcError> {
        let mut config = json!({
            "encoding": "base64",
            "skipPreflight": options.skip_preflight,
            "preflightCommitment": COMMITMENT,
        });
        if let Some(max_retries) = options.max_retries {
            config["maxRetries"] = json!(max_retries);
        }

        let signature: String = self
            .call(
                "sendTransaction",
                json!([STANDARD.encode(transaction), config]),
            )
            .await?;
        signature
            .parse()
            .map_err(|e| RpcError::InvalidResponse(format!("signature: {}", e)))
    }

    async fn confirm_transaction(
        &self,
        signature: &Signature,
        token: &FreshnessToken,
    ) -> Result<ConfirmationOutcome, RpcError> {
        let mut failures = 0;
        loop {
            match self.poll_confirmation(signature, token).await {
                Ok(Some(outcome)) => return Ok(outcome),
                Ok(None) => failures = 0,
                Err(e) => {
                    failures += 1;
                    tracing::warn!(
                        %signature,
                        error = %e,
                        failures,
                        "Confirmation poll failed"
                    );
                    if failures >= MAX_POLL_FAILURES {
                        return Err(e);
                    }
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Builds an [`RpcClient`] for each environment from [`RpcConfig`]
#[derive(Debug, Clone)]
pub struct RpcNodeProvider {
    config: RpcConfig,
    poll_interval: Duration,
}

impl RpcNodeProvider {
    pub fn new(config: RpcConfig, poll_interval: Duration) -> Self {
        Self {
            config,
            poll_interval,
        }
    }
}

impl NodeProvider for RpcNodeProvider {
    fn node(&self, environment: Environment) -> crate::Result<Arc<dyn LedgerNode>> {
        let url = self.config.url(environment)?;
        Ok(Arc::new(RpcClient::with_poll_interval(
            url,
            self.poll_interval,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[test]
    fn test_parse_result() {
        let response: RpcResponse<WithContext<u64>> = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": { "context": { "slot": 1 }, "value": 2_500_000_000u64 }
        }))
        .unwrap();
        assert_eq!(parse_response(response).unwrap().value, 2_500_000_000);
    }

    #[test]
    fn test_parse_error() {
        let response: RpcResponse<String> = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32002, "message": "Blockhash not found" }
        }))
        .unwrap();
        match parse_response(response) {
            Err(RpcError::Rpc { code, message }) => {
                assert_eq!(code, -32002);
                assert_eq!(message, "Blockhash not found");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_missing_result() {
        let response: RpcResponse<u64> =
            serde_json::from_value(json!({ "jsonrpc": "2.0", "id": 1 })).unwrap();
        assert!(matches!(
            parse_response(response),
            Err(RpcError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_blockhash_value() {
        let value: WithContext<BlockhashValue> = serde_json::from_value(json!({
            "context": { "slot": 10 },
            "value": {
                "blockhash": "EkSnNWid2cvwEVnVx9aBqawnmiCNiDgp3gUdkDPTKN1N",
                "lastValidBlockHeight": 3090
            }
        }))
        .unwrap();
        assert_eq!(value.value.last_valid_block_height, 3090);
        assert!(value.value.blockhash.parse::<Hash>().is_ok());
    }

    #[test]
    fn test_signature_status_outcome() {
        let pending: SignatureStatus = serde_json::from_value(json!({
            "slot": 1, "confirmations": 0, "err": null, "confirmationStatus": "processed"
        }))
        .unwrap();
        assert_eq!(pending.outcome(), None);

        let confirmed: SignatureStatus = serde_json::from_value(json!({
            "slot": 1, "confirmations": 1, "err": null, "confirmationStatus": "confirmed"
        }))
        .unwrap();
        assert_eq!(confirmed.outcome(), Some(ConfirmationOutcome::Confirmed));

        let failed: SignatureStatus = serde_json::from_value(json!({
            "slot": 1,
            "confirmations": null,
            "err": { "InstructionError": [0, { "Custom": 1 }] },
            "confirmationStatus": "finalized"
        }))
        .unwrap();
        assert!(matches!(
            failed.outcome(),
            Some(ConfirmationOutcome::Failed(detail)) if detail.contains("InstructionError")
        ));
    }

    /// JSON-RPC node answering from a script keyed on method and call count
    struct StubNode {
        calls: Mutex<HashMap<String, u32>>,
        script: Box<dyn Fn(&str, u32) -> Value + Send + Sync>,
    }

    impl StubNode {
        fn calls(&self, method: &str) -> u32 {
            self.calls.lock().unwrap().get(method).copied().unwrap_or(0)
        }
    }

    async fn handle(State(stub): State<Arc<StubNode>>, Json(request): Json<Value>) -> Json<Value> {
        let method = request["method"].as_str().unwrap_or_default().to_string();
        let call = {
            let mut calls = stub.calls.lock().unwrap();
            let count = calls.entry(method.clone()).or_insert(0);
            *count += 1;
            *count
        };
        let mut response = (stub.script)(&method, call);
        response["jsonrpc"] = json!("2.0");
        response["id"] = request["id"].clone();
        Json(response)
    }

    async fn stub_client(
        script: impl Fn(&str, u32) -> Value + Send + Sync + 'static,
    ) -> (RpcClient, Arc<StubNode>) {
        let stub = Arc::new(StubNode {
            calls: Mutex::new(HashMap::new()),
            script: Box::new(script),
        });
        let app = Router::new()
            .route("/", post(handle))
            .with_state(Arc::clone(&stub));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let url = url::Url::parse(&format!("http://{}/", addr)).unwrap();
        (RpcClient::with_poll_interval(url, Duration::from_millis(1)), stub)
    }

    fn status(confirmation: &str) -> Value {
        json!({ "result": { "context": { "slot": 1 }, "value": [{
            "slot": 1, "confirmations": 0, "err": null, "confirmationStatus": confirmation
        }] } })
    }

    fn no_status() -> Value {
        json!({ "result": { "context": { "slot": 1 }, "value": [null] } })
    }

    fn height(height: u64) -> Value {
        json!({ "result": height })
    }

    fn token() -> FreshnessToken {
        FreshnessToken {
            blockhash: Hash::new([3u8; 32]),
            last_valid_block_height: 100,
        }
    }

    fn sig() -> Signature {
        Signature::new([9u8; 64])
    }

    #[tokio::test]
    async fn test_processed_transaction_is_not_expired() {
        // Landed at "processed" while the blockhash is already past its window
        let (client, stub) = stub_client(|method, call| match method {
            "getSignatureStatuses" if call < 3 => status("processed"),
            "getSignatureStatuses" => status("confirmed"),
            _ => height(150),
        })
        .await;

        let outcome = client.confirm_transaction(&sig(), &token()).await.unwrap();
        assert_eq!(outcome, ConfirmationOutcome::Confirmed);
        assert_eq!(stub.calls("getSignatureStatuses"), 3);
        assert_eq!(stub.calls("getBlockHeight"), 0);
    }

    #[tokio::test]
    async fn test_expired_after_second_lookup() {
        let (client, stub) = stub_client(|method, _| match method {
            "getSignatureStatuses" => no_status(),
            _ => height(101),
        })
        .await;

        let outcome = client.confirm_transaction(&sig(), &token()).await.unwrap();
        assert_eq!(outcome, ConfirmationOutcome::Expired);
        assert_eq!(stub.calls("getSignatureStatuses"), 2);
        assert_eq!(stub.calls("getBlockHeight"), 1);
    }

    #[tokio::test]
    async fn test_status_found_on_second_lookup() {
        let (client, stub) = stub_client(|method, call| match method {
            "getSignatureStatuses" if call == 1 => no_status(),
            "getSignatureStatuses" => status("confirmed"),
            _ => height(150),
        })
        .await;

        let outcome = client.confirm_transaction(&sig(), &token()).await.unwrap();
        assert_eq!(outcome, ConfirmationOutcome::Confirmed);
        assert_eq!(stub.calls("getSignatureStatuses"), 2);
    }

    #[tokio::test]
    async fn test_unknown_signature_within_window_keeps_polling() {
        let (client, stub) = stub_client(|method, call| match method {
            "getSignatureStatuses" if call <= 2 => no_status(),
            "getSignatureStatuses" => status("finalized"),
            _ => height(100),
        })
        .await;

        let outcome = client.confirm_transaction(&sig(), &token()).await.unwrap();
        assert_eq!(outcome, ConfirmationOutcome::Confirmed);
        assert_eq!(stub.calls("getBlockHeight"), 2);
    }

    #[tokio::test]
    async fn test_on_chain_error_reported_as_failed() {
        let (client, _stub) = stub_client(|method, _| match method {
            "getSignatureStatuses" => json!({ "result": { "context": { "slot": 1 }, "value": [{
                "slot": 1,
                "confirmations": null,
                "err": { "InstructionError": [0, { "Custom": 1 }] },
                "confirmationStatus": "processed"
            }] } }),
            _ => height(150),
        })
        .await;

        let outcome = client.confirm_transaction(&sig(), &token()).await.unwrap();
        assert!(matches!(outcome, ConfirmationOutcome::Failed(detail) if detail.contains("Custom")));
    }

    #[tokio::test]
    async fn test_gives_up_after_repeated_poll_errors() {
        let (client, stub) = stub_client(|_, _| {
            json!({ "error": { "code": -32005, "message": "Node is behind" } })
        })
        .await;

        let err = client
            .confirm_transaction(&sig(), &token())
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Rpc { code: -32005, .. }));
        assert_eq!(stub.calls("getSignatureStatuses"), MAX_POLL_FAILURES);
    }

    #[tokio::test]
    async fn test_get_balance_over_http() {
        let (client, stub) = stub_client(|_, _| {
            json!({ "result": { "context": { "slot": 1 }, "value": 1_500_000_000u64 } })
        })
        .await;

        let balance = client.get_balance(&Pubkey::new([1u8; 32])).await.unwrap();
        assert_eq!(balance, 1_500_000_000);
        assert_eq!(stub.calls("getBalance"), 1);
    }

    #[test]
    fn test_provider_rejects_missing_endpoint() {
        let provider = RpcNodeProvider::new(
            RpcConfig::with_urls(Default::default()),
            Duration::from_millis(10),
        );
        assert!(provider.node(Environment::Test).is_err());
    }
}
