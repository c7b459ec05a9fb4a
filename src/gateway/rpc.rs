//! JSON-RPC 2.0 implementation of [ChainGateway] over HTTP.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::codec::PackedStatus;

use super::abi;
use super::signer::sign_transaction;
use super::{
    is_sequence_conflict_message, Address, ChainGateway, GatewayError, PositionId, Receipt,
    ReceiptStatus, SigningKey, TxHash, UnsignedTransaction,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: String,
    #[serde(default)]
    status: Option<String>,
}

fn map_transport_err(prefix: &str, e: impl std::fmt::Display) -> GatewayError {
    GatewayError::Transport(format!("{prefix}: {e}"))
}

/// Parses a `0x`-prefixed hex quantity.
fn parse_quantity(value: &Value) -> Result<u128, GatewayError> {
    let text = value
        .as_str()
        .ok_or_else(|| GatewayError::Decode(format!("expected hex quantity, got {value}")))?;
    let digits = text.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| GatewayError::Decode(format!("quantity {text:?}: {e}")))
}

fn parse_hex_data(value: &Value) -> Result<Vec<u8>, GatewayError> {
    let text = value
        .as_str()
        .ok_or_else(|| GatewayError::Decode(format!("expected hex data, got {value}")))?;
    hex::decode(text.trim_start_matches("0x"))
        .map_err(|e| GatewayError::Decode(format!("hex data: {e}")))
}

pub struct JsonRpcGateway {
    client: reqwest::Client,
    endpoint: url::Url,
    contract: Address,
    next_id: AtomicU64,
}

impl JsonRpcGateway {
    pub fn new(endpoint: url::Url, contract: Address) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| map_transport_err("http client", e))?;
        Ok(Self {
            client,
            endpoint,
            contract,
            next_id: AtomicU64::new(1),
        })
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, GatewayError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        log::debug!("rpc -> {method} #{id}");
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_err(method, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(map_transport_err(method, format!("http status {status}")));
        }
        let parsed: RpcResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Decode(format!("{method}: {e}")))?;
        if let Some(err) = parsed.error {
            log::debug!("rpc <- {method} #{id} error {}: {}", err.code, err.message);
            return Err(GatewayError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        Ok(parsed.result.unwrap_or(Value::Null))
    }

    async fn eth_call(&self, data: Vec<u8>, from: Option<&Address>) -> Result<Vec<u8>, GatewayError> {
        let mut call = json!({
            "to": self.contract.to_string(),
            "data": format!("0x{}", hex::encode(data)),
        });
        if let Some(from) = from {
            call["from"] = Value::String(from.to_string());
        }
        let result = self.request("eth_call", json!([call, "latest"])).await?;
        parse_hex_data(&result)
    }
}

#[async_trait]
impl ChainGateway for JsonRpcGateway {
    async fn owned_positions(&self, account: &Address) -> Result<Vec<PositionId>, GatewayError> {
        let data = self.eth_call(abi::owned_tokens_call(), Some(account)).await?;
        abi::decode_position_array(&data)
    }

    async fn position_document(&self, id: PositionId) -> Result<String, GatewayError> {
        let data = self.eth_call(abi::token_uri_call(id), None).await?;
        abi::decode_string(&data)
    }

    async fn packed_status(&self, id: PositionId) -> Result<PackedStatus, GatewayError> {
        let data = self.eth_call(abi::mint_info_call(id), None).await?;
        abi::decode_uint256(&data)
    }

    async fn fee_rate(&self) -> Result<u128, GatewayError> {
        let result = self.request("eth_gasPrice", json!([])).await?;
        parse_quantity(&result)
    }

    async fn sequence_number(&self, account: &Address) -> Result<u64, GatewayError> {
        let result = self
            .request(
                "eth_getTransactionCount",
                json!([account.to_string(), "pending"]),
            )
            .await?;
        let count = parse_quantity(&result)?;
        u64::try_from(count).map_err(|_| GatewayError::Decode(format!("nonce {count} overflows")))
    }

    async fn submit_signed(
        &self,
        tx: &UnsignedTransaction,
        key: &SigningKey,
    ) -> Result<TxHash, GatewayError> {
        let raw = sign_transaction(tx, key)?;
        let result = self
            .request(
                "eth_sendRawTransaction",
                json!([format!("0x{}", hex::encode(raw))]),
            )
            .await
            .map_err(|e| match e {
                GatewayError::Rpc { message, .. } if is_sequence_conflict_message(&message) => {
                    GatewayError::SequenceConflict(message)
                }
                other => other,
            })?;
        result
            .as_str()
            .ok_or_else(|| GatewayError::Decode(format!("expected tx hash, got {result}")))?
            .parse()
    }

    async fn receipt(&self, tx_hash: &TxHash) -> Result<Option<Receipt>, GatewayError> {
        let result = self
            .request("eth_getTransactionReceipt", json!([tx_hash.to_string()]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        let raw: RawReceipt = serde_json::from_value(result)
            .map_err(|e| GatewayError::Decode(format!("receipt: {e}")))?;
        let status = match raw.status.as_deref() {
            Some("0x1") => ReceiptStatus::Success,
            _ => ReceiptStatus::Failure,
        };
        Ok(Some(Receipt {
            tx_hash: raw.transaction_hash.parse()?,
            status,
        }))
    }
}
