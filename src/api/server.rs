//! API Server Module
//!
//! This module implements a JSON-RPC server in front of the transfer
//! orchestrator. Every method maps one-to-one onto an orchestrator call.
//!
//! # Methods
//! - `bridge_startDeposit` `{"amount": "0x.."}` -> transfer id
//! - `bridge_startWithdrawal` `{"amount": "0x.."}` -> transfer id
//! - `bridge_getStatus` `{"id": "0x.."}` -> status snapshot
//! - `bridge_resume` `{"id": "0x.."}` -> status snapshot at resume time

use crate::config::ApiConfig;
use crate::error::BridgeError;
use crate::transfer::TransferOrchestrator;
use axum::{extract::State, routing::post, Json, Router};
use ethers::types::{H256, U256};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const APPLICATION_ERROR: i32 = -32000;

/// Shared application state that is accessible across all request handlers
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<TransferOrchestrator>,
}

/// The main API server struct
pub struct Server {
    config: ApiConfig,
    state: AppState,
}

impl Server {
    /// Creates a new API server instance
    ///
    /// # Arguments
    /// * `config` - Bind address
    /// * `orchestrator` - Orchestrator every method is forwarded to
    pub fn new(config: ApiConfig, orchestrator: Arc<TransferOrchestrator>) -> Self {
        Self {
            config,
            state: AppState { orchestrator },
        }
    }

    /// Router with a single POST endpoint at "/"
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", post(handle_rpc))
            .with_state(self.state.clone())
    }

    /// Starts the API server and begins listening for incoming requests
    ///
    /// # Returns
    /// `Ok(())` when the server shuts down, or an error if binding fails
    pub async fn start(self) -> anyhow::Result<()> {
        let app = self.router();
        let addr = format!("{}:{}", self.config.host, self.config.port);
        info!("API server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }
}

/// JSON-RPC 2.0 request structure
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    method: String,
    #[serde(default)]
    params: Value,
    id: Value,
}

/// JSON-RPC 2.0 response structure
///
/// Either `result` or `error` is populated, never both.
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
    id: Value,
}

/// JSON-RPC error object
///
/// `data` carries the error kind for application errors.
#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl JsonRpcResponse {
    fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    fn error(id: Value, code: i32, message: String, data: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data,
            }),
            id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AmountParams {
    amount: U256,
}

#[derive(Debug, Deserialize)]
struct IdParams {
    id: H256,
}

/// A failed call, before it is tied to a request id
enum CallError {
    InvalidParams(String),
    Bridge(BridgeError),
}

impl From<BridgeError> for CallError {
    fn from(e: BridgeError) -> Self {
        CallError::Bridge(e)
    }
}

fn params<T: DeserializeOwned>(value: Value) -> Result<T, CallError> {
    serde_json::from_value(value).map_err(|e| CallError::InvalidParams(e.to_string()))
}

fn to_value<T: Serialize>(value: T) -> Result<Value, CallError> {
    serde_json::to_value(value).map_err(|e| CallError::Bridge(e.into()))
}

/// Main RPC request handler
///
/// Routes the request to the orchestrator call named by `method`.
async fn handle_rpc(
    State(state): State<AppState>,
    Json(request): Json<JsonRpcRequest>,
) -> Json<JsonRpcResponse> {
    info!("Received RPC request: {}", request.method);
    let orchestrator = &state.orchestrator;

    let outcome = match request.method.as_str() {
        "bridge_startDeposit" => match params::<AmountParams>(request.params) {
            Ok(p) => orchestrator.start_deposit(p.amount).await.map_err(CallError::from).and_then(to_value),
            Err(e) => Err(e),
        },
        "bridge_startWithdrawal" => match params::<AmountParams>(request.params) {
            Ok(p) => orchestrator.start_withdrawal(p.amount).await.map_err(CallError::from).and_then(to_value),
            Err(e) => Err(e),
        },
        "bridge_getStatus" => match params::<IdParams>(request.params) {
            Ok(p) => orchestrator.get_status(p.id).await.map_err(CallError::from).and_then(to_value),
            Err(e) => Err(e),
        },
        "bridge_resume" => match params::<IdParams>(request.params) {
            Ok(p) => orchestrator.resume(p.id).await.map_err(CallError::from).and_then(to_value),
            Err(e) => Err(e),
        },
        _ => {
            return Json(JsonRpcResponse::error(
                request.id,
                METHOD_NOT_FOUND,
                "Method not found".to_string(),
                None,
            ))
        }
    };

    Json(match outcome {
        Ok(result) => JsonRpcResponse::result(request.id, result),
        Err(CallError::InvalidParams(reason)) => JsonRpcResponse::error(
            request.id,
            INVALID_PARAMS,
            format!("Invalid params: {}", reason),
            None,
        ),
        Err(CallError::Bridge(e)) => {
            warn!("{} failed: {}", request.method, e);
            JsonRpcResponse::error(
                request.id,
                APPLICATION_ERROR,
                e.to_string(),
                Some(Value::String(e.error_type().to_string())),
            )
        }
    })
}
