//! HTTP surface of the node: chain dump, peer dump, liveness target,
//! local mining and gossip ingestion

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::chain::ChainStore;
use crate::error::{ChainError, ChainmeshError};
use crate::gossip::{BlockPayload, ChainPayload, GossipService, NodesPayload, NODE_ADDR_HEADER};
use crate::peers::PeerRegistry;

/// Shared application state passed to handlers.
#[derive(Clone)]
pub struct AppState {
    pub chain: ChainStore,
    pub peers: PeerRegistry,
    pub gossip: GossipService,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct PingResponse {
    status: &'static str,
}

#[derive(Deserialize)]
struct AddBlockRequest {
    data: String,
}

/// Build the node router with all routes and the peer-recording layer.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chain", get(get_chain))
        .route("/nodes", get(get_nodes))
        .route("/ping", get(ping))
        .route("/add", post(add_block))
        .route("/receive-block", post(receive_block))
        .layer(middleware::from_fn_with_state(state.clone(), record_peer))
        .with_state(state)
}

/// Record the sender's advertised dialable address, when present.
///
/// Only the self-reported `Node-Addr` header enters the registry; the
/// socket origin is ignored since its port is usually not dialable.
async fn record_peer(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(addr) = request
        .headers()
        .get(NODE_ADDR_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        state.peers.add(addr).await;
    }
    next.run(request).await
}

/// Route: GET /chain
async fn get_chain(State(state): State<AppState>) -> Json<ChainPayload> {
    debug!("GET /chain");
    Json(ChainPayload {
        data: state.chain.blocks().await,
    })
}

/// Route: GET /nodes
async fn get_nodes(State(state): State<AppState>) -> Json<NodesPayload> {
    debug!("GET /nodes");
    Json(NodesPayload {
        data: state.peers.list().await,
    })
}

/// Route: GET /ping
async fn ping() -> Json<PingResponse> {
    Json(PingResponse { status: "alive" })
}

/// Mine a block with the supplied payload, append it and fan it out to all
/// known peers. Route: POST /add
async fn add_block(
    State(state): State<AppState>,
    Json(req): Json<AddBlockRequest>,
) -> Result<Json<BlockPayload>, (StatusCode, Json<ErrorResponse>)> {
    info!("POST /add");
    let block = state.chain.append(req.data).await.map_err(to_http_error)?;
    state.gossip.broadcast_block(&block).await;
    Ok(Json(BlockPayload { data: block }))
}

/// Ingest a gossip-propagated block as the new tip. Route: POST /receive-block
async fn receive_block(
    State(state): State<AppState>,
    Json(payload): Json<BlockPayload>,
) -> Result<Json<&'static str>, (StatusCode, Json<ErrorResponse>)> {
    info!(index = payload.data.index, "POST /receive-block");
    state
        .chain
        .accept_external_block(payload.data)
        .await
        .map_err(to_http_error)?;
    Ok(Json("Block added to the chain"))
}

fn to_http_error(err: ChainmeshError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &err {
        ChainmeshError::Block(_) => StatusCode::BAD_REQUEST,
        ChainmeshError::Chain(ChainError::EmptyChain) => StatusCode::CONFLICT,
        ChainmeshError::Chain(ChainError::StaleTip) => StatusCode::CONFLICT,
        ChainmeshError::Chain(_) => StatusCode::BAD_REQUEST,
        ChainmeshError::Network(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}
