//! REST binding end to end
//!
//! Each simulated node is served over HTTP by a small axum gateway that
//! speaks the node REST API, so the harness reaches it through
//! `HttpNodeApi` exactly as it reaches a live cluster.
//!
//! Runs on the real clock with shortened delays and timeouts.
//!
//! Run with: cargo test -p relaycheck-tests --test http_binding

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::oneshot;

use relaycheck_api::mock::{MockCluster, MockClusterConfig};
use relaycheck_api::{ApiError, HttpNodeApi, NodeApi, AUTH_HEADER};
use relaycheck_core::{format_balance, AccountAddresses, AddressKind, TOKEN_UNIT};
use relaycheck_harness::{CheckError, Cluster, ScenarioConfig, ScenarioKind, Session, Timeouts};
use relaycheck_logging::init_test_logging;
use relaycheck_settings::{ClusterSettings, NodeEndpoint};

const TOKEN: &str = "e2e-secret";

// =========================================================================
// Gateway
// =========================================================================

#[derive(Clone)]
struct Gateway {
    api: Arc<dyn NodeApi>,
    token: String,
}

type Reply = Result<Response, StatusCode>;

fn failed(e: ApiError) -> StatusCode {
    eprintln!("gateway call failed: {}", e);
    StatusCode::INTERNAL_SERVER_ERROR
}

fn status_body(status: StatusCode, name: &str) -> Response {
    (status, Json(json!({ "status": name }))).into_response()
}

fn accepted(ok: bool) -> Response {
    if ok {
        StatusCode::NO_CONTENT.into_response()
    } else {
        status_body(StatusCode::UNPROCESSABLE_ENTITY, "REFUSED")
    }
}

fn found<T: serde::Serialize>(value: Option<T>) -> Response {
    match value {
        Some(value) => Json(value).into_response(),
        None => status_body(StatusCode::NOT_FOUND, "NOT_FOUND"),
    }
}

fn text<'a>(body: &'a Value, key: &str) -> Result<&'a str, StatusCode> {
    body.get(key).and_then(Value::as_str).ok_or(StatusCode::BAD_REQUEST)
}

fn amount(body: &Value) -> Result<u128, StatusCode> {
    text(body, "amount")?.parse().map_err(|_| StatusCode::BAD_REQUEST)
}

fn tag(body: &Value) -> Result<u16, StatusCode> {
    body.get("tag")
        .and_then(Value::as_u64)
        .and_then(|t| u16::try_from(t).ok())
        .ok_or(StatusCode::BAD_REQUEST)
}

async fn require_token(State(gateway): State<Gateway>, request: Request, next: Next) -> Response {
    let presented = request
        .headers()
        .get(AUTH_HEADER)
        .and_then(|v| v.to_str().ok());
    if presented != Some(gateway.token.as_str()) {
        return status_body(StatusCode::UNAUTHORIZED, "UNAUTHORIZED");
    }
    next.run(request).await
}

async fn open_channel(State(g): State<Gateway>, Json(body): Json<Value>) -> Reply {
    let destination = text(&body, "destination")?;
    match g.api.open_channel(destination, amount(&body)?).await.map_err(failed)? {
        Some(id) => Ok((StatusCode::CREATED, Json(json!({ "channelId": id }))).into_response()),
        None => Ok(status_body(StatusCode::CONFLICT, "CHANNEL_ALREADY_OPEN")),
    }
}

async fn list_channels(State(g): State<Gateway>, Query(params): Query<HashMap<String, String>>) -> Reply {
    let include_closed = params.get("includingClosed").is_some_and(|v| v == "true");
    let listing = g.api.all_channels(include_closed).await.map_err(failed)?;
    Ok(Json(listing).into_response())
}

async fn get_channel(State(g): State<Gateway>, Path(id): Path<String>) -> Reply {
    Ok(found(g.api.get_channel(&id).await.map_err(failed)?))
}

async fn close_channel(State(g): State<Gateway>, Path(id): Path<String>) -> Reply {
    Ok(accepted(g.api.close_channel(&id).await.map_err(failed)?))
}

async fn fund_channel(State(g): State<Gateway>, Path(id): Path<String>, Json(body): Json<Value>) -> Reply {
    Ok(accepted(g.api.fund_channel(&id, amount(&body)?).await.map_err(failed)?))
}

async fn channel_tickets(State(g): State<Gateway>, Path(id): Path<String>) -> Reply {
    let tickets = g.api.channel_tickets(&id).await.map_err(failed)?;
    if tickets.is_empty() {
        Ok(status_body(StatusCode::NOT_FOUND, "TICKETS_NOT_FOUND"))
    } else {
        Ok(Json(tickets).into_response())
    }
}

async fn redeem_channel(State(g): State<Gateway>, Path(id): Path<String>) -> Reply {
    Ok(accepted(g.api.channel_redeem_tickets(&id).await.map_err(failed)?))
}

async fn aggregate_channel(State(g): State<Gateway>, Path(id): Path<String>) -> Reply {
    Ok(accepted(g.api.channel_aggregate_tickets(&id).await.map_err(failed)?))
}

async fn send_message(State(g): State<Gateway>, Json(body): Json<Value>) -> Reply {
    let path: Vec<String> = body
        .get("path")
        .and_then(Value::as_array)
        .map(|hops| hops.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    let sent = g
        .api
        .send_message(text(&body, "peerId")?, text(&body, "body")?, &path, tag(&body)?)
        .await
        .map_err(failed)?;
    if sent {
        Ok((StatusCode::ACCEPTED, Json(json!({ "challenge": "ok" }))).into_response())
    } else {
        Ok(status_body(StatusCode::UNPROCESSABLE_ENTITY, "INVALID_PATH"))
    }
}

async fn pop(State(g): State<Gateway>, Json(body): Json<Value>) -> Reply {
    Ok(found(g.api.messages_pop(tag(&body)?).await.map_err(failed)?))
}

async fn peek_all(State(g): State<Gateway>, Json(body): Json<Value>) -> Reply {
    Ok(found(g.api.messages_peek_all(tag(&body)?).await.map_err(failed)?))
}

async fn statistics(State(g): State<Gateway>) -> Reply {
    Ok(Json(g.api.tickets_statistics().await.map_err(failed)?).into_response())
}

async fn redeem_all(State(g): State<Gateway>) -> Reply {
    Ok(accepted(g.api.redeem_all_tickets().await.map_err(failed)?))
}

async fn peers(State(g): State<Gateway>) -> Reply {
    let connected = g.api.peers().await.map_err(failed)?;
    Ok(Json(json!({ "connected": connected, "announced": [] })).into_response())
}

async fn ping(State(g): State<Gateway>, Path(peer): Path<String>) -> Reply {
    match g.api.ping(&peer).await.map_err(failed)? {
        Some(response) => Ok(Json(response).into_response()),
        None => Ok(status_body(StatusCode::UNPROCESSABLE_ENTITY, "TIMEOUT")),
    }
}

async fn balances(State(g): State<Gateway>) -> Reply {
    Ok(Json(g.api.balances().await.map_err(failed)?).into_response())
}

async fn addresses(State(g): State<Gateway>) -> Reply {
    let addresses = AccountAddresses {
        native: g.api.address(AddressKind::Native).await.map_err(failed)?,
        hopr: g.api.address(AddressKind::Hopr).await.map_err(failed)?,
    };
    Ok(Json(addresses).into_response())
}

async fn price(State(g): State<Gateway>) -> Reply {
    let price = g.api.ticket_price().await.map_err(failed)?;
    Ok(found(price.map(|p| json!({ "price": format_balance(p, TOKEN_UNIT) }))))
}

async fn set_alias(State(g): State<Gateway>, Json(body): Json<Value>) -> Reply {
    let set = g
        .api
        .set_alias(text(&body, "alias")?, text(&body, "peerId")?)
        .await
        .map_err(failed)?;
    Ok(accepted(set))
}

async fn get_alias(State(g): State<Gateway>, Path(alias): Path<String>) -> Reply {
    let peer = g.api.get_alias(&alias).await.map_err(failed)?;
    Ok(found(peer.map(|p| json!({ "peerId": p }))))
}

async fn remove_alias(State(g): State<Gateway>, Path(alias): Path<String>) -> Reply {
    Ok(accepted(g.api.remove_alias(&alias).await.map_err(failed)?))
}

fn router(gateway: Gateway) -> Router {
    let api = Router::new()
        .route("/channels", get(list_channels).post(open_channel))
        .route("/channels/{id}", get(get_channel).delete(close_channel))
        .route("/channels/{id}/fund", post(fund_channel))
        .route("/channels/{id}/tickets", get(channel_tickets))
        .route("/channels/{id}/tickets/redeem", post(redeem_channel))
        .route("/channels/{id}/tickets/aggregate", post(aggregate_channel))
        .route("/messages", post(send_message))
        .route("/messages/pop", post(pop))
        .route("/messages/peek-all", post(peek_all))
        .route("/tickets/statistics", get(statistics))
        .route("/tickets/redeem", post(redeem_all))
        .route("/node/peers", get(peers))
        .route("/peers/{peer}/ping", post(ping))
        .route("/account/balances", get(balances))
        .route("/account/addresses", get(addresses))
        .route("/network/price", get(price))
        .route("/aliases", post(set_alias))
        .route("/aliases/{alias}", get(get_alias).delete(remove_alias))
        .layer(middleware::from_fn_with_state(gateway.clone(), require_token))
        .with_state(gateway);
    Router::new().nest("/api/v3", api)
}

async fn serve(api: Arc<dyn NodeApi>) -> (SocketAddr, oneshot::Sender<()>) {
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let app = router(Gateway {
        api,
        token: TOKEN.to_string(),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .unwrap();
    });

    (addr, shutdown_tx)
}

// =========================================================================
// Fixture
// =========================================================================

struct ServedCluster {
    mock: MockCluster,
    settings: ClusterSettings,
    _shutdown: Vec<oneshot::Sender<()>>,
}

fn fast_mock() -> MockClusterConfig {
    MockClusterConfig {
        aggregation_threshold: 10,
        source_index_delay: Duration::from_millis(10),
        counterparty_index_delay: Duration::from_millis(40),
        hop_delay: Duration::from_millis(10),
        closure_window: Duration::from_millis(100),
        redeem_delay: Duration::from_millis(50),
        busy_window: Duration::from_millis(50),
        discovery_delay: Duration::from_millis(100),
        ..Default::default()
    }
}

fn fast_config() -> ScenarioConfig {
    ScenarioConfig {
        aggregation_threshold: 10,
        timeouts: Timeouts {
            poll_interval: Duration::from_millis(20),
            channel_status: Duration::from_secs(2),
            closure_cooldown: Duration::from_millis(150),
            delivery: Duration::from_secs(2),
            extended_delivery: Duration::from_secs(4),
            unredeemed: Duration::from_secs(2),
            redemption: Duration::from_secs(4),
            action_retry: Duration::from_secs(2),
            connectivity: Duration::from_secs(2),
            aggregation_settle: Duration::from_millis(100),
            auto_redeem: Duration::from_secs(4),
            request: Duration::from_secs(2),
        },
        ..Default::default()
    }
}

async fn served_cluster(token: &str) -> ServedCluster {
    init_test_logging();
    let (mock, handles) = MockCluster::standard(fast_mock());

    let mut nodes = Vec::new();
    let mut shutdown = Vec::new();
    for handle in handles {
        let name = handle.name().to_string();
        let (addr, tx) = serve(Arc::new(handle)).await;
        nodes.push(NodeEndpoint {
            name,
            api_url: format!("http://{}", addr),
            api_token: token.to_string(),
        });
        shutdown.push(tx);
    }

    ServedCluster {
        mock,
        settings: ClusterSettings {
            nodes,
            ..Default::default()
        },
        _shutdown: shutdown,
    }
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn full_catalogue_over_http() {
    let served = served_cluster(TOKEN).await;
    let config = fast_config();
    let cluster = Cluster::connect(&served.settings, &config.timeouts).await.unwrap();
    let session = Session::prepare(cluster, config).await.unwrap();

    let reports = session.run_all(&ScenarioKind::ALL).await;
    for report in &reports {
        assert!(report.passed(), "{} failed: {:?}", report.kind, report.result);
    }
    assert_eq!(served.mock.unclosed_channels(), 0);
}

#[tokio::test]
async fn wrong_token_is_refused() {
    let served = served_cluster("not-the-token").await;
    let config = fast_config();

    match Cluster::connect(&served.settings, &config.timeouts).await {
        Err(CheckError::Api(ApiError::Status { status, message })) => {
            assert_eq!(status, 401);
            assert_eq!(message, "UNAUTHORIZED");
        }
        other => panic!("unexpected {:?}", other.map(|c| c.nodes().len())),
    }
}

#[tokio::test]
async fn refusals_map_to_outcomes() {
    let served = served_cluster(TOKEN).await;
    let endpoint = &served.settings.nodes[0];
    let other = &served.settings.nodes[1];
    let api = HttpNodeApi::new(&endpoint.api_url, Some(TOKEN.to_string()), Duration::from_secs(2)).unwrap();
    let other_api = HttpNodeApi::new(&other.api_url, Some(TOKEN.to_string()), Duration::from_secs(2)).unwrap();
    let me = api.address(AddressKind::Hopr).await.unwrap();
    let destination = other_api.address(AddressKind::Native).await.unwrap();

    // 404 on an empty inbox, alias or ticket list
    assert!(api.messages_pop(4242).await.unwrap().is_none());
    assert!(api.get_alias("nobody").await.unwrap().is_none());
    assert!(api.channel_tickets("0x00").await.unwrap().is_empty());

    // 422 on a self ping
    assert!(api.ping(&me).await.unwrap().is_none());

    // 409 on a second open of the same pair
    let id = api.open_channel(&destination, 100).await.unwrap().unwrap();
    assert!(api.open_channel(&destination, 100).await.unwrap().is_none());

    // 422 on closing someone else's channel
    assert!(!other_api.close_channel(&id).await.unwrap());
    assert!(api.close_channel(&id).await.unwrap());

    assert_eq!(api.ticket_price().await.unwrap(), Some(100));
    assert_eq!(served.mock.unclosed_channels(), 1);
}
