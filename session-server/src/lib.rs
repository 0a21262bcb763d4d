use std::sync::Arc;
use warp::Filter;

use crate::room::RoomManager;
use crate::websocket::ConnectionManager;
use session_persistence::StatsLedger;
use session_types::ParticipantId;

pub mod config;
pub mod error;
pub mod room;
pub mod websocket;

pub fn create_routes(
    connection_manager: Arc<ConnectionManager>,
    room_manager: Arc<RoomManager>,
    ledger: Arc<StatsLedger>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    // Clone for filters
    let connection_manager_filter = warp::any().map({
        let connection_manager = connection_manager.clone();
        move || connection_manager.clone()
    });

    let room_manager_filter = warp::any().map({
        let room_manager = room_manager.clone();
        move || room_manager.clone()
    });

    let ledger_filter = warp::any().map({
        let ledger = ledger.clone();
        move || ledger.clone()
    });

    // WebSocket endpoint
    let websocket = warp::path("ws")
        .and(warp::ws())
        .and(connection_manager_filter.clone())
        .and(room_manager_filter.clone())
        .map(|ws: warp::ws::Ws, conn_mgr, room_mgr| {
            ws.on_upgrade(move |socket| websocket::handle_connection(socket, conn_mgr, room_mgr))
        });

    // Health check endpoint
    let health = warp::path("health")
        .and(warp::get())
        .map(|| warp::reply::with_status("OK", warp::http::StatusCode::OK));

    // Pairwise ledger endpoint
    let ledger_route = warp::path!("ledger" / u32)
        .and(warp::get())
        .and(ledger_filter.clone())
        .and_then(handle_ledger_request);

    // CORS configuration
    let cors = warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["content-type"])
        .allow_methods(vec!["GET"]);

    websocket
        .or(health)
        .or(ledger_route)
        .with(cors)
        .with(warp::log("close_call"))
}

async fn handle_ledger_request(
    participant_id: u32,
    ledger: Arc<StatsLedger>,
) -> Result<impl warp::Reply, warp::Rejection> {
    match ledger.for_owner(ParticipantId(participant_id)).await {
        Ok(rows) => Ok(warp::reply::with_status(
            warp::reply::json(&rows),
            warp::http::StatusCode::OK,
        )),
        Err(err) => {
            tracing::error!("Failed to fetch ledger: {}", err);
            Ok(warp::reply::with_status(
                warp::reply::json(&serde_json::json!({
                    "error": "Failed to fetch ledger"
                })),
                warp::http::StatusCode::INTERNAL_SERVER_ERROR,
            ))
        }
    }
}
