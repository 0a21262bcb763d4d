use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;

use session_persistence::{StatsLedger, connect_and_migrate};
use session_server::{config::Config, create_routes, room::RoomManager, websocket::ConnectionManager};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    info!("Starting Close Call server...");

    let config = Config::new();
    let connection_manager = Arc::new(ConnectionManager::new());

    // Initialize database connection and run migrations
    let db = match connect_and_migrate().await {
        Ok(db) => db,
        Err(e) => {
            tracing::error!("Failed to connect to database and run migrations: {}", e);
            std::process::exit(1);
        }
    };
    let ledger = Arc::new(StatsLedger::new(db));

    let room_manager = Arc::new(RoomManager::new(
        config.session_config(),
        connection_manager.clone(),
        ledger.clone(),
    ));

    let routes = create_routes(connection_manager.clone(), room_manager.clone(), ledger);

    // Start cleanup task
    let cleanup_connection_manager = connection_manager.clone();
    let cleanup_room_manager = room_manager.clone();
    let cleanup_config = config.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            let connection_timeout = Duration::from_secs(cleanup_config.connection_timeout_seconds);
            let room_timeout = Duration::from_secs(cleanup_config.room_timeout_minutes * 60);

            for connection_id in cleanup_connection_manager
                .inactive_connections(connection_timeout)
                .await
            {
                info!("Removing inactive connection: {}", connection_id);
                if let Some((room, participant)) = cleanup_connection_manager
                    .remove_connection(connection_id)
                    .await
                {
                    cleanup_room_manager.leave(&room, participant.id).await;
                }
            }
            cleanup_room_manager
                .cleanup_expired_rooms(room_timeout)
                .await;
        }
    });

    info!("Server starting on {}:{}", config.host, config.port);

    let addr = (
        config
            .host
            .parse::<std::net::IpAddr>()
            .expect("Invalid HOST"),
        config.port,
    );

    let (addr, server) = warp::serve(routes).bind_with_graceful_shutdown(addr, async {
        // Wait for SIGINT (Ctrl+C) or SIGTERM
        #[cfg(unix)]
        {
            let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
                .expect("Failed to install SIGINT handler");
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler");

            tokio::select! {
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully...");
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            signal::ctrl_c().await.expect("Failed to listen for ctrl+c");
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    });

    info!(
        "Server started successfully on {}. Press Ctrl+C to stop.",
        addr
    );
    server.await;
    info!("Server shutdown complete.");
}
