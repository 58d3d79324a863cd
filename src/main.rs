use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use clap::Parser;
use roadvision_hub::{
    buffer::{MemoryBuffer, RedisBuffer, SharedBuffer},
    cli::{requeue_dead_letters, Cli, Commands},
    config::{BufferBackend, PersistenceBackend, ServerConfig},
    handlers::{
        create_records, delete_record, flush_stats, get_record, health_check, list_records,
        update_record,
    },
    ingest::{ingest_record, MqttIngest},
    state::ServerState,
    storage::{
        MemoryRecordStore, PersistenceGateway, PostgresRecordStore, RecordStore, StoreApiGateway,
    },
    sync::{handle_websocket, SyncState},
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Telemetry payloads are small; batches posted to /api/records stay well under this
const MAX_API_BODY_SIZE: usize = 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roadvision_hub=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = ServerConfig::from_env()?;

    let buffer: Arc<dyn SharedBuffer> = match config.buffer_backend {
        BufferBackend::Redis => {
            Arc::new(RedisBuffer::connect(&config.redis_url, &config.redis_queue_key).await?)
        }
        BufferBackend::Memory => Arc::new(MemoryBuffer::new()),
    };

    // Handle CLI commands
    match cli.command {
        Some(Commands::Buffer) => {
            println!("{:<16} {:>10}", "List", "Entries");
            println!("{}", "-".repeat(27));
            println!("{:<16} {:>10}", "pending", buffer.len().await?);
            println!("{:<16} {:>10}", "dead letters", buffer.dead_letter_len().await?);
            return Ok(());
        }
        Some(Commands::Requeue { limit }) => {
            let moved = requeue_dead_letters(buffer.as_ref(), limit).await?;
            println!("Requeued {} entries", moved);
            return Ok(());
        }
        Some(Commands::Serve) | None => {
            // Continue to run server
        }
    }

    let (gateway, record_store): (Arc<dyn PersistenceGateway>, Option<Arc<dyn RecordStore>>) =
        match config.persistence_backend {
            PersistenceBackend::Postgres => {
                let database_url = config.database_url.as_deref().unwrap_or_default();
                let pool = PgPoolOptions::new()
                    .max_connections(10)
                    .connect(database_url)
                    .await?;
                let store = Arc::new(PostgresRecordStore::new(pool));
                store.initialize().await?;
                info!("✅ Database connected and schema initialized");
                let gateway: Arc<dyn PersistenceGateway> = store.clone();
                let record_store: Arc<dyn RecordStore> = store;
                (gateway, Some(record_store))
            }
            PersistenceBackend::StoreApi => {
                let base_url = config.store_api_base_url.as_deref().unwrap_or_default();
                let gateway = StoreApiGateway::new(base_url, config.store_api_timeout)?;
                info!("Forwarding batches to {}", gateway.records_url());
                let gateway: Arc<dyn PersistenceGateway> = Arc::new(gateway);
                (gateway, None)
            }
            PersistenceBackend::Memory => {
                let store = Arc::new(MemoryRecordStore::new());
                let gateway: Arc<dyn PersistenceGateway> = store.clone();
                let record_store: Arc<dyn RecordStore> = store;
                (gateway, Some(record_store))
            }
        };

    info!("🚀 Starting Road Vision hub v{}", VERSION);
    info!("📋 Configuration loaded:");
    info!("   Port: {}", config.port);
    info!("   Bind address: {}", config.bind_addr);
    info!("   Batch size: {}", config.batch_size);
    info!("   Buffer backend: {:?}", config.buffer_backend);
    info!("   Persistence backend: {:?}", config.persistence_backend);
    info!("   MQTT ingest: {}", config.enable_mqtt);

    let has_local_store = record_store.is_some();
    let state = Arc::new(ServerState::new(
        config.clone(),
        buffer,
        gateway,
        record_store,
    ));

    if config.enable_mqtt {
        let ingest = MqttIngest::new(config.mqtt_settings(), state.controller.clone());
        tokio::spawn(ingest.run());
    }

    let sync_state = SyncState {
        registry: state.registry.clone(),
        channel_capacity: config.subscriber_channel_capacity,
    };

    // Build router
    let mut api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/api/stats", get(flush_stats))
        .route("/processed_agent_data/", post(ingest_record));

    if has_local_store {
        api_routes = api_routes
            .route("/api/records", post(create_records).get(list_records))
            .route(
                "/api/records/{id}",
                get(get_record).put(update_record).delete(delete_record),
            );
    }

    let ws_routes = Router::new()
        .route("/ws/{user_id}", get(handle_websocket))
        .with_state(sync_state);

    // CORS configuration - configurable via CORS_ORIGINS env var
    let cors_origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();
    info!("   CORS origins: {:?}", config.cors_origins);
    let cors = CorsLayer::new()
        .allow_origin(cors_origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    let app = Router::new()
        .merge(api_routes)
        .merge(ws_routes)
        .layer(RequestBodyLimitLayer::new(MAX_API_BODY_SIZE))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    // Start server
    let addr: SocketAddr = config.bind_address().parse()?;
    info!("🎧 Listening on http://{}", addr);
    info!("📡 WebSocket endpoint: ws://{}/ws/{{user_id}}", addr);
    info!("🔑 Health endpoint: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
