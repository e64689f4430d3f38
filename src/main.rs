use std::sync::Arc;

use order_desk::attachments::AttachmentStore;
use order_desk::config::AppConfig;
use order_desk::mail::outbound::Mailer;
use order_desk::recorder::Recorder;
use order_desk::routes::{AppState, app_routes};
use order_desk::store::{LibSqlStore, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install rustls crypto provider before any TLS usage (lettre).
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env();

    eprintln!("📦 Order Desk v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Webhook: http://0.0.0.0:{}/webhooks/inbound-email", config.port);
    eprintln!("   Threads: http://0.0.0.0:{}/api/orders/{{id}}/communications", config.port);
    eprintln!("   Inbound domain: {}", config.inbound_domain);

    // ── Database ─────────────────────────────────────────────────────────
    let store: Arc<dyn Store> = Arc::new(
        LibSqlStore::new_local(&config.db_path)
            .await
            .unwrap_or_else(|e| {
                eprintln!(
                    "Error: Failed to open database at {}: {}",
                    config.db_path.display(),
                    e
                );
                std::process::exit(1);
            }),
    );
    eprintln!("   Database: {}", config.db_path.display());

    // ── Attachments ──────────────────────────────────────────────────────
    let attachments = Arc::new(AttachmentStore::new(&config.attachment_dir));
    eprintln!("   Attachments: {}", config.attachment_dir.display());

    // ── Outbound mail ────────────────────────────────────────────────────
    let mailer = match &config.smtp {
        Some(smtp) => {
            eprintln!("   SMTP: enabled ({}:{})", smtp.host, smtp.port);
            Some(Mailer::new(smtp.clone()))
        }
        None => {
            eprintln!("   SMTP: disabled (set SMTP_HOST to enable delivery)");
            None
        }
    };

    let recorder = Arc::new(Recorder::new(
        Arc::clone(&store),
        attachments,
        config.inbound_domain.clone(),
        mailer,
    ));

    // ── HTTP server ──────────────────────────────────────────────────────
    let app = app_routes(AppState { recorder, store });
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(port = config.port, "Order Desk listening");
    axum::serve(listener, app).await?;

    Ok(())
}
