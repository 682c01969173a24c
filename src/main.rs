/// Groupwarden server binary
use anyhow::Context;
use groupwarden::{
    config::{LoggingConfig, ServerConfig},
    jobs::JobScheduler,
    server, AppContext,
};
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = ServerConfig::from_env().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.logging);

    // Print banner
    print_banner();

    // Create application context
    let ctx = AppContext::new(config)
        .await
        .context("Failed to initialize application")?;
    let ctx = Arc::new(ctx);

    // Start background jobs
    let scheduler = Arc::new(JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    // Start server
    server::serve((*ctx).clone()).await?;

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level)
        .unwrap_or_else(|_| "groupwarden=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if logging.json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

fn print_banner() {
    println!(
        r#"
   ____                        _       __               __
  / ___|_ __ ___  _   _ _ __  | |     / /___ __________/ /__  ____
 | |  _| '__/ _ \| | | | '_ \ | | /| / / __ `/ ___/ __  / _ \/ __ \
 | |_| | | | (_) | |_| | |_) || |/ |/ / /_/ / /  / /_/ /  __/ / / /
  \____|_|  \___/ \__,_| .__/ |__/|__/\__,_/_/   \__,_/\___/_/ /_/
                       |_|
        Group moderation backend v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
