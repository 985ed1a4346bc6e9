use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::SerenityInit;
use std::sync::Arc;
use tracing::{error, info};

mod bot;
mod config;
mod player;
mod resolver;
mod track;
mod ui;
mod usage;

use crate::bot::TempoBot;
use crate::config::Config;
use crate::player::PlayerRegistry;
use crate::resolver::{TrackResolver, YtdlResolver};
use crate::usage::store::UsageStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tempo_bot=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Tempo Bot v{}", env!("CARGO_PKG_VERSION"));

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    let config = Arc::new(Config::load()?);

    // Almacén de uso (append-only) y coordinadores por guild
    let store = Arc::new(
        UsageStore::open(
            &config.data_dir,
            config.enable_usage_log,
            config.reset_usage_log,
        )
        .await?,
    );
    let registry = Arc::new(PlayerRegistry::new(config.clone(), store.clone()));
    let resolver: Arc<dyn TrackResolver> = Arc::new(YtdlResolver::new());

    let intents =
        GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES | GatewayIntents::GUILD_MESSAGES;

    let handler = TempoBot::new(config.clone(), registry.clone(), resolver, store);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird()
        .await?;

    // Apagado ordenado: cada guild persiste su reproducción abierta al salir
    let shutdown_registry = registry.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Error al registrar Ctrl+C");
        info!("⚠️ Señal de apagado recibida, cerrando...");
        shutdown_registry.leave_all().await;
        std::process::exit(0);
    });

    info!("🚀 Bot iniciado");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check() -> Result<()> {
    YtdlResolver::verify_available().await?;
    println!("OK");
    Ok(())
}
