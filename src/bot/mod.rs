//! # Bot Module
//!
//! Discord surface for the playback coordinator.
//!
//! The bot owns one [`PlayerRegistry`] (a coordinator per guild), the track
//! resolver, and the usage store + stats aggregator. Slash commands are thin:
//! they parse arguments, delegate to the guild's coordinator or the stats
//! aggregator, and format the reply. All playback state lives in the
//! coordinator, never here.

use std::sync::Arc;

use anyhow::Result;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use tracing::{error, info};

pub mod commands;
pub mod handlers;

use crate::config::Config;
use crate::player::voice::SongbirdVoice;
use crate::player::{PlaybackCoordinator, PlayerRegistry};
use crate::resolver::TrackResolver;
use crate::usage::stats::StatsAggregator;
use crate::usage::store::UsageStore;

pub struct TempoBot {
    pub config: Arc<Config>,
    pub registry: Arc<PlayerRegistry>,
    pub resolver: Arc<dyn TrackResolver>,
    pub stats: StatsAggregator,
    pub store: Arc<UsageStore>,
}

impl TempoBot {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<PlayerRegistry>,
        resolver: Arc<dyn TrackResolver>,
        store: Arc<UsageStore>,
    ) -> Self {
        Self {
            config,
            registry,
            resolver,
            stats: StatsAggregator::new(store.clone()),
            store,
        }
    }

    /// Une el bot al canal de voz y deja listo el coordinador de la guild.
    pub async fn join_voice(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<PlaybackCoordinator>> {
        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;

        let call = manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| anyhow::anyhow!("No se pudo conectar al canal de voz: {e}"))?;

        let coordinator = self.registry.obtain_for_session(guild_id);
        let voice = SongbirdVoice::new(
            call,
            coordinator.completion_sender(),
            self.config.default_volume,
        );
        coordinator.clone().connect(Arc::new(voice));

        info!("🔊 Conectado al canal de voz en guild {}", guild_id);
        Ok(coordinator)
    }

    /// Desconecta al bot de la guild, persistiendo la reproducción abierta.
    pub async fn leave_voice(&self, ctx: &Context, guild_id: GuildId) -> Result<bool> {
        let left = self.registry.leave(guild_id).await;

        if let Some(manager) = songbird::get(ctx).await {
            let _ = manager.remove(guild_id).await;
        }
        Ok(left)
    }
}

#[async_trait]
impl EventHandler for TempoBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());
        info!("🔧 Application ID: {}", self.config.application_id);

        let result = match self.config.guild_id {
            Some(guild_id) => {
                commands::register_guild_commands(&ctx, GuildId::from(guild_id)).await
            }
            None => commands::register_global_commands(&ctx).await,
        };
        if let Err(e) = result {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Vigila el estado de voz para dos casos: el bot desconectado a mano
    /// (limpiar su coordinador) y el bot solo en el canal (salir).
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;

        // el bot fue desconectado externamente
        if new.user_id == current_user_id && new.channel_id.is_none() {
            if let Some(guild_id) = new.guild_id {
                info!("🔌 Bot desconectado en guild {}", guild_id);
                self.registry.leave(guild_id).await;
                return;
            }
        }

        // auto-salida si el bot quedó solo en su canal
        let Some(guild_id) = new.guild_id.or_else(|| old.as_ref().and_then(|o| o.guild_id))
        else {
            return;
        };
        let Some(manager) = songbird::get(&ctx).await else {
            return;
        };
        let Some(call) = manager.get(guild_id) else {
            return;
        };
        let bot_channel = { call.lock().await.current_channel() };
        let Some(bot_channel) = bot_channel else {
            return;
        };
        let bot_channel = ChannelId::from(bot_channel.0);

        let alone = {
            let Some(guild) = ctx.cache.guild(guild_id) else {
                return;
            };
            guild
                .voice_states
                .values()
                .filter(|vs| vs.channel_id == Some(bot_channel) && vs.user_id != current_user_id)
                .count()
                == 0
        };

        if alone {
            info!("🚪 Bot solo en el canal de guild {}, saliendo", guild_id);
            self.registry.leave(guild_id).await;
            let _ = manager.remove(guild_id).await;
        }
    }
}
