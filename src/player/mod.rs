//! Reproducción por guild: cola, coordinador y conexión de voz.

pub mod coordinator;
pub mod queue;
pub mod voice;

pub use coordinator::PlaybackCoordinator;

use std::sync::Arc;

use dashmap::DashMap;
use serenity::model::id::GuildId;
use tracing::{debug, info};

use crate::config::Config;
use crate::usage::store::UsageStore;

/// Registro de coordinadores, uno por guild.
///
/// Sustituye cualquier estado global: cada coordinador se construye al unirse
/// a un canal y se descarta al desconectar. Ninguna guild comparte estado
/// mutable con otra; lo único común es el almacén de uso.
pub struct PlayerRegistry {
    coordinators: DashMap<GuildId, Arc<PlaybackCoordinator>>,
    config: Arc<Config>,
    store: Arc<UsageStore>,
}

impl PlayerRegistry {
    pub fn new(config: Arc<Config>, store: Arc<UsageStore>) -> Self {
        Self {
            coordinators: DashMap::new(),
            config,
            store,
        }
    }

    /// Coordinador existente de la guild, si lo hay.
    pub fn get(&self, guild_id: GuildId) -> Option<Arc<PlaybackCoordinator>> {
        self.coordinators.get(&guild_id).map(|c| c.clone())
    }

    /// Coordinador para una sesión de voz nueva o en curso.
    ///
    /// Reutiliza el coordinador si su sesión sigue conectada; si quedó
    /// huérfano (leave o timeout de inactividad), lo reemplaza por uno
    /// recién construido.
    pub fn obtain_for_session(&self, guild_id: GuildId) -> Arc<PlaybackCoordinator> {
        {
            if let Some(existing) = self.coordinators.get(&guild_id) {
                if existing.is_connected() {
                    debug!("Coordinador reutilizado para guild {}", guild_id);
                    return existing.clone();
                }
            }
        }

        let fresh = Arc::new(PlaybackCoordinator::new(
            guild_id,
            self.config.clone(),
            self.store.clone(),
        ));
        self.coordinators.insert(guild_id, fresh.clone());
        info!("🧩 Coordinador nuevo para guild {}", guild_id);
        fresh
    }

    /// Desconecta y descarta el coordinador de la guild.
    pub async fn leave(&self, guild_id: GuildId) -> bool {
        match self.coordinators.remove(&guild_id) {
            Some((_, coordinator)) => coordinator.leave().await,
            None => false,
        }
    }

    /// Desconecta todas las guilds activas (shutdown ordenado).
    pub async fn leave_all(&self) {
        let active: Vec<Arc<PlaybackCoordinator>> = self
            .coordinators
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        self.coordinators.clear();

        let leaving = active.iter().map(|coordinator| coordinator.leave());
        let done = futures::future::join_all(leaving).await;
        info!(
            "👋 {} guilds desconectadas en el apagado",
            done.into_iter().filter(|left| *left).count()
        );
    }
}
