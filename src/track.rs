use chrono::{DateTime, Utc};
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::time::Duration;

use crate::resolver::ResolvedTrack;
use crate::usage::{TrackPlayed, TrackRequested};

/// Fuente de audio reproducible, resuelta por la capa de resolución.
///
/// El coordinador nunca la interpreta: solo la entrega a la conexión de voz,
/// que construye el input de Songbird en el momento de reproducir.
#[derive(Debug, Clone)]
pub enum PlayableSource {
    /// Página de video que yt-dlp extrae al reproducir.
    YtDlp { page_url: String },
    /// URL de audio directa, sin extracción.
    Direct { stream_url: String },
}

/// Un track resuelto y listo para encolar, con su contabilidad de reproducción.
///
/// Los campos de identidad y de solicitante se copian una sola vez al
/// construirlo desde el resultado del resolver. Los intervalos
/// (started/stopped) registran cada periodo audible: cubre pausas,
/// reanudaciones y repeticiones por loop.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub url: String,
    pub duration: Option<Duration>,
    pub source: PlayableSource,

    pub guild_id: GuildId,
    pub requester_id: UserId,
    #[allow(dead_code)]
    pub channel_id: ChannelId,
    pub requested_at: DateTime<Utc>,

    pub(crate) first_played_at: Option<DateTime<Utc>>,
    pub(crate) started: Vec<DateTime<Utc>>,
    pub(crate) stopped: Vec<DateTime<Utc>>,
}

impl Track {
    pub fn new(
        resolved: ResolvedTrack,
        guild_id: GuildId,
        requester_id: UserId,
        channel_id: ChannelId,
    ) -> Self {
        Self {
            id: resolved.id,
            title: resolved.title,
            url: resolved.url,
            duration: resolved.duration,
            source: resolved.source,
            guild_id,
            requester_id,
            channel_id,
            requested_at: Utc::now(),
            first_played_at: None,
            started: Vec::new(),
            stopped: Vec::new(),
        }
    }

    /// Registra el inicio (o reanudación) de un periodo audible.
    pub fn record_start(&mut self) {
        if self.started.len() > self.stopped.len() {
            // ya hay un intervalo abierto
            return;
        }
        let now = Utc::now();
        if self.first_played_at.is_none() {
            self.first_played_at = Some(now);
        }
        self.started.push(now);
    }

    /// Cierra el intervalo audible abierto, si lo hay.
    pub fn record_stop(&mut self) {
        if self.started.len() > self.stopped.len() {
            self.stopped.push(Utc::now());
        }
    }

    #[allow(dead_code)]
    pub fn first_played_at(&self) -> Option<DateTime<Utc>> {
        self.first_played_at
    }

    /// Tiempo total audible: la suma de los intervalos cerrados más el
    /// intervalo abierto (hasta ahora) si existe.
    pub fn total_played(&self) -> Duration {
        let now = Utc::now();
        let mut total = Duration::ZERO;
        for (i, start) in self.started.iter().enumerate() {
            let stop = self.stopped.get(i).copied().unwrap_or(now);
            total += stop
                .signed_duration_since(*start)
                .to_std()
                .unwrap_or_default();
        }
        total
    }

    /// Evento persistible de solicitud, con el timestamp de la solicitud.
    pub fn request_event(&self) -> TrackRequested {
        TrackRequested {
            timestamp: self.requested_at,
            guild_id: self.guild_id.get(),
            requester_id: self.requester_id.get(),
            track_id: self.id.clone(),
        }
    }

    /// Evento persistible de reproducción. El timestamp es la primera vez que
    /// sonó; la duración es el total audible acumulado hasta este retiro.
    pub fn play_event(&self) -> TrackPlayed {
        TrackPlayed {
            timestamp: self.first_played_at.unwrap_or(self.requested_at),
            guild_id: self.guild_id.get(),
            requester_id: self.requester_id.get(),
            track_id: self.id.clone(),
            duration_seconds: self.total_played().as_secs_f64(),
        }
    }
}
