use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use songbird::input::{HttpRequest, Input, YoutubeDl};
use songbird::tracks::{PlayMode, TrackHandle};
use songbird::{Call, Event, EventContext, EventHandler as VoiceEventHandler, TrackEvent};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::track::{PlayableSource, Track};

/// Señal de fin de reproducción. La capa de voz la emite una vez por track
/// asignado: al terminar de forma natural, al detenerlo o al fallar.
#[derive(Debug, Clone, Default)]
pub struct PlaybackEnded {
    pub error: Option<String>,
}

/// Conexión de voz opaca para el coordinador.
///
/// El coordinador solo conoce estas operaciones; la señal de fin llega por el
/// canal que se le entregó a la implementación al construirla, nunca como
/// mutación directa de estado del coordinador.
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    async fn play(&self, track: &Track) -> Result<()>;
    async fn pause(&self) -> Result<()>;
    async fn resume(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
    async fn disconnect(&self) -> Result<()>;
    async fn is_playing(&self) -> bool;
    async fn is_paused(&self) -> bool;
}

/// Implementación sobre Songbird.
pub struct SongbirdVoice {
    call: Arc<Mutex<Call>>,
    http: reqwest::Client,
    ended_tx: flume::Sender<PlaybackEnded>,
    current: parking_lot::Mutex<Option<TrackHandle>>,
    volume: f32,
}

impl SongbirdVoice {
    pub fn new(
        call: Arc<Mutex<Call>>,
        ended_tx: flume::Sender<PlaybackEnded>,
        volume: f32,
    ) -> Self {
        Self {
            call,
            http: reqwest::Client::new(),
            ended_tx,
            current: parking_lot::Mutex::new(None),
            volume,
        }
    }

    fn build_input(&self, track: &Track) -> Input {
        match &track.source {
            PlayableSource::YtDlp { page_url } => {
                Input::from(YoutubeDl::new(self.http.clone(), page_url.clone()))
            }
            PlayableSource::Direct { stream_url } => {
                Input::from(HttpRequest::new(self.http.clone(), stream_url.clone()))
            }
        }
    }

    async fn current_play_mode(&self) -> Option<PlayMode> {
        let handle = { self.current.lock().clone() }?;
        handle.get_info().await.ok().map(|info| info.playing)
    }
}

#[async_trait]
impl VoiceConnection for SongbirdVoice {
    async fn play(&self, track: &Track) -> Result<()> {
        let input = self.build_input(track);

        let handle = {
            let mut call = self.call.lock().await;
            call.play_input(input)
        };
        let _ = handle.set_volume(self.volume);

        let notifier = EndNotifier {
            tx: self.ended_tx.clone(),
        };
        handle
            .add_event(Event::Track(TrackEvent::End), notifier.clone())
            .map_err(|e| anyhow::anyhow!("registrando evento de fin: {e}"))?;
        handle
            .add_event(Event::Track(TrackEvent::Error), notifier)
            .map_err(|e| anyhow::anyhow!("registrando evento de error: {e}"))?;

        *self.current.lock() = Some(handle);
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        if let Some(handle) = { self.current.lock().clone() } {
            handle.pause()?;
        }
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        if let Some(handle) = { self.current.lock().clone() } {
            handle.play()?;
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if let Some(handle) = { self.current.lock().take() } {
            handle.stop()?;
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        *self.current.lock() = None;
        let mut call = self.call.lock().await;
        call.leave()
            .await
            .map_err(|e| anyhow::anyhow!("saliendo del canal de voz: {e}"))?;
        Ok(())
    }

    async fn is_playing(&self) -> bool {
        matches!(self.current_play_mode().await, Some(PlayMode::Play))
    }

    async fn is_paused(&self) -> bool {
        matches!(self.current_play_mode().await, Some(PlayMode::Pause))
    }
}

/// Reenvía el fin de un track como mensaje al bucle del coordinador.
///
/// Corre en el contexto del driver de audio, que el coordinador no posee: su
/// único trabajo es enviar la señal por el canal y volver enseguida. Nada de
/// estado compartido, nada de I/O.
#[derive(Clone)]
struct EndNotifier {
    tx: flume::Sender<PlaybackEnded>,
}

#[async_trait]
impl VoiceEventHandler for EndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let error = if let EventContext::Track(tracks) = ctx {
            tracks.iter().find_map(|(state, _)| match &state.playing {
                PlayMode::Errored(e) => Some(e.to_string()),
                _ => None,
            })
        } else {
            None
        };

        if let Some(error) = &error {
            warn!("⚠️ El driver reportó un error de reproducción: {}", error);
        } else {
            debug!("Track terminado, avisando al coordinador");
        }

        if self.tx.send(PlaybackEnded { error }).is_err() {
            // el coordinador ya no existe; no hay nadie a quien avisar
            debug!("Canal de fin cerrado, señal descartada");
        }
        None
    }
}
