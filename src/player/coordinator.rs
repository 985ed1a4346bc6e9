use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serenity::model::id::GuildId;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::player::queue::{QueueFull, TrackQueue};
use crate::player::voice::{PlaybackEnded, VoiceConnection};
use crate::track::Track;
use crate::usage::store::UsageStore;
use crate::usage::UsageEvent;

/// Coordinador de reproducción de una guild.
///
/// Posee la cola, el track actual y la conexión de voz, y corre un bucle de
/// control que extrae tracks de la cola, los reproduce y reacciona a la señal
/// de fin. Ese bucle es el único que asigna y retira `current`: las
/// operaciones públicas piden cosas a la capa de voz o tocan la cola, y toda
/// la contabilidad de retiro (cerrar intervalo, persistir TrackPlayed,
/// reencolar por loop) ocurre en un solo sitio.
///
/// La señal de fin llega desde el driver de audio por un canal; el bucle es
/// su único consumidor. Un hilo ajeno jamás escribe `current` directamente.
pub struct PlaybackCoordinator {
    guild_id: GuildId,
    config: Arc<Config>,
    store: Arc<UsageStore>,
    queue: TrackQueue,
    current: Mutex<Option<Track>>,
    voice: RwLock<Option<Arc<dyn VoiceConnection>>>,
    ended_tx: flume::Sender<PlaybackEnded>,
    ended_rx: flume::Receiver<PlaybackEnded>,
    /// Marcada antes de un stop explícito (skip/stop/leave) para que el
    /// retiro no reencole el track aunque el loop esté activo.
    interrupted: AtomicBool,
    running: AtomicBool,
    shutdown: Mutex<CancellationToken>,
}

impl PlaybackCoordinator {
    pub fn new(guild_id: GuildId, config: Arc<Config>, store: Arc<UsageStore>) -> Self {
        let (ended_tx, ended_rx) = flume::unbounded();
        Self {
            guild_id,
            config: config.clone(),
            store,
            queue: TrackQueue::new(config.max_queue_size),
            current: Mutex::new(None),
            voice: RwLock::new(None),
            ended_tx,
            ended_rx,
            interrupted: AtomicBool::new(false),
            running: AtomicBool::new(false),
            shutdown: Mutex::new(CancellationToken::new()),
        }
    }

    /// Sender que la conexión de voz usará para avisar del fin de cada track.
    pub fn completion_sender(&self) -> flume::Sender<PlaybackEnded> {
        self.ended_tx.clone()
    }

    pub fn queue(&self) -> &TrackQueue {
        &self.queue
    }

    #[allow(dead_code)]
    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Asigna la conexión de voz y arranca el bucle de control si no corre.
    ///
    /// Un coordinador vive una sola sesión de voz: el registro crea una
    /// instancia nueva por join y descarta la vieja al desconectar. Llamarlo
    /// de nuevo con la sesión viva solo reemplaza la conexión (mover de
    /// canal).
    pub fn connect(self: Arc<Self>, voice: Arc<dyn VoiceConnection>) {
        *self.voice.write() = Some(voice);

        if !self.running.swap(true, Ordering::SeqCst) {
            let token = CancellationToken::new();
            *self.shutdown.lock() = token.clone();
            tokio::spawn(async move {
                self.run(token).await;
            });
        }
    }

    pub fn is_connected(&self) -> bool {
        self.voice.read().is_some()
    }

    /// Copia del track actual, si hay algo sonando o en pausa.
    pub fn current_track(&self) -> Option<Track> {
        self.current.lock().clone()
    }

    /// Encola un track y persiste su evento de solicitud de inmediato,
    /// independiente de cuándo llegue a sonar.
    pub async fn enqueue(&self, track: Track, play_next: bool) -> Result<(), QueueFull> {
        let request = track.request_event();
        self.queue.push(track, play_next)?;
        self.store.record(UsageEvent::TrackRequested(request)).await;
        Ok(())
    }

    /// Salta el track actual. El avance real ocurre cuando el driver señala
    /// el fin; aquí solo se pide el stop.
    pub async fn skip(&self) -> bool {
        let Some(voice) = self.voice_handle() else {
            return false;
        };
        if self.current.lock().is_none() {
            return false;
        }
        if !voice.is_playing().await && !voice.is_paused().await {
            return false;
        }

        self.interrupted.store(true, Ordering::SeqCst);
        if let Err(e) = voice.stop().await {
            warn!("⚠️ No se pudo detener el track en guild {}: {:#}", self.guild_id, e);
        }
        true
    }

    /// Pausa el track actual y cierra su intervalo audible.
    pub async fn pause(&self) -> bool {
        let Some(voice) = self.voice_handle() else {
            return false;
        };
        if self.current.lock().is_none() || !voice.is_playing().await {
            return false;
        }
        if let Err(e) = voice.pause().await {
            warn!("⚠️ No se pudo pausar en guild {}: {:#}", self.guild_id, e);
            return false;
        }
        if let Some(track) = self.current.lock().as_mut() {
            track.record_stop();
        }
        true
    }

    /// Reanuda el track pausado y abre un intervalo audible nuevo.
    pub async fn resume(&self) -> bool {
        let Some(voice) = self.voice_handle() else {
            return false;
        };
        if self.current.lock().is_none() || !voice.is_paused().await {
            return false;
        }
        if let Some(track) = self.current.lock().as_mut() {
            track.record_start();
        }
        if let Err(e) = voice.resume().await {
            warn!("⚠️ No se pudo reanudar en guild {}: {:#}", self.guild_id, e);
            return false;
        }
        true
    }

    /// Vacía la cola y detiene el track actual, si lo hay.
    pub async fn stop(&self) -> bool {
        let had_queue = !self.queue.is_empty();
        self.queue.clear();

        let had_current = self.current.lock().is_some();
        if had_current {
            self.interrupted.store(true, Ordering::SeqCst);
            if let Some(voice) = self.voice_handle() {
                if let Err(e) = voice.stop().await {
                    warn!("⚠️ No se pudo detener el track en guild {}: {:#}", self.guild_id, e);
                }
            }
        }

        had_queue || had_current
    }

    /// Detiene todo y abandona el canal de voz. Si había una reproducción
    /// abierta, su TrackPlayed se persiste antes de desconectar.
    pub async fn leave(&self) -> bool {
        let Some(voice) = self.voice.write().take() else {
            return false;
        };

        self.queue.clear();
        self.interrupted.store(true, Ordering::SeqCst);
        self.shutdown.lock().cancel();

        if self.current.lock().is_some() {
            if let Err(e) = voice.stop().await {
                warn!("⚠️ No se pudo detener el track en guild {}: {:#}", self.guild_id, e);
            }
        }
        self.finish_current().await;

        if let Err(e) = voice.disconnect().await {
            warn!("⚠️ Error al desconectar de guild {}: {:#}", self.guild_id, e);
        }
        info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
        true
    }

    fn voice_handle(&self) -> Option<Arc<dyn VoiceConnection>> {
        self.voice.read().clone()
    }

    /// Bucle de control: extrae el siguiente track, lo reproduce y espera la
    /// señal de fin. La espera de cola está acotada por el timeout de
    /// inactividad; al vencer, el coordinador se desconecta solo.
    async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!("▶️ Bucle de reproducción iniciado para guild {}", self.guild_id);

        loop {
            // señales viejas de reproducciones anteriores
            while self.ended_rx.try_recv().is_ok() {}

            let polled = tokio::select! {
                _ = shutdown.cancelled() => break,
                polled = tokio::time::timeout(
                    self.config.inactivity_timeout(),
                    self.queue.next(),
                ) => polled,
            };

            let track = match polled {
                Ok(track) => track,
                Err(_) => {
                    info!(
                        "💤 {}s sin actividad en guild {}, desconectando",
                        self.config.inactivity_timeout_secs, self.guild_id
                    );
                    self.teardown().await;
                    break;
                }
            };

            let Some(voice) = self.voice_handle() else {
                break;
            };

            let playing = {
                let mut current = self.current.lock();
                let mut track = track;
                track.record_start();
                let snapshot = track.clone();
                *current = Some(track);
                snapshot
            };
            info!("🎵 Reproduciendo {} en guild {}", playing.title, self.guild_id);

            if let Err(e) = voice.play(&playing).await {
                error!(
                    "❌ Error al iniciar {} en guild {}: {:#}",
                    playing.id, self.guild_id, e
                );
                self.finish_current().await;
                continue;
            }

            let ended = tokio::select! {
                _ = shutdown.cancelled() => break,
                msg = self.ended_rx.recv_async() => msg.unwrap_or_default(),
            };

            if let Some(reason) = &ended.error {
                // un track malo nunca atasca al coordinador: se avanza igual
                error!(
                    "❌ Reproducción con error en guild {} (track {}): {}",
                    self.guild_id, playing.id, reason
                );
            }
            self.finish_current().await;
        }

        self.running.store(false, Ordering::SeqCst);
        debug!("Bucle de reproducción detenido para guild {}", self.guild_id);
    }

    /// Retira el track actual: cierra el intervalo abierto, persiste su
    /// TrackPlayed y, si toca, lo reencola por loop. Es la única salida de
    /// `current`; si ya se retiró, no hace nada.
    async fn finish_current(&self) {
        let finished = { self.current.lock().take() };
        let Some(mut track) = finished else {
            self.interrupted.store(false, Ordering::SeqCst);
            return;
        };

        track.record_stop();
        self.store.record(UsageEvent::TrackPlayed(track.play_event())).await;

        let interrupted = self.interrupted.swap(false, Ordering::SeqCst);
        if self.queue.is_loop() && !interrupted {
            // reencolar solo tras un fin natural, nunca tras skip/stop
            debug!("🔁 Reencolando {} en guild {}", track.title, self.guild_id);
            if let Err(e) = self.queue.push(track, false) {
                warn!("🔁 No se pudo reencolar en guild {}: {}", self.guild_id, e);
            }
        }
    }

    /// Desconexión por inactividad: el bucle ya terminó de esperar, no hay
    /// nada sonando. Suelta la conexión exactamente una vez.
    async fn teardown(&self) {
        self.queue.clear();
        let taken = self.voice.write().take();
        if let Some(voice) = taken {
            if let Err(e) = voice.disconnect().await {
                warn!("⚠️ Error al desconectar de guild {}: {:#}", self.guild_id, e);
            }
            info!("👋 Desconectado de guild {} por inactividad", self.guild_id);
        }
    }
}
