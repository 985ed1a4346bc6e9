use std::collections::HashMap;
use std::hash::Hash;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::{EventKind, TrackPlayed, TrackRequested, UsageEvent, UsageFilter};

const EVENTS_FILE: &str = "usage_events.jsonl";

/// Almacén append-only de eventos de uso.
///
/// Persistencia en JSON Lines sobre el directorio de datos, con un índice en
/// memoria para las consultas. Los eventos son inserciones independientes por
/// guild; las consultas son agregados de solo lectura, así que lectores y
/// escritores de distintas guilds no se estorban.
pub struct UsageStore {
    enabled: bool,
    path: PathBuf,
    events: RwLock<Vec<UsageEvent>>,
}

impl UsageStore {
    /// Abre el almacén bajo `data_dir`, cargando los eventos existentes.
    /// Con `reset`, el log previo se elimina antes de cargar.
    pub async fn open(data_dir: &Path, enabled: bool, reset: bool) -> Result<Self> {
        fs::create_dir_all(data_dir)
            .await
            .with_context(|| format!("creando directorio de datos {}", data_dir.display()))?;
        let path = data_dir.join(EVENTS_FILE);

        if reset && fs::try_exists(&path).await.unwrap_or(false) {
            fs::remove_file(&path)
                .await
                .with_context(|| format!("reiniciando log de uso {}", path.display()))?;
            info!("🗑️ Log de uso reiniciado");
        }

        let mut events = Vec::new();
        if enabled {
            if let Ok(content) = fs::read_to_string(&path).await {
                let mut malformed = 0usize;
                for line in content.lines().filter(|l| !l.trim().is_empty()) {
                    match serde_json::from_str::<UsageEvent>(line) {
                        Ok(event) => events.push(event),
                        Err(_) => malformed += 1,
                    }
                }
                if malformed > 0 {
                    warn!("⚠️ {} líneas ilegibles ignoradas en el log de uso", malformed);
                }
            }
            info!("📂 Log de uso cargado: {} eventos", events.len());
        }

        Ok(Self {
            enabled,
            path,
            events: RwLock::new(events),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Registra un evento de forma duradera. Los fallos de escritura se
    /// reportan aquí mismo con contexto; nunca llegan al camino de
    /// reproducción.
    pub async fn record(&self, event: UsageEvent) {
        if !self.enabled {
            return;
        }

        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                error!(
                    "💾 No se pudo serializar evento de uso (guild {}, track {}): {}",
                    event.guild_id(),
                    event.track_id(),
                    e
                );
                return;
            }
        };

        self.events.write().await.push(event.clone());

        if let Err(e) = self.append_line(&line).await {
            error!(
                "💾 No se pudo persistir evento de uso (guild {}, track {}): {:#}",
                event.guild_id(),
                event.track_id(),
                e
            );
        }
    }

    async fn append_line(&self, line: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        Ok(())
    }

    pub async fn count(&self, kind: EventKind, filter: &UsageFilter) -> usize {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.kind() == kind && filter.matches(e))
            .count()
    }

    /// Suma de `duration_seconds` sobre los TrackPlayed que casan con el filtro.
    pub async fn total_play_duration(&self, filter: &UsageFilter) -> f64 {
        self.events
            .read()
            .await
            .iter()
            .filter_map(|e| match e {
                UsageEvent::TrackPlayed(p) if filter.matches(e) => Some(p.duration_seconds),
                _ => None,
            })
            .sum()
    }

    /// Eventos de solicitud que casan con el filtro, en orden de inserción.
    #[allow(dead_code)]
    pub async fn requested_events(&self, filter: &UsageFilter) -> Vec<TrackRequested> {
        self.events
            .read()
            .await
            .iter()
            .filter_map(|e| match e {
                UsageEvent::TrackRequested(r) if filter.matches(e) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    /// Eventos de reproducción que casan con el filtro, en orden de inserción.
    #[allow(dead_code)]
    pub async fn played_events(&self, filter: &UsageFilter) -> Vec<TrackPlayed> {
        self.events
            .read()
            .await
            .iter()
            .filter_map(|e| match e {
                UsageEvent::TrackPlayed(p) if filter.matches(e) => Some(p.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn first_request(&self, filter: &UsageFilter) -> Option<TrackRequested> {
        self.request_by_timestamp(filter, |a, b| a.timestamp < b.timestamp)
            .await
    }

    pub async fn latest_request(&self, filter: &UsageFilter) -> Option<TrackRequested> {
        self.request_by_timestamp(filter, |a, b| a.timestamp > b.timestamp)
            .await
    }

    async fn request_by_timestamp(
        &self,
        filter: &UsageFilter,
        better: impl Fn(&TrackRequested, &TrackRequested) -> bool,
    ) -> Option<TrackRequested> {
        let events = self.events.read().await;
        let mut best: Option<&TrackRequested> = None;
        for event in events.iter() {
            if let UsageEvent::TrackRequested(request) = event {
                if filter.matches(event) && best.map_or(true, |b| better(request, b)) {
                    best = Some(request);
                }
            }
        }
        best.cloned()
    }

    /// Track más solicitado. Empates: gana la primera aparición en el log.
    pub async fn most_requested_track(&self, filter: &UsageFilter) -> Option<(String, usize)> {
        self.most_common(filter, |request| request.track_id.clone())
            .await
    }

    /// Solicitante más frecuente. Empates: gana la primera aparición en el log.
    pub async fn most_frequent_requester(&self, filter: &UsageFilter) -> Option<(u64, usize)> {
        self.most_common(filter, |request| request.requester_id).await
    }

    async fn most_common<K: Eq + Hash + Clone>(
        &self,
        filter: &UsageFilter,
        key: impl Fn(&TrackRequested) -> K,
    ) -> Option<(K, usize)> {
        let events = self.events.read().await;
        // (conteo, índice de primera aparición) por clave
        let mut counts: HashMap<K, (usize, usize)> = HashMap::new();
        let mut order = 0usize;
        for event in events.iter() {
            if let UsageEvent::TrackRequested(request) = event {
                if filter.matches(event) {
                    let entry = counts.entry(key(request)).or_insert((0, order));
                    entry.0 += 1;
                    order += 1;
                }
            }
        }
        counts
            .into_iter()
            .min_by(|(_, (ca, fa)), (_, (cb, fb))| cb.cmp(ca).then(fa.cmp(fb)))
            .map(|(k, (count, _))| (k, count))
    }

    /// Conteos por día natural (UTC), ordenados por fecha ascendente.
    pub async fn counts_by_day(
        &self,
        kind: EventKind,
        filter: &UsageFilter,
    ) -> Vec<(NaiveDate, usize)> {
        let events = self.events.read().await;
        let mut counts: HashMap<NaiveDate, usize> = HashMap::new();
        for event in events.iter() {
            if event.kind() == kind && filter.matches(event) {
                *counts.entry(event.timestamp().date_naive()).or_default() += 1;
            }
        }
        let mut by_day: Vec<_> = counts.into_iter().collect();
        by_day.sort_by_key(|(date, _)| *date);
        by_day
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::TrackPlayed;
    use chrono::{TimeDelta, Utc};
    use pretty_assertions::assert_eq;

    fn request(guild: u64, requester: u64, track: &str, offset_secs: i64) -> UsageEvent {
        UsageEvent::TrackRequested(TrackRequested {
            timestamp: Utc::now() + TimeDelta::seconds(offset_secs),
            guild_id: guild,
            requester_id: requester,
            track_id: track.to_string(),
        })
    }

    fn play(guild: u64, requester: u64, track: &str, duration: f64) -> UsageEvent {
        UsageEvent::TrackPlayed(TrackPlayed {
            timestamp: Utc::now(),
            guild_id: guild,
            requester_id: requester,
            track_id: track.to_string(),
            duration_seconds: duration,
        })
    }

    async fn store_in(dir: &tempfile::TempDir) -> UsageStore {
        UsageStore::open(dir.path(), true, false).await.unwrap()
    }

    #[tokio::test]
    async fn events_survive_a_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = store_in(&dir).await;
            store.record(request(1, 2, "a", 0)).await;
            store.record(play(1, 2, "a", 30.0)).await;
        }

        let store = store_in(&dir).await;
        let filter = UsageFilter::guild(1);
        assert_eq!(store.count(EventKind::Requested, &filter).await, 1);
        assert_eq!(store.count(EventKind::Played, &filter).await, 1);
        assert_eq!(store.total_play_duration(&filter).await, 30.0);
    }

    #[tokio::test]
    async fn reset_discards_previous_log() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = store_in(&dir).await;
            store.record(request(1, 2, "a", 0)).await;
        }

        let store = UsageStore::open(dir.path(), true, true).await.unwrap();
        assert_eq!(store.count(EventKind::Requested, &UsageFilter::guild(1)).await, 0);
    }

    #[tokio::test]
    async fn disabled_store_records_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = UsageStore::open(dir.path(), false, false).await.unwrap();
        store.record(request(1, 2, "a", 0)).await;

        assert_eq!(store.count(EventKind::Requested, &UsageFilter::guild(1)).await, 0);
        assert!(!fs::try_exists(dir.path().join(EVENTS_FILE)).await.unwrap());
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = store_in(&dir).await;
            store.record(request(1, 2, "a", 0)).await;
        }
        let path = dir.path().join(EVENTS_FILE);
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("esto no es json\n");
        std::fs::write(&path, content).unwrap();

        let store = store_in(&dir).await;
        assert_eq!(store.count(EventKind::Requested, &UsageFilter::guild(1)).await, 1);
    }

    #[tokio::test]
    async fn queries_respect_the_filter() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        store.record(request(1, 10, "a", 0)).await;
        store.record(request(1, 11, "b", 1)).await;
        store.record(request(2, 10, "a", 2)).await;
        store.record(play(1, 10, "a", 30.0)).await;
        store.record(play(1, 11, "b", 45.0)).await;

        let by_requester = UsageFilter::guild(1).with_requester(10);
        assert_eq!(store.count(EventKind::Requested, &by_requester).await, 1);
        assert_eq!(store.total_play_duration(&by_requester).await, 30.0);

        let by_track = UsageFilter::guild(1).with_track("b");
        assert_eq!(store.count(EventKind::Played, &by_track).await, 1);
        assert_eq!(store.total_play_duration(&by_track).await, 45.0);
    }

    #[tokio::test]
    async fn first_and_latest_request_by_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        store.record(request(1, 10, "a", -100)).await;
        store.record(request(1, 11, "b", 50)).await;
        store.record(request(1, 12, "c", -50)).await;

        let filter = UsageFilter::guild(1);
        assert_eq!(store.first_request(&filter).await.unwrap().track_id, "a");
        assert_eq!(store.latest_request(&filter).await.unwrap().track_id, "b");
        assert!(store.first_request(&UsageFilter::guild(9)).await.is_none());
    }

    #[tokio::test]
    async fn most_common_breaks_ties_by_first_occurrence() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        // 20 y 10 empatan a dos solicitudes; 20 apareció primero
        store.record(request(1, 20, "a", 0)).await;
        store.record(request(1, 10, "b", 1)).await;
        store.record(request(1, 10, "c", 2)).await;
        store.record(request(1, 20, "d", 3)).await;

        let filter = UsageFilter::guild(1);
        assert_eq!(store.most_frequent_requester(&filter).await, Some((20, 2)));

        // mismo criterio para tracks
        store.record(request(1, 30, "x", 4)).await;
        store.record(request(1, 30, "y", 5)).await;
        store.record(request(1, 30, "x", 6)).await;
        assert_eq!(store.most_requested_track(&filter).await, Some(("x".into(), 2)));
    }

    #[tokio::test]
    async fn most_common_on_empty_store_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        assert_eq!(store.most_requested_track(&UsageFilter::guild(1)).await, None);
    }

    #[tokio::test]
    async fn counts_by_day_groups_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        let day = 24 * 3600;
        store.record(request(1, 10, "a", -2 * day)).await;
        store.record(request(1, 10, "b", -2 * day)).await;
        store.record(request(1, 10, "c", 0)).await;

        let counts = store
            .counts_by_day(EventKind::Requested, &UsageFilter::guild(1))
            .await;
        assert_eq!(counts.len(), 2);
        assert!(counts[0].0 < counts[1].0);
        assert_eq!(counts[0].1, 2);
        assert_eq!(counts[1].1, 1);
    }
}
