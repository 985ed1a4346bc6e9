use std::sync::Arc;

use chrono::NaiveDate;

use super::store::UsageStore;
use super::{EventKind, TrackRequested, UsageFilter};
use crate::track::Track;

/// Estadísticas nombradas para un filtro concreto.
///
/// `most_requested_track` se omite cuando el filtro ya fija un track, y
/// `most_frequent_requester` cuando ya fija un solicitante.
#[derive(Debug, Clone)]
pub struct StatsReport {
    pub requests: usize,
    pub plays: usize,
    pub total_played_seconds: f64,
    pub first_request: Option<TrackRequested>,
    pub latest_request: Option<TrackRequested>,
    pub most_requested_track: Option<(String, usize)>,
    pub most_frequent_requester: Option<(u64, usize)>,
    pub requests_by_day: Vec<(NaiveDate, usize)>,
    pub plays_by_day: Vec<(NaiveDate, usize)>,
}

/// Agregador de estadísticas: combina el almacén de uso con el estado en vivo
/// del coordinador de la guild.
pub struct StatsAggregator {
    store: Arc<UsageStore>,
}

impl StatsAggregator {
    pub fn new(store: Arc<UsageStore>) -> Self {
        Self { store }
    }

    /// Construye las estadísticas para el filtro dado.
    ///
    /// Si `live` trae el track actual del coordinador y casa con el filtro,
    /// su reproducción en curso cuenta: +1 en plays y su tiempo audible en el
    /// total. La fusión se calcula en fresco en cada llamada, nunca se
    /// cachea, así que no hay doble conteo cuando el TrackPlayed real se
    /// persista.
    pub async fn create_stats(&self, filter: &UsageFilter, live: Option<&Track>) -> StatsReport {
        let requests = self.store.count(EventKind::Requested, filter).await;
        let mut plays = self.store.count(EventKind::Played, filter).await;
        let mut total_played_seconds = self.store.total_play_duration(filter).await;

        if let Some(track) = live {
            if filter.matches_ids(track.guild_id.get(), track.requester_id.get(), &track.id) {
                plays += 1;
                total_played_seconds += track.total_played().as_secs_f64();
            }
        }

        let most_requested_track = if filter.track_id.is_none() {
            self.store.most_requested_track(filter).await
        } else {
            None
        };
        let most_frequent_requester = if filter.requester_id.is_none() {
            self.store.most_frequent_requester(filter).await
        } else {
            None
        };

        StatsReport {
            requests,
            plays,
            total_played_seconds,
            first_request: self.store.first_request(filter).await,
            latest_request: self.store.latest_request(filter).await,
            most_requested_track,
            most_frequent_requester,
            requests_by_day: self.store.counts_by_day(EventKind::Requested, filter).await,
            plays_by_day: self.store.counts_by_day(EventKind::Played, filter).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ResolvedTrack;
    use crate::track::PlayableSource;
    use crate::usage::{TrackPlayed, UsageEvent};
    use chrono::{TimeDelta, Utc};
    use serenity::model::id::{ChannelId, GuildId, UserId};
    use std::time::Duration;

    fn live_track(guild: u64, requester: u64, id: &str, played_secs: i64) -> Track {
        let mut track = Track::new(
            ResolvedTrack {
                id: id.to_string(),
                title: "En vivo".into(),
                url: format!("https://youtu.be/{id}"),
                duration: Some(Duration::from_secs(200)),
                source: PlayableSource::YtDlp {
                    page_url: format!("https://youtu.be/{id}"),
                },
            },
            GuildId::new(guild),
            UserId::new(requester),
            ChannelId::new(5),
        );
        let start = Utc::now() - TimeDelta::seconds(played_secs);
        track.first_played_at = Some(start);
        track.started.push(start);
        track.stopped.push(Utc::now());
        track
    }

    async fn store_with_play(dir: &tempfile::TempDir, track_id: &str, secs: f64) -> Arc<UsageStore> {
        let store = Arc::new(UsageStore::open(dir.path(), true, false).await.unwrap());
        store
            .record(UsageEvent::TrackPlayed(TrackPlayed {
                timestamp: Utc::now(),
                guild_id: 1,
                requester_id: 2,
                track_id: track_id.to_string(),
                duration_seconds: secs,
            }))
            .await;
        store
    }

    #[tokio::test]
    async fn live_track_counts_towards_totals() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_play(&dir, "x", 30.0).await;
        let aggregator = StatsAggregator::new(store);

        let track = live_track(1, 2, "x", 10);
        let filter = UsageFilter::guild(1).with_track("x");
        let report = aggregator.create_stats(&filter, Some(&track)).await;

        assert_eq!(report.plays, 2);
        assert!(
            (report.total_played_seconds - 40.0).abs() < 1.0,
            "total inesperado: {}",
            report.total_played_seconds
        );
    }

    #[tokio::test]
    async fn merge_does_not_double_count_after_persist() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_play(&dir, "x", 30.0).await;
        let aggregator = StatsAggregator::new(store.clone());
        let filter = UsageFilter::guild(1).with_track("x");

        // el track en vivo termina y su evento se persiste
        let track = live_track(1, 2, "x", 10);
        store.record(UsageEvent::TrackPlayed(track.play_event())).await;

        // sin track en vivo, el total sigue siendo el acumulado correcto
        let report = aggregator.create_stats(&filter, None).await;
        assert_eq!(report.plays, 2);
        assert!(
            (report.total_played_seconds - 40.0).abs() < 1.0,
            "total inesperado: {}",
            report.total_played_seconds
        );
    }

    #[tokio::test]
    async fn live_track_outside_filter_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_play(&dir, "x", 30.0).await;
        let aggregator = StatsAggregator::new(store);

        // otra guild
        let other_guild = live_track(9, 2, "x", 10);
        let filter = UsageFilter::guild(1);
        let report = aggregator.create_stats(&filter, Some(&other_guild)).await;
        assert_eq!(report.plays, 1);

        // otro solicitante con filtro de solicitante
        let other_user = live_track(1, 99, "x", 10);
        let filter = UsageFilter::guild(1).with_requester(2);
        let report = aggregator.create_stats(&filter, Some(&other_user)).await;
        assert_eq!(report.plays, 1);
    }

    #[tokio::test]
    async fn most_common_fields_follow_the_filter_shape() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(UsageStore::open(dir.path(), true, false).await.unwrap());
        store
            .record(UsageEvent::TrackRequested(crate::usage::TrackRequested {
                timestamp: Utc::now(),
                guild_id: 1,
                requester_id: 2,
                track_id: "x".into(),
            }))
            .await;
        let aggregator = StatsAggregator::new(store);

        let report = aggregator.create_stats(&UsageFilter::guild(1), None).await;
        assert!(report.most_requested_track.is_some());
        assert!(report.most_frequent_requester.is_some());

        let report = aggregator
            .create_stats(&UsageFilter::guild(1).with_track("x").with_requester(2), None)
            .await;
        assert!(report.most_requested_track.is_none());
        assert!(report.most_frequent_requester.is_none());
    }
}
