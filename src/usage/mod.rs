//! Registro de uso: eventos append-only de solicitud y reproducción,
//! el almacén que los persiste y el agregador de estadísticas.

pub mod stats;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Un track fue solicitado (encolado) por un usuario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRequested {
    pub timestamp: DateTime<Utc>,
    pub guild_id: u64,
    pub requester_id: u64,
    pub track_id: String,
}

/// Un track terminó de reproducirse (fin natural, skip o stop explícito).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPlayed {
    pub timestamp: DateTime<Utc>,
    pub guild_id: u64,
    pub requester_id: u64,
    pub track_id: String,
    pub duration_seconds: f64,
}

/// Evento de uso persistido. Nunca se actualiza ni se borra tras insertarse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UsageEvent {
    TrackRequested(TrackRequested),
    TrackPlayed(TrackPlayed),
}

impl UsageEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            UsageEvent::TrackRequested(_) => EventKind::Requested,
            UsageEvent::TrackPlayed(_) => EventKind::Played,
        }
    }

    pub fn guild_id(&self) -> u64 {
        match self {
            UsageEvent::TrackRequested(e) => e.guild_id,
            UsageEvent::TrackPlayed(e) => e.guild_id,
        }
    }

    pub fn track_id(&self) -> &str {
        match self {
            UsageEvent::TrackRequested(e) => &e.track_id,
            UsageEvent::TrackPlayed(e) => &e.track_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            UsageEvent::TrackRequested(e) => e.timestamp,
            UsageEvent::TrackPlayed(e) => e.timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Requested,
    Played,
}

/// Filtro de consultas: conjunción sobre guild (siempre), solicitante y track.
#[derive(Debug, Clone, Default)]
pub struct UsageFilter {
    pub guild_id: u64,
    pub requester_id: Option<u64>,
    pub track_id: Option<String>,
}

impl UsageFilter {
    pub fn guild(guild_id: u64) -> Self {
        Self {
            guild_id,
            requester_id: None,
            track_id: None,
        }
    }

    pub fn with_requester(mut self, requester_id: u64) -> Self {
        self.requester_id = Some(requester_id);
        self
    }

    pub fn with_track(mut self, track_id: impl Into<String>) -> Self {
        self.track_id = Some(track_id.into());
        self
    }

    pub fn matches_ids(&self, guild_id: u64, requester_id: u64, track_id: &str) -> bool {
        self.guild_id == guild_id
            && self.requester_id.map_or(true, |r| r == requester_id)
            && self.track_id.as_deref().map_or(true, |t| t == track_id)
    }

    pub fn matches(&self, event: &UsageEvent) -> bool {
        match event {
            UsageEvent::TrackRequested(e) => {
                self.matches_ids(e.guild_id, e.requester_id, &e.track_id)
            }
            UsageEvent::TrackPlayed(e) => self.matches_ids(e.guild_id, e.requester_id, &e.track_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_is_a_conjunction() {
        let filter = UsageFilter::guild(1).with_requester(2).with_track("x");

        assert!(filter.matches_ids(1, 2, "x"));
        assert!(!filter.matches_ids(9, 2, "x"));
        assert!(!filter.matches_ids(1, 9, "x"));
        assert!(!filter.matches_ids(1, 2, "y"));
    }

    #[test]
    fn guild_only_filter_matches_any_requester_and_track() {
        let filter = UsageFilter::guild(1);
        assert!(filter.matches_ids(1, 5, "a"));
        assert!(filter.matches_ids(1, 6, "b"));
        assert!(!filter.matches_ids(2, 5, "a"));
    }

    #[test]
    fn event_roundtrips_through_json() {
        let event = UsageEvent::TrackPlayed(TrackPlayed {
            timestamp: Utc::now(),
            guild_id: 1,
            requester_id: 2,
            track_id: "abc".into(),
            duration_seconds: 12.5,
        });

        let line = serde_json::to_string(&event).unwrap();
        let parsed: UsageEvent = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, event);
    }
}
