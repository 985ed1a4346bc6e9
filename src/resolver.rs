use std::time::Duration;

use anyhow::{Context, Result};
use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::{debug, info};
use url::Url;

use crate::track::PlayableSource;

/// Resultado de la capa de resolución: un item reproducible con su metadata.
#[derive(Debug, Clone)]
pub struct ResolvedTrack {
    pub id: String,
    pub title: String,
    pub url: String,
    pub duration: Option<Duration>,
    pub source: PlayableSource,
}

/// Resuelve una consulta o URL en cero o más tracks reproducibles.
///
/// El coordinador nunca reintenta ni re-resuelve: si esto falla, el error se
/// devuelve al handler del comando y ahí se queda.
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> Result<Vec<ResolvedTrack>>;
}

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    id: String,
    title: String,
    webpage_url: Option<String>,
    url: Option<String>,
    duration: Option<f64>,
}

/// Resolver sobre yt-dlp: URLs de YouTube directas, playlists y búsquedas.
pub struct YtdlResolver {
    // limitar procesos concurrentes para no provocar rate limiting
    limiter: Semaphore,
}

impl YtdlResolver {
    pub fn new() -> Self {
        Self {
            limiter: Semaphore::new(3),
        }
    }

    pub fn is_youtube_url(url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        matches!(
            parsed.host_str(),
            Some("www.youtube.com")
                | Some("youtube.com")
                | Some("m.youtube.com")
                | Some("music.youtube.com")
                | Some("youtu.be")
        )
    }

    fn query_argument(query: &str) -> String {
        if Url::parse(query).is_ok() {
            query.to_string()
        } else {
            // búsqueda: nos quedamos con el primer resultado
            format!("ytsearch1:{query}")
        }
    }

    fn entry_to_track(entry: YtDlpEntry) -> ResolvedTrack {
        let page_url = entry
            .webpage_url
            .or(entry.url)
            .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", entry.id));
        ResolvedTrack {
            id: entry.id,
            title: entry.title,
            url: page_url.clone(),
            duration: entry.duration.map(Duration::from_secs_f64),
            source: PlayableSource::YtDlp { page_url },
        }
    }

    fn direct_track(parsed: &Url) -> ResolvedTrack {
        let title = parsed
            .path_segments()
            .and_then(|segments| segments.last())
            .filter(|name| !name.is_empty())
            .unwrap_or("stream")
            .to_string();
        let stream_url = parsed.to_string();
        ResolvedTrack {
            id: stream_url.clone(),
            title,
            url: stream_url.clone(),
            duration: None,
            source: PlayableSource::Direct { stream_url },
        }
    }

    /// Comprueba que yt-dlp está instalado y responde.
    pub async fn verify_available() -> Result<()> {
        let output = Command::new("yt-dlp")
            .arg("--version")
            .output()
            .await
            .context("ejecutando yt-dlp")?;
        if !output.status.success() {
            anyhow::bail!("yt-dlp no puede ejecutarse");
        }
        debug!(
            "yt-dlp versión {}",
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(())
    }
}

#[async_trait]
impl TrackResolver for YtdlResolver {
    async fn resolve(&self, query: &str) -> Result<Vec<ResolvedTrack>> {
        // URL que no es de YouTube: tratarla como stream directo, sin extracción
        if let Ok(parsed) = Url::parse(query) {
            if !Self::is_youtube_url(query) && matches!(parsed.scheme(), "http" | "https") {
                info!("🎯 URL directa de audio: {}", query);
                return Ok(vec![Self::direct_track(&parsed)]);
            }
        }

        let _permit = self.limiter.acquire().await?;

        info!("🔍 Resolviendo: {}", query);
        let argument = Self::query_argument(query);

        let output = Command::new("yt-dlp")
            .args([
                "--dump-json",
                "--skip-download",
                "--no-warnings",
                "--ignore-errors",
                argument.as_str(),
            ])
            .output()
            .await
            .context("ejecutando yt-dlp")?;

        if !output.status.success() && output.stdout.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp falló para '{}': {}", query, stderr.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let tracks: Vec<ResolvedTrack> = stdout
            .lines()
            .filter_map(|line| serde_json::from_str::<YtDlpEntry>(line).ok())
            .map(Self::entry_to_track)
            .collect();

        info!("✅ {} tracks resueltos para '{}'", tracks.len(), query);
        Ok(tracks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn youtube_url_detection() {
        assert!(YtdlResolver::is_youtube_url(
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        ));
        assert!(YtdlResolver::is_youtube_url("https://youtu.be/dQw4w9WgXcQ"));
        assert!(YtdlResolver::is_youtube_url(
            "https://music.youtube.com/watch?v=test"
        ));
        assert!(!YtdlResolver::is_youtube_url("https://example.com/video"));
        assert!(!YtdlResolver::is_youtube_url("no es una url"));
    }

    #[test]
    fn plain_text_becomes_a_search() {
        assert_eq!(
            YtdlResolver::query_argument("daft punk around the world"),
            "ytsearch1:daft punk around the world"
        );
        assert_eq!(
            YtdlResolver::query_argument("https://youtu.be/abc"),
            "https://youtu.be/abc"
        );
    }

    #[test]
    fn non_youtube_url_is_a_direct_stream() {
        let parsed = Url::parse("https://radio.example.com/streams/lofi.mp3").unwrap();
        let track = YtdlResolver::direct_track(&parsed);
        assert_eq!(track.title, "lofi.mp3");
        match track.source {
            PlayableSource::Direct { stream_url } => {
                assert_eq!(stream_url, "https://radio.example.com/streams/lofi.mp3");
            }
            _ => panic!("fuente inesperada"),
        }
    }

    #[test]
    fn entry_without_webpage_url_builds_one_from_id() {
        let entry = YtDlpEntry {
            id: "abc123".into(),
            title: "Algo".into(),
            webpage_url: None,
            url: None,
            duration: Some(212.0),
        };
        let track = YtdlResolver::entry_to_track(entry);
        assert_eq!(track.url, "https://www.youtube.com/watch?v=abc123");
        assert_eq!(track.duration, Some(Duration::from_secs(212)));
        match track.source {
            PlayableSource::YtDlp { page_url } => assert_eq!(page_url, track.url),
            _ => panic!("fuente inesperada"),
        }
    }
}
