use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use serenity::model::id::UserId;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::debug;

use crate::track::Track;

/// La cola alcanzó su capacidad máxima.
#[derive(Debug, Error, PartialEq)]
#[error("la cola está llena (máximo {max} canciones)")]
pub struct QueueFull {
    pub max: usize,
}

/// Cola de tracks de una guild.
///
/// Una sola secuencia ordenada con dos inserciones (`push_back` para el final,
/// frente para "play next"), bandera de loop y extracción bloqueante para el
/// bucle del coordinador.
pub struct TrackQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    max_size: usize,
}

struct Inner {
    items: VecDeque<Track>,
    looping: bool,
}

impl TrackQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                looping: false,
            }),
            notify: Notify::new(),
            max_size,
        }
    }

    /// Encola un track al final, o al frente con `play_next`.
    pub fn push(&self, track: Track, play_next: bool) -> Result<(), QueueFull> {
        {
            let mut inner = self.inner.lock();
            if inner.items.len() >= self.max_size {
                return Err(QueueFull { max: self.max_size });
            }
            debug!("➕ Encolado {} (play_next: {})", track.title, play_next);
            if play_next {
                inner.items.push_front(track);
            } else {
                inner.items.push_back(track);
            }
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Espera hasta poder extraer el siguiente track de la cabeza.
    pub async fn next(&self) -> Track {
        loop {
            let notified = self.notify.notified();
            if let Some(track) = self.inner.lock().items.pop_front() {
                return track;
            }
            notified.await;
        }
    }

    /// Quita y devuelve el track en la posición mostrada (base 1).
    pub fn remove_at(&self, position: usize) -> Option<Track> {
        let mut inner = self.inner.lock();
        if position == 0 || position > inner.items.len() {
            return None;
        }
        inner.items.remove(position - 1)
    }

    /// Quita y devuelve el primer track cuyo id esté en `ids`.
    pub fn remove_matching(&self, ids: &HashSet<String>) -> Option<Track> {
        let mut inner = self.inner.lock();
        let index = inner.items.iter().position(|t| ids.contains(&t.id))?;
        inner.items.remove(index)
    }

    pub fn shuffle(&self) {
        let mut inner = self.inner.lock();
        inner
            .items
            .make_contiguous()
            .shuffle(&mut rand::thread_rng());
    }

    pub fn clear(&self) {
        self.inner.lock().items.clear();
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    #[allow(dead_code)]
    pub fn set_loop(&self, enabled: bool) {
        self.inner.lock().looping = enabled;
    }

    pub fn toggle_loop(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.looping = !inner.looping;
        inner.looping
    }

    pub fn is_loop(&self) -> bool {
        self.inner.lock().looping
    }

    /// Copia de solo lectura de una página de la cola, para mostrar.
    pub fn snapshot(&self, page: usize, page_size: usize) -> QueuePage {
        let inner = self.inner.lock();
        let total_items = inner.items.len();
        let page_size = page_size.max(1);
        let total_pages = total_items.div_ceil(page_size).max(1);
        let page = page.clamp(1, total_pages);
        let start = (page - 1) * page_size;

        let entries = inner
            .items
            .iter()
            .enumerate()
            .skip(start)
            .take(page_size)
            .map(|(i, track)| QueueEntry {
                position: i + 1,
                title: track.title.clone(),
                url: track.url.clone(),
                requester_id: track.requester_id,
                duration: track.duration,
            })
            .collect();

        QueuePage {
            entries,
            page,
            total_pages,
            total_items,
        }
    }
}

/// Entrada de una página de la cola, copiada para mostrar sin sostener el lock.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub position: usize,
    pub title: String,
    pub url: String,
    pub requester_id: UserId,
    pub duration: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct QueuePage {
    pub entries: Vec<QueueEntry>,
    pub page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ResolvedTrack;
    use crate::track::PlayableSource;
    use pretty_assertions::assert_eq;
    use serenity::model::id::{ChannelId, GuildId};

    fn track(id: &str) -> Track {
        Track::new(
            ResolvedTrack {
                id: id.to_string(),
                title: format!("Track {id}"),
                url: format!("https://youtu.be/{id}"),
                duration: Some(Duration::from_secs(120)),
                source: PlayableSource::YtDlp {
                    page_url: format!("https://youtu.be/{id}"),
                },
            },
            GuildId::new(7),
            UserId::new(42),
            ChannelId::new(99),
        )
    }

    fn ids(queue: &TrackQueue) -> Vec<String> {
        queue
            .snapshot(1, 100)
            .entries
            .iter()
            .map(|e| e.title.trim_start_matches("Track ").to_string())
            .collect()
    }

    #[test]
    fn push_back_keeps_fifo_order() {
        let queue = TrackQueue::new(10);
        queue.push(track("a"), false).unwrap();
        queue.push(track("b"), false).unwrap();
        queue.push(track("c"), false).unwrap();
        assert_eq!(ids(&queue), vec!["a", "b", "c"]);
    }

    #[test]
    fn play_next_inserts_at_head() {
        let queue = TrackQueue::new(10);
        queue.push(track("a"), false).unwrap();
        queue.push(track("b"), false).unwrap();
        queue.push(track("c"), true).unwrap();
        assert_eq!(ids(&queue), vec!["c", "a", "b"]);
    }

    #[test]
    fn push_fails_when_full() {
        let queue = TrackQueue::new(2);
        queue.push(track("a"), false).unwrap();
        queue.push(track("b"), false).unwrap();
        let err = queue.push(track("c"), false).unwrap_err();
        assert_eq!(err, QueueFull { max: 2 });
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn remove_at_uses_display_positions() {
        let queue = TrackQueue::new(10);
        queue.push(track("a"), false).unwrap();
        queue.push(track("b"), false).unwrap();
        queue.push(track("c"), false).unwrap();

        let removed = queue.remove_at(2).expect("debería quitar la posición 2");
        assert_eq!(removed.id, "b");
        assert_eq!(ids(&queue), vec!["a", "c"]);

        assert!(queue.remove_at(0).is_none());
        assert!(queue.remove_at(3).is_none());
        assert_eq!(ids(&queue), vec!["a", "c"]);
    }

    #[test]
    fn remove_matching_takes_first_match() {
        let queue = TrackQueue::new(10);
        queue.push(track("a"), false).unwrap();
        queue.push(track("b"), false).unwrap();
        queue.push(track("c"), false).unwrap();

        let wanted: HashSet<String> = ["b".to_string(), "c".to_string()].into();
        let removed = queue.remove_matching(&wanted).unwrap();
        assert_eq!(removed.id, "b");
        assert_eq!(queue.len(), 2);

        let missing: HashSet<String> = ["zzz".to_string()].into();
        assert!(queue.remove_matching(&missing).is_none());
    }

    #[test]
    fn shuffle_preserves_contents() {
        let queue = TrackQueue::new(100);
        for i in 0..20 {
            queue.push(track(&format!("t{i}")), false).unwrap();
        }
        queue.shuffle();

        let mut after = ids(&queue);
        after.sort();
        let mut expected: Vec<String> = (0..20).map(|i| format!("t{i}")).collect();
        expected.sort();
        assert_eq!(after, expected);
    }

    #[test]
    fn snapshot_pages_are_bounded() {
        let queue = TrackQueue::new(100);
        for i in 0..25 {
            queue.push(track(&format!("t{i}")), false).unwrap();
        }

        let page = queue.snapshot(1, 10);
        assert_eq!(page.entries.len(), 10);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.total_items, 25);
        assert_eq!(page.entries[0].position, 1);

        let last = queue.snapshot(3, 10);
        assert_eq!(last.entries.len(), 5);
        assert_eq!(last.entries[0].position, 21);

        // fuera de rango: se ajusta a la última página
        let clamped = queue.snapshot(99, 10);
        assert_eq!(clamped.page, 3);

        let empty = TrackQueue::new(10).snapshot(1, 10);
        assert_eq!(empty.total_pages, 1);
        assert!(empty.entries.is_empty());
    }

    #[tokio::test]
    async fn next_waits_for_a_push() {
        let queue = std::sync::Arc::new(TrackQueue::new(10));
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.next().await.id })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        queue.push(track("a"), false).unwrap();

        let got = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("next() no despertó")
            .unwrap();
        assert_eq!(got, "a");
    }

    #[tokio::test]
    async fn next_returns_immediately_when_ready() {
        let queue = TrackQueue::new(10);
        queue.push(track("a"), false).unwrap();
        queue.push(track("b"), false).unwrap();

        assert_eq!(queue.next().await.id, "a");
        assert_eq!(queue.next().await.id, "b");
    }

    #[test]
    fn loop_flag_toggles() {
        let queue = TrackQueue::new(10);
        assert!(!queue.is_loop());
        assert!(queue.toggle_loop());
        assert!(queue.is_loop());
        queue.set_loop(false);
        assert!(!queue.is_loop());
    }
}
