use std::time::Duration;

use serenity::all::Colour;
use serenity::builder::{CreateEmbed, CreateEmbedFooter};

use crate::player::queue::QueuePage;
use crate::track::Track;
use crate::usage::stats::StatsReport;
use crate::usage::TrackRequested;

/// Embed de "sonando ahora".
pub fn now_playing(track: &Track) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .title("🎵 Sonando ahora")
        .description(link_markdown(&track.title, &track.url))
        .colour(Colour::BLURPLE)
        .field("Pedida por", mention(track.requester_id.get()), true);

    if let Some(duration) = track.duration {
        embed = embed.field("Duración", fmt_duration(duration), true);
    }
    embed
}

/// Embed con una página de la cola.
pub fn queue_page(page: &QueuePage, looping: bool) -> CreateEmbed {
    let description = if page.entries.is_empty() {
        "La cola está vacía.".to_string()
    } else {
        page.entries
            .iter()
            .map(|entry| {
                let duration = entry
                    .duration
                    .map(|d| format!(" ({})", fmt_duration(d)))
                    .unwrap_or_default();
                format!(
                    "`{}.` {}{} — {}",
                    entry.position,
                    link_markdown(&entry.title, &entry.url),
                    duration,
                    mention(entry.requester_id.get()),
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let footer = format!(
        "Página {}/{} • {} canciones{}",
        page.page,
        page.total_pages,
        page.total_items,
        if looping { " • 🔁 loop activo" } else { "" },
    );

    CreateEmbed::new()
        .title("📋 Cola de reproducción")
        .description(description)
        .colour(Colour::DARK_GREEN)
        .footer(CreateEmbedFooter::new(footer))
}

/// Embed de estadísticas para el filtro consultado.
pub fn stats(report: &StatsReport, description: String) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .title("📊 Estadísticas")
        .description(description)
        .colour(Colour::GOLD)
        .field("Solicitudes", report.requests.to_string(), true)
        .field("Reproducciones", report.plays.to_string(), true)
        .field(
            "Tiempo total",
            fmt_duration(Duration::from_secs_f64(report.total_played_seconds.max(0.0))),
            true,
        )
        .field("Primera solicitud", fmt_request(report.first_request.as_ref()), false)
        .field(
            "Última solicitud",
            fmt_request(report.latest_request.as_ref()),
            false,
        );

    if let Some((track_id, count)) = &report.most_requested_track {
        embed = embed.field(
            "Track más pedido",
            format!("`{track_id}` con {count} solicitudes"),
            false,
        );
    }
    if let Some((requester_id, count)) = &report.most_frequent_requester {
        embed = embed.field(
            "Solicitante más frecuente",
            format!("{} con {count} solicitudes", mention(*requester_id)),
            false,
        );
    }

    if !report.requests_by_day.is_empty() {
        embed = embed.field("Uso por día", usage_by_day(report), false);
    }
    embed
}

/// Serie de uso diario como texto (las últimas diez fechas con solicitudes).
fn usage_by_day(report: &StatsReport) -> String {
    report
        .requests_by_day
        .iter()
        .rev()
        .take(10)
        .rev()
        .map(|(date, requests)| {
            let plays = report
                .plays_by_day
                .iter()
                .find(|(d, _)| d == date)
                .map(|(_, n)| *n)
                .unwrap_or(0);
            format!("`{date}` {requests} solicitudes, {plays} reproducciones")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn fmt_request(request: Option<&TrackRequested>) -> String {
    match request {
        Some(request) => format!(
            "`{}` por {} el {}",
            request.track_id,
            mention(request.requester_id),
            request.timestamp.format("%Y-%m-%d %H:%M UTC"),
        ),
        None => "N/A".to_string(),
    }
}

fn link_markdown(title: &str, url: &str) -> String {
    format!("[{title}]({url})")
}

fn mention(user_id: u64) -> String {
    format!("<@{user_id}>")
}

pub fn fmt_duration(duration: Duration) -> String {
    humantime::format_duration(Duration::from_secs(duration.as_secs())).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_are_formatted_without_millis() {
        assert_eq!(fmt_duration(Duration::from_secs_f64(125.7)), "2m 5s");
        assert_eq!(fmt_duration(Duration::from_secs(3600)), "1h");
        assert_eq!(fmt_duration(Duration::ZERO), "0s");
    }

    #[test]
    fn request_formatting_handles_missing_data() {
        assert_eq!(fmt_request(None), "N/A");
    }
}
