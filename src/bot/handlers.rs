use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use serenity::{
    builder::{
        CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse,
    },
    model::application::CommandInteraction,
    model::id::{ChannelId, GuildId, UserId},
    prelude::Context,
};
use tracing::info;

use crate::bot::TempoBot;
use crate::player::PlaybackCoordinator;
use crate::track::Track;
use crate::ui::embeds;
use crate::usage::UsageFilter;

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &TempoBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id).await?,
        "join" => handle_join(ctx, &command, bot, guild_id).await?,
        "leave" => handle_leave(ctx, &command, bot, guild_id).await?,
        "pause" => handle_pause(ctx, &command, bot, guild_id).await?,
        "resume" => handle_resume(ctx, &command, bot, guild_id).await?,
        "skip" => handle_skip(ctx, &command, bot, guild_id).await?,
        "stop" => handle_stop(ctx, &command, bot, guild_id).await?,
        "queue" => handle_queue(ctx, &command, bot, guild_id).await?,
        "nowplaying" => handle_nowplaying(ctx, &command, bot, guild_id).await?,
        "shuffle" => handle_shuffle(ctx, &command, bot, guild_id).await?,
        "loop" => handle_loop(ctx, &command, bot, guild_id).await?,
        "remove" => handle_remove(ctx, &command, bot, guild_id).await?,
        "clear" => handle_clear(ctx, &command, bot, guild_id).await?,
        "stats" => handle_stats(ctx, &command, bot, guild_id).await?,
        _ => respond(ctx, &command, "❌ Comando no reconocido").await?,
    }

    Ok(())
}

// Extracción de opciones

fn option_str(command: &CommandInteraction, name: &str) -> Option<String> {
    command
        .data
        .options
        .iter()
        .find(|o| o.name == name)
        .and_then(|o| o.value.as_str().map(str::to_string))
}

fn option_int(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|o| o.name == name)
        .and_then(|o| o.value.as_i64())
}

fn option_bool(command: &CommandInteraction, name: &str) -> Option<bool> {
    command
        .data
        .options
        .iter()
        .find(|o| o.name == name)
        .and_then(|o| o.value.as_bool())
}

fn option_user(command: &CommandInteraction, name: &str) -> Option<UserId> {
    command
        .data
        .options
        .iter()
        .find(|o| o.name == name)
        .and_then(|o| o.value.as_user_id())
}

// Respuestas

async fn respond(ctx: &Context, command: &CommandInteraction, content: &str) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().content(content),
            ),
        )
        .await?;
    Ok(())
}

async fn respond_embed(
    ctx: &Context,
    command: &CommandInteraction,
    embed: serenity::builder::CreateEmbed,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().embed(embed),
            ),
        )
        .await?;
    Ok(())
}

async fn edit_deferred(ctx: &Context, command: &CommandInteraction, content: &str) -> Result<()> {
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(content))
        .await?;
    Ok(())
}

/// Canal de voz donde está el usuario que invocó el comando.
fn user_voice_channel(
    ctx: &Context,
    guild_id: GuildId,
    user_id: UserId,
) -> Option<ChannelId> {
    let guild = ctx.cache.guild(guild_id)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|vs| vs.channel_id)
}

/// Coordinador con sesión de voz viva para la guild, si existe.
fn live_coordinator(bot: &TempoBot, guild_id: GuildId) -> Option<Arc<PlaybackCoordinator>> {
    bot.registry.get(guild_id).filter(|c| c.is_connected())
}

// Comandos

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &TempoBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(query) = option_str(command, "query") else {
        return respond(ctx, command, "❌ Falta el término de búsqueda").await;
    };
    let play_next = option_bool(command, "next").unwrap_or(false);

    let Some(user_channel) = user_voice_channel(ctx, guild_id, command.user.id) else {
        return respond(ctx, command, "🎧 Entra a un canal de voz primero").await;
    };

    // resolver puede tardar: diferir la respuesta
    command.defer(&ctx.http).await?;

    let coordinator = match live_coordinator(bot, guild_id) {
        Some(coordinator) => coordinator,
        None => bot.join_voice(ctx, guild_id, user_channel).await?,
    };

    let resolved = match bot.resolver.resolve(&query).await {
        Ok(tracks) if !tracks.is_empty() => tracks,
        Ok(_) => {
            return edit_deferred(ctx, command, "🔍 No se encontró nada para esa búsqueda").await;
        }
        Err(e) => {
            return edit_deferred(ctx, command, &format!("❌ No se pudo resolver: {e:#}")).await;
        }
    };

    let mut queued = 0usize;
    let mut first_title = None;
    let mut queue_full = false;
    for item in resolved {
        let track = Track::new(item, guild_id, command.user.id, command.channel_id);
        if first_title.is_none() {
            first_title = Some(track.title.clone());
        }
        match coordinator.enqueue(track, play_next).await {
            Ok(()) => queued += 1,
            Err(_) => {
                queue_full = true;
                break;
            }
        }
    }

    let message = match (queued, queue_full) {
        (0, true) => "📦 La cola está llena".to_string(),
        (1, false) => format!("🎵 Encolada: {}", first_title.unwrap_or_default()),
        (n, false) => format!("🎵 {n} canciones encoladas"),
        (n, true) => format!("🎵 {n} canciones encoladas (la cola se llenó)"),
    };
    edit_deferred(ctx, command, &message).await
}

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &TempoBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(user_channel) = user_voice_channel(ctx, guild_id, command.user.id) else {
        return respond(ctx, command, "🎧 Entra a un canal de voz primero").await;
    };

    bot.join_voice(ctx, guild_id, user_channel).await?;
    respond(ctx, command, "👋 Conectado a tu canal de voz").await
}

async fn handle_leave(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &TempoBot,
    guild_id: GuildId,
) -> Result<()> {
    if bot.leave_voice(ctx, guild_id).await? {
        respond(ctx, command, "👋 Desconectado").await
    } else {
        respond(ctx, command, "❌ No estoy en ningún canal de voz").await
    }
}

async fn handle_pause(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &TempoBot,
    guild_id: GuildId,
) -> Result<()> {
    let paused = match live_coordinator(bot, guild_id) {
        Some(coordinator) => coordinator.pause().await,
        None => false,
    };
    if paused {
        respond(ctx, command, "⏸️ Pausado").await
    } else {
        respond(ctx, command, "❌ No hay nada sonando que pausar").await
    }
}

async fn handle_resume(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &TempoBot,
    guild_id: GuildId,
) -> Result<()> {
    let resumed = match live_coordinator(bot, guild_id) {
        Some(coordinator) => coordinator.resume().await,
        None => false,
    };
    if resumed {
        respond(ctx, command, "▶️ Reanudado").await
    } else {
        respond(ctx, command, "❌ No hay ninguna canción pausada").await
    }
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &TempoBot,
    guild_id: GuildId,
) -> Result<()> {
    let skipped = match live_coordinator(bot, guild_id) {
        Some(coordinator) => coordinator.skip().await,
        None => false,
    };
    if skipped {
        respond(ctx, command, "⏭️ Saltada").await
    } else {
        respond(ctx, command, "❌ No hay nada sonando").await
    }
}

async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &TempoBot,
    guild_id: GuildId,
) -> Result<()> {
    let stopped = match live_coordinator(bot, guild_id) {
        Some(coordinator) => coordinator.stop().await,
        None => false,
    };
    if stopped {
        respond(ctx, command, "⏹️ Reproducción detenida y cola vacía").await
    } else {
        respond(ctx, command, "❌ No había nada que detener").await
    }
}

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &TempoBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(coordinator) = bot.registry.get(guild_id) else {
        return respond(ctx, command, "📭 La cola está vacía").await;
    };

    let page = option_int(command, "page").unwrap_or(1).max(1) as usize;
    let snapshot = coordinator.queue().snapshot(page, bot.config.queue_page_size);
    let looping = coordinator.queue().is_loop();
    respond_embed(ctx, command, embeds::queue_page(&snapshot, looping)).await
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &TempoBot,
    guild_id: GuildId,
) -> Result<()> {
    match bot.registry.get(guild_id).and_then(|c| c.current_track()) {
        Some(track) => respond_embed(ctx, command, embeds::now_playing(&track)).await,
        None => respond(ctx, command, "❌ No hay nada sonando").await,
    }
}

async fn handle_shuffle(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &TempoBot,
    guild_id: GuildId,
) -> Result<()> {
    match bot.registry.get(guild_id) {
        Some(coordinator) if !coordinator.queue().is_empty() => {
            coordinator.queue().shuffle();
            respond(ctx, command, "🔀 Cola mezclada").await
        }
        _ => respond(ctx, command, "📭 La cola está vacía").await,
    }
}

async fn handle_loop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &TempoBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(coordinator) = bot.registry.get(guild_id) else {
        return respond(ctx, command, "❌ No estoy en ningún canal de voz").await;
    };

    if coordinator.queue().toggle_loop() {
        respond(ctx, command, "🔁 Loop activado: lo que termine vuelve a la cola").await
    } else {
        respond(ctx, command, "➡️ Loop desactivado").await
    }
}

async fn handle_remove(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &TempoBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(coordinator) = bot.registry.get(guild_id) else {
        return respond(ctx, command, "📭 La cola está vacía").await;
    };

    // por posición mostrada en /queue
    if let Some(position) = option_int(command, "position") {
        return match coordinator.queue().remove_at(position.max(0) as usize) {
            Some(track) => {
                respond(ctx, command, &format!("❌ Quitada: {}", track.title)).await
            }
            None => respond(ctx, command, "❌ No hay ninguna canción en esa posición").await,
        };
    }

    // por búsqueda: resolver los ids y quitar la primera coincidencia
    let Some(query) = option_str(command, "query") else {
        return respond(ctx, command, "❌ Indica una posición o una búsqueda").await;
    };
    command.defer(&ctx.http).await?;

    let ids: HashSet<String> = match bot.resolver.resolve(&query).await {
        Ok(tracks) => tracks.into_iter().map(|t| t.id).collect(),
        Err(e) => {
            return edit_deferred(ctx, command, &format!("❌ No se pudo resolver: {e:#}")).await;
        }
    };

    match coordinator.queue().remove_matching(&ids) {
        Some(track) => edit_deferred(ctx, command, &format!("❌ Quitada: {}", track.title)).await,
        None => edit_deferred(ctx, command, "🔍 Esa canción no está en la cola").await,
    }
}

async fn handle_clear(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &TempoBot,
    guild_id: GuildId,
) -> Result<()> {
    match bot.registry.get(guild_id) {
        Some(coordinator) if !coordinator.queue().is_empty() => {
            coordinator.queue().clear();
            respond(ctx, command, "🗑️ Cola vaciada").await
        }
        _ => respond(ctx, command, "📭 La cola ya está vacía").await,
    }
}

async fn handle_stats(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &TempoBot,
    guild_id: GuildId,
) -> Result<()> {
    if !bot.store.is_enabled() {
        return respond(ctx, command, "📊 El registro de uso está desactivado").await;
    }

    command.defer(&ctx.http).await?;

    let mut filter = UsageFilter::guild(guild_id.get());
    let mut description = format!("Servidor {guild_id}");

    if let Some(user_id) = option_user(command, "user") {
        filter = filter.with_requester(user_id.get());
        description = format!("Solicitante <@{user_id}>");
    }

    if let Some(query) = option_str(command, "query") {
        match bot.resolver.resolve(&query).await {
            Ok(tracks) if !tracks.is_empty() => {
                let track = &tracks[0];
                description = format!("{description} • [{}]({})", track.title, track.url);
                filter = filter.with_track(track.id.clone());
            }
            _ => {
                return edit_deferred(ctx, command, "🔍 No se encontró esa canción").await;
            }
        }
    }

    // el track sonando ahora cuenta antes de persistirse
    let live = bot.registry.get(guild_id).and_then(|c| c.current_track());
    let report = bot.stats.create_stats(&filter, live.as_ref()).await;

    command
        .edit_response(
            &ctx.http,
            EditInteractionResponse::new().embed(embeds::stats(&report, description)),
        )
        .await?;
    Ok(())
}
