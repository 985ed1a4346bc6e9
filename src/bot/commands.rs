use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        join_command(),
        leave_command(),
        pause_command(),
        resume_command(),
        skip_command(),
        stop_command(),
        queue_command(),
        nowplaying_command(),
        shuffle_command(),
        loop_command(),
        remove_command(),
        clear_command(),
        stats_command(),
    ]
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }
    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Encola una canción o playlist")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL o término de búsqueda",
            )
            .required(true),
        )
        .add_option(CreateCommandOption::new(
            CommandOptionType::Boolean,
            "next",
            "Ponerla la primera de la cola",
        ))
}

fn join_command() -> CreateCommand {
    CreateCommand::new("join").description("Une el bot a tu canal de voz")
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Desconecta el bot y limpia la cola")
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa la canción actual")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Reanuda la canción pausada")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Salta a la siguiente canción")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la reproducción y vacía la cola")
}

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Muestra la cola de reproducción")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "page", "Página a mostrar")
                .min_int_value(1),
        )
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Muestra la canción actual")
}

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle").description("Mezcla la cola")
}

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop").description("Activa o desactiva el loop de la cola")
}

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Quita una canción de la cola")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "position",
                "Posición mostrada en /queue",
            )
            .min_int_value(1),
        )
        .add_option(CreateCommandOption::new(
            CommandOptionType::String,
            "query",
            "URL o búsqueda de la canción a quitar",
        ))
}

fn clear_command() -> CreateCommand {
    CreateCommand::new("clear").description("Vacía la cola sin tocar la canción actual")
}

fn stats_command() -> CreateCommand {
    CreateCommand::new("stats")
        .description("Estadísticas de uso del servidor")
        .add_option(CreateCommandOption::new(
            CommandOptionType::User,
            "user",
            "Filtrar por solicitante",
        ))
        .add_option(CreateCommandOption::new(
            CommandOptionType::String,
            "query",
            "Filtrar por canción (URL o búsqueda)",
        ))
}
