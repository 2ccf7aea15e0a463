use std::time::Duration;

use colored::Colorize;

use crate::error::{AgoraError, Result};
use crate::facade::Agora;
use crate::model::{AgentPresence, AgentProfile};
use crate::output::{self, Format};
use crate::validate::{validate_agent_name, validate_description, validate_room_name};

/// Bring `agent` online in an existing room and refresh the room's online count.
pub fn enter_room(
    agora: &Agora,
    room: &str,
    agent: &str,
    profile: Option<AgentProfile>,
) -> Result<AgentPresence> {
    validate_room_name(room)?;
    validate_agent_name(agent)?;
    if let Some(desc) = profile.as_ref().and_then(|p| p.description.as_deref()) {
        validate_description(desc)?;
    }
    if !agora.room_exists(room)? {
        return Err(AgoraError::RoomNotFound(room.to_string()));
    }
    let presence = agora.upsert_presence(room, agent, profile)?;
    refresh_user_count(agora, room)?;
    Ok(presence)
}

/// Mark `agent` offline and refresh the room's online count.
pub fn leave_room(agora: &Agora, room: &str, agent: &str) -> Result<AgentPresence> {
    validate_room_name(room)?;
    validate_agent_name(agent)?;
    if !agora.room_exists(room)? {
        return Err(AgoraError::RoomNotFound(room.to_string()));
    }
    let presence = agora.set_offline(room, agent)?;
    refresh_user_count(agora, room)?;
    Ok(presence)
}

fn refresh_user_count(agora: &Agora, room: &str) -> Result<()> {
    let online = agora.count_online(room)?;
    agora.update_user_count(room, online)?;
    Ok(())
}

pub fn enter(
    agora: &Agora,
    room: &str,
    agent: &str,
    profile: Option<AgentProfile>,
    format: Format,
) -> Result<()> {
    let presence = enter_room(agora, room, agent, profile)?;
    match format {
        Format::Pretty => println!(
            "'{}' entered {}",
            agent.cyan(),
            format!("#{room}").bold()
        ),
        _ => output::print_presence(&presence, format)?,
    }
    Ok(())
}

pub fn leave(agora: &Agora, room: &str, agent: &str, format: Format) -> Result<()> {
    let presence = leave_room(agora, room, agent)?;
    match format {
        Format::Pretty => println!("'{}' left {}", agent.cyan(), format!("#{room}").bold()),
        _ => output::print_presence(&presence, format)?,
    }
    Ok(())
}

pub fn who(agora: &Agora, room: &str, format: Format) -> Result<()> {
    validate_room_name(room)?;
    if !agora.room_exists(room)? {
        return Err(AgoraError::RoomNotFound(room.to_string()));
    }
    let agents = agora.list_presence(room)?;
    output::print_presence_list(&agents, format)
}

pub fn prune(agora: &Agora, room: &str, older_than: Duration, format: Format) -> Result<()> {
    validate_room_name(room)?;
    if !agora.room_exists(room)? {
        return Err(AgoraError::RoomNotFound(room.to_string()));
    }
    let removed = agora.prune_offline(room, older_than)?;
    match format {
        Format::Json => println!("{}", serde_json::json!({"room": room, "removed": removed})),
        Format::Pretty => println!(
            "Pruned {} offline agent(s) from {}",
            removed,
            format!("#{room}").bold()
        ),
        Format::Minimal => println!("{removed}"),
    }
    Ok(())
}
