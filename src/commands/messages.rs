use colored::Colorize;
use tracing::warn;

use crate::error::{AgoraError, Result};
use crate::facade::Agora;
use crate::model::{Message, MessageQuery};
use crate::output::{self, Format};
use crate::validate::{validate_agent_name, validate_message, validate_room_name};

fn require_room(agora: &Agora, room: &str) -> Result<()> {
    validate_room_name(room)?;
    if !agora.room_exists(room)? {
        return Err(AgoraError::RoomNotFound(room.to_string()));
    }
    Ok(())
}

/// Post a message as `agent`, who must currently be online in the room.
///
/// Once the append succeeds the message is sent, so a failure to bump the
/// room's or the agent's message counter afterwards is logged, not returned.
/// Retrying on an error from here never duplicates a message.
pub fn send_message(
    agora: &Agora,
    room: &str,
    agent: &str,
    body: &str,
    metadata: Option<serde_json::Map<String, serde_json::Value>>,
) -> Result<Message> {
    validate_agent_name(agent)?;
    validate_message(body)?;
    require_room(agora, room)?;

    let presence = agora.get_presence(room, agent)?;
    if !presence.record.is_online() {
        return Err(AgoraError::AgentOffline {
            room: room.to_string(),
            agent: agent.to_string(),
        });
    }

    let message = Message::new(agent, body, metadata);
    agora.append_message(room, &message)?;
    if let Err(e) = agora.increment_room_message_count(room) {
        warn!(room, error = %e, "message sent but room counter not updated");
    }
    if let Err(e) = agora.increment_agent_message_count(room, agent) {
        warn!(room, agent, error = %e, "message sent but agent counter not updated");
    }
    Ok(message)
}

pub fn send(
    agora: &Agora,
    room: &str,
    agent: &str,
    body: &str,
    metadata: Option<serde_json::Map<String, serde_json::Value>>,
    format: Format,
) -> Result<()> {
    let message = send_message(agora, room, agent, body, metadata)?;
    match format {
        Format::Pretty => {
            println!("Sent to {}: {}", format!("#{room}").bold(), message.message);
            if !message.mentions.is_empty() {
                println!("  {} {}", "mentions:".dimmed(), message.mentions.join(", "));
            }
        }
        _ => output::print_message(&message, format)?,
    }
    Ok(())
}

pub fn read(agora: &Agora, room: &str, query: &MessageQuery, format: Format) -> Result<()> {
    require_room(agora, room)?;
    if let Some(agent) = query.agent_name.as_deref() {
        validate_agent_name(agent)?;
    }
    if query.mentions_only && query.agent_name.is_none() {
        return Err(AgoraError::Validation(
            "--mentions-only requires --agent".into(),
        ));
    }
    let page = agora.query_messages(room, query)?;
    output::print_page(&page, format)
}

pub fn count(agora: &Agora, room: &str, format: Format) -> Result<()> {
    require_room(agora, room)?;
    let count = agora.message_count(room)?;
    match format {
        Format::Json => println!("{}", serde_json::json!({"room": room, "count": count})),
        Format::Pretty => println!("{} has {} message(s)", format!("#{room}").bold(), count),
        Format::Minimal => println!("{count}"),
    }
    Ok(())
}

pub fn clear(agora: &Agora, room: &str, format: Format) -> Result<()> {
    require_room(agora, room)?;
    let removed = agora.clear_messages(room)?;
    match format {
        Format::Json => println!("{}", serde_json::json!({"room": room, "removed": removed})),
        Format::Pretty => println!(
            "Cleared {} message(s) from {}",
            removed,
            format!("#{room}").bold()
        ),
        Format::Minimal => println!("{removed}"),
    }
    Ok(())
}
