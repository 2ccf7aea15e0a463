use clap::ValueEnum;
use colored::Colorize;

use crate::error::Result;
use crate::model::{AgentPresence, Message, MessagePage, PresenceStatus, Room};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Json,
    Pretty,
    Minimal,
}

pub fn print_room(room: &Room, format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string(room)?),
        Format::Pretty => {
            println!("{}", format!("#{}", room.name).cyan().bold());
            if let Some(ref desc) = room.record.description {
                println!("  {}", desc);
            }
            println!(
                "  {} {} | {} {} | {} {}",
                "messages:".dimmed(),
                room.record.message_count,
                "online:".dimmed(),
                room.record.user_count,
                "created:".dimmed(),
                room.record.created_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
        Format::Minimal => println!("{}", room.name),
    }
    Ok(())
}

pub fn print_rooms(rooms: &[Room], format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string(rooms)?),
        Format::Pretty => {
            if rooms.is_empty() {
                println!("{}", "No rooms.".dimmed());
            }
            for room in rooms {
                print_room(room, Format::Pretty)?;
            }
        }
        Format::Minimal => {
            println!("{:24} {:>8} {:>6}", "ROOM", "MESSAGES", "ONLINE");
            println!("{}", "-".repeat(40));
            for room in rooms {
                println!(
                    "{:24} {:>8} {:>6}",
                    truncate(&room.name, 24),
                    room.record.message_count,
                    room.record.user_count
                );
            }
        }
    }
    Ok(())
}

pub fn print_presence(agent: &AgentPresence, format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string(agent)?),
        Format::Pretty => {
            let status = match agent.record.status {
                PresenceStatus::Online => "online".green(),
                PresenceStatus::Offline => "offline".dimmed(),
            };
            println!("{} {}", format!("[{}]", agent.agent_name).cyan().bold(), status);
            if let Some(ref profile) = agent.record.profile {
                if let Some(ref role) = profile.role {
                    println!("  {} {}", "role:".dimmed(), role);
                }
                if !profile.capabilities.is_empty() {
                    println!(
                        "  {} {}",
                        "capabilities:".dimmed(),
                        profile.capabilities.join(", ")
                    );
                }
            }
            println!(
                "  {} {} | {} {}",
                "messages:".dimmed(),
                agent.record.message_count,
                "joined:".dimmed(),
                agent.record.joined_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
        Format::Minimal => println!("{} {}", agent.agent_name, agent.record.status),
    }
    Ok(())
}

pub fn print_presence_list(agents: &[AgentPresence], format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string(agents)?),
        Format::Pretty => {
            if agents.is_empty() {
                println!("{}", "No agents.".dimmed());
            }
            for agent in agents {
                print_presence(agent, Format::Pretty)?;
            }
        }
        Format::Minimal => {
            for agent in agents {
                print_presence(agent, Format::Minimal)?;
            }
        }
    }
    Ok(())
}

pub fn print_message(message: &Message, format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string(message)?),
        Format::Pretty => println!(
            "{} {} {}",
            message.timestamp.format("%H:%M:%S").to_string().dimmed(),
            format!("<{}>", message.agent_name).cyan().bold(),
            message.message
        ),
        Format::Minimal => println!("{}", message.id),
    }
    Ok(())
}

pub fn print_page(page: &MessagePage, format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string(page)?),
        Format::Pretty => {
            if page.messages.is_empty() {
                println!("{}", "No messages.".dimmed());
            }
            for message in &page.messages {
                print_message(message, Format::Pretty)?;
            }
            if page.has_more {
                println!("{}", "(more messages available)".dimmed());
            }
        }
        Format::Minimal => {
            for message in &page.messages {
                println!(
                    "{:8} {:12} {}",
                    message.timestamp.format("%H:%M:%S"),
                    truncate(&message.agent_name, 12),
                    message.message
                );
            }
        }
    }
    Ok(())
}

pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() > max_len {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    } else {
        s.to_string()
    }
}
