use crate::error::Result;
use crate::facade::Agora;
use crate::output::{self, Format};
use crate::validate::{validate_description, validate_room_name};

pub fn create(agora: &Agora, name: &str, description: Option<&str>, format: Format) -> Result<()> {
    validate_room_name(name)?;
    if let Some(desc) = description {
        validate_description(desc)?;
    }
    let room = agora.create_room(name, description)?;
    output::print_room(&room, format)
}

pub fn list(agora: &Agora, format: Format) -> Result<()> {
    let rooms = agora.list_rooms()?;
    output::print_rooms(&rooms, format)
}

pub fn show(agora: &Agora, name: &str, format: Format) -> Result<()> {
    validate_room_name(name)?;
    let room = agora.get_room(name)?;
    output::print_room(&room, format)
}
