use serde_json::Value;

use crate::types::{InputSnapshot, Vec2};

#[derive(Debug, PartialEq)]
pub enum ParsedClientMessage {
    Hello { name: String, spectator: bool },
    Input(InputSnapshot),
    Restart { seed: Option<u32> },
    Ping { t: f64 },
}

pub fn parse_client_message(raw: &str) -> Option<ParsedClientMessage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    match message_type {
        "hello" => {
            let name = object.get("name")?.as_str()?.trim().to_string();
            if name.is_empty() {
                return None;
            }
            let spectator = match object.get("spectator") {
                None => false,
                Some(value) => value.as_bool()?,
            };
            Some(ParsedClientMessage::Hello { name, spectator })
        }
        "input" => {
            let input = InputSnapshot {
                horizontal_axis: parse_axis(object.get("horizontal"))?,
                vertical_axis: parse_axis(object.get("vertical"))?,
                jump_pressed: parse_flag(object.get("jump"))?,
                fire_pressed: parse_flag(object.get("fire"))?,
                interact_pressed: parse_flag(object.get("interact"))?,
                pointer_world_position: parse_pointer(object.get("pointer"))?,
            };
            Some(ParsedClientMessage::Input(input.clamped()))
        }
        "restart" => {
            let seed = match object.get("seed") {
                None | Some(Value::Null) => None,
                Some(value) => Some(u32::try_from(value.as_u64()?).ok()?),
            };
            Some(ParsedClientMessage::Restart { seed })
        }
        "ping" => {
            let t = object.get("t")?.as_f64()?;
            if !t.is_finite() {
                return None;
            }
            Some(ParsedClientMessage::Ping { t })
        }
        _ => None,
    }
}

fn parse_axis(value: Option<&Value>) -> Option<f32> {
    let Some(value) = value else {
        return Some(0.0);
    };
    let number = value.as_f64()?;
    if !number.is_finite() {
        return None;
    }
    Some(number.clamp(-1.0, 1.0) as f32)
}

fn parse_flag(value: Option<&Value>) -> Option<bool> {
    match value {
        None => Some(false),
        Some(value) => value.as_bool(),
    }
}

fn parse_pointer(value: Option<&Value>) -> Option<Vec2> {
    let Some(value) = value else {
        return Some(Vec2::ZERO);
    };
    let object = value.as_object()?;
    let x = object.get("x")?.as_f64()?;
    let y = object.get("y")?.as_f64()?;
    if !(x.is_finite() && y.is_finite()) {
        return None;
    }
    Some(Vec2::new(x as f32, y as f32))
}
