//! Wire commands of the WebSocket adapter. Parsing is lenient the same way
//! the UI is: a malformed message yields `None` and is dropped without
//! disturbing the running session.

use serde_json::Value;

use crate::types::{Direction, HallKind, PickupKind, SessionSnapshot};

#[derive(Debug, PartialEq)]
pub enum ClientCommand {
    Hello {
        name: String,
    },
    Start {
        hall: Option<HallKind>,
        seed: Option<u32>,
        time_limit_secs: Option<i64>,
    },
    Step {
        dir: Direction,
    },
    Interact {
        x: i32,
        y: i32,
    },
    UseItem {
        item: PickupKind,
        dir: Option<Direction>,
    },
    Freeze,
    Unfreeze,
    NextHall,
    Save,
    Load {
        snapshot: Box<SessionSnapshot>,
    },
    Ping {
        t: f64,
    },
}

pub fn parse_client_command(raw: &str) -> Option<ClientCommand> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    match message_type {
        "hello" => {
            let name = object.get("name")?.as_str()?.to_string();
            Some(ClientCommand::Hello { name })
        }
        "start" => {
            let hall = match object.get("hall") {
                None => None,
                Some(value) => Some(HallKind::parse(value.as_str()?)?),
            };
            let seed = match object.get("seed") {
                None => None,
                Some(value) => Some(u32::try_from(value.as_u64()?).ok()?),
            };
            let time_limit_secs = match object.get("timeLimitSecs") {
                None => None,
                Some(value) => {
                    let secs = value.as_i64()?;
                    if secs <= 0 {
                        return None;
                    }
                    Some(secs)
                }
            };
            Some(ClientCommand::Start {
                hall,
                seed,
                time_limit_secs,
            })
        }
        "step" => {
            let dir = Direction::parse(object.get("dir")?.as_str()?)?;
            Some(ClientCommand::Step { dir })
        }
        "interact" => {
            let x = i32::try_from(object.get("x")?.as_i64()?).ok()?;
            let y = i32::try_from(object.get("y")?.as_i64()?).ok()?;
            Some(ClientCommand::Interact { x, y })
        }
        "use_item" => {
            let item = PickupKind::parse(object.get("item")?.as_str()?)?;
            let dir = match object.get("dir") {
                None => None,
                Some(value) => Some(Direction::parse(value.as_str()?)?),
            };
            Some(ClientCommand::UseItem { item, dir })
        }
        "freeze" => Some(ClientCommand::Freeze),
        "unfreeze" => Some(ClientCommand::Unfreeze),
        "next_hall" => Some(ClientCommand::NextHall),
        "save" => Some(ClientCommand::Save),
        "load" => {
            let snapshot = object.get("snapshot")?;
            let snapshot: SessionSnapshot = serde_json::from_value(snapshot.clone()).ok()?;
            Some(ClientCommand::Load {
                snapshot: Box::new(snapshot),
            })
        }
        "ping" => {
            let t = object.get("t")?.as_f64()?;
            if !t.is_finite() {
                return None;
            }
            Some(ClientCommand::Ping { t })
        }
        _ => None,
    }
}
