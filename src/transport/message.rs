use serde_json::{Map, Value};

use crate::runtime::InputEvent;
use crate::steno::Stroke;

/// Translate one decrypted Plover payload. Unknown or malformed payloads
/// yield `None`.
pub fn parse(payload: &str) -> Option<InputEvent> {
    let json: Map<String, Value> = match serde_json::from_str(payload) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            log::error!("Plover message is not an object: {payload}");
            return None;
        }
        Err(e) => {
            log::error!("Failed to deserialize plover message: {e}");
            return None;
        }
    };

    if let Some(text) = json.get("send_string") {
        let text = match text {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Some(InputEvent::TextInserted(text))
    } else if let Some(count) = json.get("send_backspaces") {
        let count = count.as_u64().unwrap_or(0) as usize;
        Some(InputEvent::Backspace(count))
    } else if let Some(stroked) = json.get("stroked") {
        Some(InputEvent::Stroke(stroke(stroked, &json)))
    } else {
        log::trace!("Ignoring plover message: {payload}");
        None
    }
}

// Stroke fields may be nested under "stroked" or sit beside it.
fn stroke(stroked: &Value, outer: &Map<String, Value>) -> Stroke {
    let field = |name: &str| {
        stroked
            .get(name)
            .or_else(|| outer.get(name))
            .cloned()
            .unwrap_or(Value::Null)
    };

    Stroke {
        keys: serde_json::from_value(field("keys")).unwrap_or_default(),
        rtfcre: field("rtfcre").as_str().unwrap_or_default().to_string(),
        paper: field("paper").as_str().unwrap_or_default().to_string(),
    }
}
