use lopdf::{dictionary, Dictionary, Object, ObjectId, StringFormat};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    JavaScript,
}

impl ActionKind {
    /// Value of the action dictionary's `/S` entry.
    pub fn subtype(self) -> &'static str {
        match self {
            ActionKind::JavaScript => "JavaScript",
        }
    }
}

/// A script-trigger action, built once per processed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub kind: ActionKind,
    pub payload: String,
}

impl Action {
    pub fn javascript(payload: impl Into<String>) -> Self {
        Self { kind: ActionKind::JavaScript, payload: payload.into() }
    }

    pub fn to_dictionary(&self) -> Dictionary {
        dictionary! {
            "Type" => "Action",
            "S" => self.kind.subtype(),
            "JS" => encode_text_string(&self.payload),
        }
    }
}

/// Handle to an action that has been materialised as an indirect object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionRef(pub ObjectId);

impl ActionRef {
    pub fn id(self) -> ObjectId {
        self.0
    }

    pub fn object(self) -> Object {
        Object::Reference(self.0)
    }
}

/// ASCII payloads are written as literal strings; anything else as a
/// UTF-16BE text string with a byte order mark.
pub fn encode_text_string(text: &str) -> Object {
    if text.is_ascii() {
        return Object::string_literal(text);
    }
    let mut bytes = Vec::with_capacity(2 + text.len() * 2);
    bytes.extend_from_slice(&[0xFE, 0xFF]);
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

pub fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(body) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> =
            body.chunks_exact(2).map(|pair| u16::from_be_bytes([pair[0], pair[1]])).collect();
        return String::from_utf16_lossy(&units);
    }
    String::from_utf8_lossy(bytes).into_owned()
}
