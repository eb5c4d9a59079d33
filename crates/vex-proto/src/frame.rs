//! Validated JSON frame.

use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::{ProtocolError, Request, Result, TransmissionId};

/// One JSON text frame.
///
/// # Invariants
///
/// - The top level is always a JSON object.
/// - The object always has a string `type` field.
///
/// Everything else (payload fields, `transmissionID`, nested `data`) is left
/// untyped until a caller asks for a specific shape with [`Frame::decode`] or
/// [`Frame::decode_data`]. This keeps parsing total over well-framed input:
/// the dispatcher can always read `type` and `transmissionID` even when the
/// payload is something this client version does not understand.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    fields: Map<String, Value>,
}

impl Frame {
    /// Field holding the frame's kind.
    pub const TYPE_FIELD: &'static str = "type";

    /// Field holding the correlation token.
    pub const ID_FIELD: &'static str = "transmissionID";

    /// Parses and validates one text frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Malformed` if the text is not JSON
    /// - `ProtocolError::NotAnObject` if the top level is not an object
    /// - `ProtocolError::MissingType` if `type` is absent or not a string
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        Self::from_value(value)
    }

    /// Validates an already-parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(fields) = value else {
            return Err(ProtocolError::NotAnObject);
        };

        if !matches!(fields.get(Self::TYPE_FIELD), Some(Value::String(_))) {
            return Err(ProtocolError::MissingType);
        }

        Ok(Self { fields })
    }

    /// Encodes a request and stamps it with a correlation token.
    pub fn request(id: &TransmissionId, request: &Request) -> Result<Self> {
        let value =
            serde_json::to_value(request).map_err(|e| ProtocolError::Encode(e.to_string()))?;
        let mut frame = Self::from_value(value)?;
        frame.set_transmission_id(id);
        Ok(frame)
    }

    /// The `type` discriminator.
    pub fn kind(&self) -> &str {
        self.str_field(Self::TYPE_FIELD).unwrap_or_default()
    }

    /// The `method` field, when present.
    pub fn method(&self) -> Option<&str> {
        self.str_field("method")
    }

    /// The `transmissionID` correlation token, when present.
    pub fn transmission_id(&self) -> Option<&str> {
        self.str_field(Self::ID_FIELD)
    }

    /// Replaces the correlation token.
    pub fn set_transmission_id(&mut self, id: &TransmissionId) {
        self.fields.insert(Self::ID_FIELD.to_owned(), Value::String(id.as_str().to_owned()));
    }

    /// True for `error` reply envelopes.
    pub fn is_error(&self) -> bool {
        self.kind() == "error"
    }

    /// Raw field access.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// String field access.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// The `data` field of a reply envelope, `null` when absent.
    pub fn data(&self) -> &Value {
        self.fields.get("data").unwrap_or(&Value::Null)
    }

    /// Decodes the whole frame into a typed shape.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.fields.clone()))
            .map_err(|e| ProtocolError::invalid::<T>(&e))
    }

    /// Decodes the `data` field into a typed shape.
    pub fn decode_data<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.data().clone()).map_err(|e| ProtocolError::invalid::<T>(&e))
    }

    /// Consumes the frame, returning the underlying JSON object.
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string(&self.fields).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}
