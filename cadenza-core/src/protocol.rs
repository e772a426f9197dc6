//! Wire codec shared by every engine channel.
//!
//! A message is one line of JSON holding an array whose first element is the
//! message name and whose remaining elements are its positional arguments:
//!
//! ```text
//! ["append-queue", "3f0c...", [0, 4], 183000000000]
//! ["track-started", 183.0, true, 0, 4]
//! ```
//!
//! Typed commands and replies (see [`crate::commands`]) implement [`Message`]
//! so the name is the only thing that is ever matched as a string.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use strum::{Display, EnumString};

use crate::error::ProtocolError;

/// A typed message that travels as `[name, ...args]`.
pub trait Message: Sized {
    /// The wire name, e.g. `"append-queue"`.
    fn name(&self) -> &'static str;

    /// Positional arguments in wire order.
    fn args(&self) -> Vec<Value>;

    /// Build the variant for `name`, consuming `args`.
    fn from_parts(name: &str, args: Args) -> Result<Self, ProtocolError>;
}

/// Encode a message as a single line of JSON (without the trailing newline).
pub fn encode<M: Message>(message: &M) -> String {
    let mut parts = vec![Value::from(message.name())];
    parts.extend(message.args());
    Value::Array(parts).to_string()
}

/// Decode one line into a typed message.
pub fn decode<M: Message>(line: &str) -> Result<M, ProtocolError> {
    let value: Value = serde_json::from_str(line)?;
    let Value::Array(parts) = value else {
        return Err(ProtocolError::NotAMessage);
    };
    let mut parts = parts.into_iter();
    let Some(Value::String(name)) = parts.next() else {
        return Err(ProtocolError::NotAMessage);
    };
    let args = Args {
        name: name.clone(),
        values: parts,
        index: 0,
    };
    M::from_parts(&name, args)
}

/// Cursor over the positional arguments of one decoded message.
pub struct Args {
    name: String,
    values: std::vec::IntoIter<Value>,
    index: usize,
}

impl Args {
    /// Take the next argument and deserialize it.
    pub fn next<T: DeserializeOwned>(&mut self, what: &'static str) -> Result<T, ProtocolError> {
        let index = self.index;
        self.index += 1;
        let value = self.values.next().ok_or_else(|| ProtocolError::MissingArgument {
            name: self.name.clone(),
            index,
            what,
        })?;
        serde_json::from_value(value).map_err(|source| ProtocolError::BadArgument {
            name: self.name.clone(),
            index,
            what,
            source,
        })
    }

    /// Require that every argument was consumed.
    pub fn finish(self) -> Result<(), ProtocolError> {
        let extra = self.values.len();
        if extra == 0 {
            Ok(())
        } else {
            Err(ProtocolError::TrailingArguments {
                name: self.name,
                extra,
            })
        }
    }
}

/// Position of a track on a recording: `(disc_num, track_num)`, zero based.
///
/// Travels as a two element array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(u32, u32)", into = "(u32, u32)")]
pub struct TrackId {
    pub disc_num: u32,
    pub track_num: u32,
}

impl TrackId {
    pub fn new(disc_num: u32, track_num: u32) -> Self {
        Self { disc_num, track_num }
    }
}

impl From<(u32, u32)> for TrackId {
    fn from((disc_num, track_num): (u32, u32)) -> Self {
        Self { disc_num, track_num }
    }
}

impl From<TrackId> for (u32, u32) {
    fn from(id: TrackId) -> Self {
        (id.disc_num, id.track_num)
    }
}

impl From<TrackId> for Value {
    fn from(id: TrackId) -> Self {
        Value::Array(vec![Value::from(id.disc_num), Value::from(id.track_num)])
    }
}

/// Media pipeline state, reported by its canonical upper-case name.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    VoidPending,
    #[default]
    Null,
    Ready,
    Paused,
    Playing,
}

impl From<PipelineState> for Value {
    fn from(state: PipelineState) -> Self {
        Value::from(state.to_string())
    }
}
