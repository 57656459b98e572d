//! Writing and reading catalog messages as protobuf binary or JSON files.

use std::path::Path;

use prost::Message;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{Error, Result};

/// Renders `message` as indented JSON.
pub fn to_json<T: Serialize>(message: &T) -> Result<String> {
    serde_json::to_string_pretty(message)
        .map_err(|e| Error::Internal(format!("cannot encode message as JSON: {e}")))
}

/// Writes `message` to `path` as JSON.
pub fn write_json_file<T: Serialize>(message: &T, path: impl AsRef<Path>) -> Result<()> {
    std::fs::write(path, to_json(message)?)?;
    Ok(())
}

/// Reads a JSON message from `path`.
pub fn read_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let data = std::fs::read(path)?;
    serde_json::from_slice(&data)
        .map_err(|e| Error::InvalidArgument(format!("cannot decode JSON message: {e}")))
}

/// Writes `message` to `path` in protobuf binary encoding.
pub fn write_binary_file<M: Message>(message: &M, path: impl AsRef<Path>) -> Result<()> {
    std::fs::write(path, message.encode_to_vec())?;
    Ok(())
}

/// Reads a protobuf binary message from `path`.
pub fn read_binary_file<M: Message + Default>(path: impl AsRef<Path>) -> Result<M> {
    let data = std::fs::read(path)?;
    M::decode(data.as_slice())
        .map_err(|e| Error::InvalidArgument(format!("cannot decode binary message: {e}")))
}

/// Serde adapter for optional well-known timestamps, as `{ "seconds", "nanos" }`.
pub mod timestamp {
    use prost_types::Timestamp;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Parts {
        seconds: i64,
        nanos: i32,
    }

    pub fn serialize<S: Serializer>(
        value: &Option<Timestamp>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value
            .as_ref()
            .map(|ts| Parts {
                seconds: ts.seconds,
                nanos: ts.nanos,
            })
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Timestamp>, D::Error> {
        let parts = Option::<Parts>::deserialize(deserializer)?;
        Ok(parts.map(|p| Timestamp {
            seconds: p.seconds,
            nanos: p.nanos,
        }))
    }
}
