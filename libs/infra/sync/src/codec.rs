// [libs/infra/sync/src/codec.rs]
/*!
 * Record <-> Redis hash mapping (spec §4.7 "Serialization"). Scalars
 * render as bare strings; arrays and objects render as JSON-encoded
 * string fields. We lean on `serde_json::Value` to do the per-field
 * classification rather than hand-matching every struct field, then
 * let `ApiKeyRecord`'s own `#[serde(default)]` attributes back-fill
 * whatever the remote hash is missing (spec §4.1).
 */

use crate::errors::SyncError;
use paygate_model::key::KeyGroup;
use paygate_model::ApiKeyRecord;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

pub fn record_to_hash(record: &ApiKeyRecord) -> Result<HashMap<String, String>, SyncError> {
    to_hash(record)
}

pub fn hash_to_record(fields: HashMap<String, String>) -> Result<ApiKeyRecord, SyncError> {
    from_hash(fields)
}

pub fn group_to_hash(group: &KeyGroup) -> Result<HashMap<String, String>, SyncError> {
    to_hash(group)
}

pub fn hash_to_group(fields: HashMap<String, String>) -> Result<KeyGroup, SyncError> {
    from_hash(fields)
}

fn to_hash<T: Serialize>(value: &T) -> Result<HashMap<String, String>, SyncError> {
    let json = serde_json::to_value(value).map_err(|e| SyncError::Serialize(e.to_string()))?;
    let object = json.as_object().ok_or_else(|| SyncError::Serialize("expected a JSON object".to_string()))?;

    let mut hash = HashMap::with_capacity(object.len());
    for (key, val) in object {
        hash.insert(key.clone(), scalar_or_json(val));
    }
    Ok(hash)
}

fn from_hash<T: DeserializeOwned>(fields: HashMap<String, String>) -> Result<T, SyncError> {
    let mut object = Map::with_capacity(fields.len());
    for (key, raw) in fields {
        if raw.is_empty() {
            continue;
        }
        let value = serde_json::from_str::<Value>(&raw).unwrap_or(Value::String(raw));
        object.insert(key, value);
    }
    serde_json::from_value(Value::Object(object)).map_err(|e| SyncError::Deserialize(e.to_string()))
}

fn scalar_or_json(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
