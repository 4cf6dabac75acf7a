// Record entity, candidate inputs, and identifiers.
use std::fmt::{self, Write as _};

use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

use crate::core::error::{Error, ErrorKind};

const RECORD_ID_BYTES: usize = 12;

/// Opaque store-assigned identifier (24 lowercase hex characters).
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn generate() -> Result<Self, Error> {
        let mut bytes = [0u8; RECORD_ID_BYTES];
        getrandom::fill(&mut bytes).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to generate record id")
                .with_detail(err.to_string())
        })?;
        let mut out = String::with_capacity(RECORD_ID_BYTES * 2);
        for byte in bytes {
            let _ = write!(out, "{byte:02x}");
        }
        Ok(Self(out))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(u32);

impl ClientId {
    /// Wraps a raw value without range checks; use `rules::parse_client_id`
    /// or `rules::check_client_id` for untrusted input.
    pub const fn new_unchecked(value: u32) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored client record.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: RecordId,
    pub client_id: ClientId,
    pub name: String,
    pub address: String,
    pub bio: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Record {
    pub fn draft(&self) -> RecordDraft {
        RecordDraft {
            client_id: self.client_id,
            name: self.name.clone(),
            address: self.address.clone(),
            bio: self.bio.clone(),
        }
    }

    /// Overwrites every mutable field with `patch` values that are present.
    pub fn apply(&mut self, patch: &RecordPatch) {
        if let Some(client_id) = patch.client_id {
            self.client_id = client_id;
        }
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(address) = &patch.address {
            self.address = address.clone();
        }
        if let Some(bio) = &patch.bio {
            self.bio = bio.clone();
        }
    }
}

/// A fully validated candidate record (no id, no timestamps).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDraft {
    pub client_id: ClientId,
    pub name: String,
    pub address: String,
    pub bio: String,
}

/// Validated subset of mutable fields supplied to an update.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ClientId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        self.client_id.is_none() && self.name.is_none() && self.address.is_none() && self.bio.is_none()
    }
}

impl From<RecordDraft> for RecordPatch {
    fn from(draft: RecordDraft) -> Self {
        Self {
            client_id: Some(draft.client_id),
            name: Some(draft.name),
            address: Some(draft.address),
            bio: Some(draft.bio),
        }
    }
}

/// Untrusted request body as it arrives on the wire. Each field is
/// `None` when absent and `Some(None)` when sent as JSON `null`; `clientId`
/// may be a JSON number or a numeric string.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordInput {
    #[serde(default, deserialize_with = "present")]
    pub client_id: Option<Option<ClientIdInput>>,
    #[serde(default, deserialize_with = "present")]
    pub name: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub address: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub bio: Option<Option<String>>,
}

impl RecordInput {
    /// Input where every supplied field carries a value.
    pub fn from_values(
        client_id: Option<ClientIdInput>,
        name: Option<String>,
        address: Option<String>,
        bio: Option<String>,
    ) -> Self {
        Self {
            client_id: client_id.map(Some),
            name: name.map(Some),
            address: address.map(Some),
            bio: bio.map(Some),
        }
    }
}

// Only runs for keys that are present, so a `null` lands as `Some(None)`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum ClientIdInput {
    Number(serde_json::Number),
    Text(String),
    Other(serde_json::Value),
}

#[cfg(test)]
mod tests {
    use super::{ClientIdInput, RecordId, RecordInput};

    #[test]
    fn generated_ids_are_hex_and_distinct() {
        let a = RecordId::generate().expect("id");
        let b = RecordId::generate().expect("id");
        assert_eq!(a.as_str().len(), 24);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn input_accepts_number_or_string_client_id() {
        let numeric: RecordInput = serde_json::from_str(r#"{"clientId": 7}"#).expect("json");
        assert!(matches!(numeric.client_id, Some(Some(ClientIdInput::Number(_)))));

        let text: RecordInput = serde_json::from_str(r#"{"clientId": "7"}"#).expect("json");
        assert!(matches!(text.client_id, Some(Some(ClientIdInput::Text(_)))));

        let other: RecordInput = serde_json::from_str(r#"{"clientId": [7]}"#).expect("json");
        assert!(matches!(other.client_id, Some(Some(ClientIdInput::Other(_)))));
    }

    #[test]
    fn null_fields_are_distinct_from_absent_ones() {
        let input: RecordInput =
            serde_json::from_str(r#"{"clientId": null, "name": null}"#).expect("json");
        assert!(matches!(input.client_id, Some(None)));
        assert_eq!(input.name, Some(None));
        assert!(input.address.is_none());
        assert!(input.bio.is_none());
    }
}
