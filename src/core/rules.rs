//! Purpose: Hold the one canonical rule set for well-formed records.
//! Exports: `Field`, `FieldRule`, `FieldErrors`, `RULES`, and the check/filter functions.
//! Role: Consumed by the record service before persistence and by the client form
//!       before submission, so both sides reject exactly the same input.
//! Invariants: Rules are data; adding a limit means editing `RULES`, not call sites.
//! Invariants: Lengths count Unicode scalar values.
//! Invariants: Checks are pure and never touch the store.

use std::collections::BTreeMap;
use std::fmt;

use crate::core::error::{Error, ErrorKind};
use crate::core::record::{ClientId, ClientIdInput, RecordDraft, RecordInput, RecordPatch};

pub const CLIENT_ID_MIN: u32 = 1;
pub const CLIENT_ID_MAX: u32 = 10_000;

pub const VALIDATION_MESSAGE: &str = "Validation Error";
pub const DUPLICATE_CLIENT_ID: &str = "Client ID already exists. Please use a different Client ID.";
pub const CLIENT_ID_REQUIRED: &str = "Client ID is required";
pub const CLIENT_ID_RANGE: &str = "Client ID must be a number between 1 and 10000";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Field {
    ClientId,
    Name,
    Address,
    Bio,
}

impl Field {
    pub const ALL: [Field; 4] = [Field::ClientId, Field::Name, Field::Address, Field::Bio];

    /// Wire name, as used in JSON bodies and error maps.
    pub fn as_str(self) -> &'static str {
        match self {
            Field::ClientId => "clientId",
            Field::Name => "name",
            Field::Address => "address",
            Field::Bio => "bio",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Field::ClientId => "Client ID",
            Field::Name => "Name",
            Field::Address => "Address",
            Field::Bio => "Bio",
        }
    }

    pub fn parse(value: &str) -> Option<Field> {
        Field::ALL
            .into_iter()
            .find(|field| field.as_str().eq_ignore_ascii_case(value))
    }

    /// Text rule for this field; `None` for `ClientId`, which is numeric.
    pub fn rule(self) -> Option<&'static FieldRule> {
        RULES.iter().find(|rule| rule.field == self)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Charset {
    Any,
    LettersAndSpaces,
}

impl Charset {
    pub fn allows(self, c: char) -> bool {
        match self {
            Charset::Any => true,
            Charset::LettersAndSpaces => c.is_ascii_alphabetic() || c.is_whitespace(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FieldRule {
    pub field: Field,
    pub max_chars: usize,
    pub charset: Charset,
    pub required: &'static str,
    pub too_long: &'static str,
    pub bad_chars: &'static str,
}

pub const RULES: [FieldRule; 3] = [
    FieldRule {
        field: Field::Name,
        max_chars: 20,
        charset: Charset::LettersAndSpaces,
        required: "Name is required",
        too_long: "Name cannot be more than 20 characters",
        bad_chars: "Name can only contain alphabets and spaces",
    },
    FieldRule {
        field: Field::Address,
        max_chars: 40,
        charset: Charset::Any,
        required: "Address is required",
        too_long: "Address cannot be more than 40 characters",
        bad_chars: "",
    },
    FieldRule {
        field: Field::Bio,
        max_chars: 120,
        charset: Charset::Any,
        required: "Bio is required",
        too_long: "Bio cannot be more than 120 characters",
        bad_chars: "",
    },
];

impl FieldRule {
    pub fn check(&self, value: &str) -> Result<(), &'static str> {
        if value.is_empty() {
            return Err(self.required);
        }
        if !value.chars().all(|c| self.charset.allows(c)) {
            return Err(self.bad_chars);
        }
        if value.chars().count() > self.max_chars {
            return Err(self.too_long);
        }
        Ok(())
    }

    /// Whether a partially typed value may be kept in the form. Empty is fine
    /// while typing; the submit-time check reports it as required.
    pub fn admits_partial(&self, value: &str) -> bool {
        value.chars().count() <= self.max_chars && value.chars().all(|c| self.charset.allows(c))
    }
}

/// Field-keyed violation messages, ordered by field.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FieldErrors(BTreeMap<Field, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: Field, message: impl Into<String>) {
        self.0.insert(field, message.into());
    }

    pub fn remove(&mut self, field: Field) {
        self.0.remove(&field);
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
        self.0.iter().map(|(field, message)| (*field, message.as_str()))
    }

    /// `field: message` pairs joined for a single-line summary.
    pub fn summary(&self) -> String {
        self.iter()
            .map(|(field, message)| format!("{field}: {message}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn into_error(self) -> Error {
        Error::new(ErrorKind::Validation)
            .with_message(VALIDATION_MESSAGE)
            .with_detail(self.summary())
            .with_fields(self)
    }
}

/// Error returned whenever a `clientId` collides, whether caught by the
/// pre-check or by the store constraint.
pub fn duplicate_client_id_error() -> Error {
    let mut fields = FieldErrors::new();
    fields.insert(Field::ClientId, DUPLICATE_CLIENT_ID);
    Error::new(ErrorKind::Validation)
        .with_message(VALIDATION_MESSAGE)
        .with_detail(DUPLICATE_CLIENT_ID)
        .with_fields(fields)
}

pub fn check_client_id(value: i64) -> Result<ClientId, &'static str> {
    if value < i64::from(CLIENT_ID_MIN) || value > i64::from(CLIENT_ID_MAX) {
        return Err(CLIENT_ID_RANGE);
    }
    u32::try_from(value)
        .map(ClientId::new_unchecked)
        .map_err(|_| CLIENT_ID_RANGE)
}

/// Parses typed or form text into a client id. Integral decimals such as
/// `"12.0"` are accepted.
pub fn parse_client_id(text: &str) -> Result<ClientId, &'static str> {
    let text = text.trim();
    if text.is_empty() {
        return Err(CLIENT_ID_REQUIRED);
    }
    if let Ok(value) = text.parse::<i64>() {
        return check_client_id(value);
    }
    match text.parse::<f64>() {
        Ok(value) => integral(value).map_or(Err(CLIENT_ID_RANGE), check_client_id),
        Err(_) => Err(CLIENT_ID_RANGE),
    }
}

fn integral(value: f64) -> Option<i64> {
    if !value.is_finite() || value.fract() != 0.0 || value.abs() > 1e15 {
        return None;
    }
    Some(value as i64)
}

fn client_id_from_input(input: &ClientIdInput) -> Result<ClientId, &'static str> {
    match input {
        ClientIdInput::Number(number) => {
            if let Some(value) = number.as_i64() {
                check_client_id(value)
            } else {
                number
                    .as_f64()
                    .and_then(integral)
                    .map_or(Err(CLIENT_ID_RANGE), check_client_id)
            }
        }
        ClientIdInput::Text(text) => parse_client_id(text),
        ClientIdInput::Other(_) => Err(CLIENT_ID_RANGE),
    }
}

fn check_text(field: Field, value: Option<&str>, errors: &mut FieldErrors) -> Option<String> {
    let rule = field.rule()?;
    match rule.check(value.unwrap_or_default()) {
        Ok(()) => value.map(str::to_string),
        Err(message) => {
            errors.insert(field, message);
            None
        }
    }
}

/// Validates a full candidate record. Missing fields are reported as required.
pub fn check_input(input: &RecordInput) -> Result<RecordDraft, FieldErrors> {
    let mut errors = FieldErrors::new();
    let client_id = match input.client_id.as_ref().and_then(Option::as_ref) {
        Some(value) => client_id_from_input(value)
            .map_err(|message| errors.insert(Field::ClientId, message))
            .ok(),
        None => {
            errors.insert(Field::ClientId, CLIENT_ID_REQUIRED);
            None
        }
    };
    let name = check_text(Field::Name, supplied(&input.name), &mut errors);
    let address = check_text(Field::Address, supplied(&input.address), &mut errors);
    let bio = check_text(Field::Bio, supplied(&input.bio), &mut errors);

    match (client_id, name, address, bio) {
        (Some(client_id), Some(name), Some(address), Some(bio)) if errors.is_empty() => {
            Ok(RecordDraft {
                client_id,
                name,
                address,
                bio,
            })
        }
        _ => Err(errors),
    }
}

fn supplied(value: &Option<Option<String>>) -> Option<&str> {
    value.as_ref().and_then(Option::as_deref)
}

/// Validates only the fields present in an update body. A field sent as
/// `null` is present and fails as required.
pub fn check_patch(input: &RecordInput) -> Result<RecordPatch, FieldErrors> {
    let mut errors = FieldErrors::new();
    let mut patch = RecordPatch::default();
    match input.client_id.as_ref() {
        Some(Some(value)) => match client_id_from_input(value) {
            Ok(client_id) => patch.client_id = Some(client_id),
            Err(message) => errors.insert(Field::ClientId, message),
        },
        Some(None) => errors.insert(Field::ClientId, CLIENT_ID_REQUIRED),
        None => {}
    }
    if input.name.is_some() {
        patch.name = check_text(Field::Name, supplied(&input.name), &mut errors);
    }
    if input.address.is_some() {
        patch.address = check_text(Field::Address, supplied(&input.address), &mut errors);
    }
    if input.bio.is_some() {
        patch.bio = check_text(Field::Bio, supplied(&input.bio), &mut errors);
    }
    if errors.is_empty() {
        Ok(patch)
    } else {
        Err(errors)
    }
}

/// Re-checks a draft built in-process (e.g. from a form) against the same rules.
pub fn check_draft(draft: &RecordDraft) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    if let Err(message) = check_client_id(i64::from(draft.client_id.get())) {
        errors.insert(Field::ClientId, message);
    }
    check_text(Field::Name, Some(&draft.name), &mut errors);
    check_text(Field::Address, Some(&draft.address), &mut errors);
    check_text(Field::Bio, Some(&draft.bio), &mut errors);
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Whether a keystroke-level edit may replace the current form value.
pub fn admits_partial(field: Field, value: &str) -> bool {
    match field {
        Field::ClientId => {
            if !value.chars().all(|c| c.is_ascii_digit()) {
                return false;
            }
            value.is_empty()
                || value
                    .parse::<u64>()
                    .map(|v| v <= u64::from(CLIENT_ID_MAX))
                    .unwrap_or(false)
        }
        _ => field.rule().is_some_and(|rule| rule.admits_partial(value)),
    }
}

/// Single-field check used by the form as values change.
pub fn check_field(field: Field, value: &str) -> Result<(), &'static str> {
    match field {
        Field::ClientId => parse_client_id(value).map(|_| ()),
        _ => match field.rule() {
            Some(rule) => rule.check(value),
            None => Ok(()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::RecordInput;

    fn input(client_id: serde_json::Value, name: &str, address: &str, bio: &str) -> RecordInput {
        serde_json::from_value(serde_json::json!({
            "clientId": client_id,
            "name": name,
            "address": address,
            "bio": bio,
        }))
        .expect("input")
    }

    #[test]
    fn accepts_well_formed_record() {
        let draft = check_input(&input(1.into(), "Ann Lee", "1 Main St", "Engineer"))
            .expect("valid");
        assert_eq!(draft.client_id.get(), 1);
        assert_eq!(draft.name, "Ann Lee");
    }

    #[test]
    fn client_id_bounds_are_inclusive() {
        assert!(parse_client_id("1").is_ok());
        assert!(parse_client_id("10000").is_ok());
        assert_eq!(parse_client_id("0"), Err(CLIENT_ID_RANGE));
        assert_eq!(parse_client_id("10001"), Err(CLIENT_ID_RANGE));
        assert_eq!(parse_client_id("-3"), Err(CLIENT_ID_RANGE));
        assert_eq!(parse_client_id("1.5"), Err(CLIENT_ID_RANGE));
        assert_eq!(parse_client_id("abc"), Err(CLIENT_ID_RANGE));
        assert_eq!(parse_client_id("  "), Err(CLIENT_ID_REQUIRED));
        assert_eq!(parse_client_id("12.0").map(ClientId::get), Ok(12));
    }

    #[test]
    fn numeric_string_client_id_is_accepted() {
        let draft = check_input(&input("42".into(), "Bo", "x", "y")).expect("valid");
        assert_eq!(draft.client_id.get(), 42);
    }

    #[test]
    fn name_rejects_digits_and_punctuation() {
        let errors = check_input(&input(1.into(), "Ann L33", "a", "b")).expect_err("invalid");
        assert_eq!(
            errors.get(Field::Name),
            Some("Name can only contain alphabets and spaces")
        );
        let errors = check_input(&input(1.into(), "O'Hara", "a", "b")).expect_err("invalid");
        assert!(errors.get(Field::Name).is_some());
    }

    #[test]
    fn length_limits_match_rule_table() {
        let long_name = "a".repeat(21);
        let long_address = "a".repeat(41);
        let long_bio = "a".repeat(121);
        let errors = check_input(&input(1.into(), &long_name, &long_address, &long_bio))
            .expect_err("invalid");
        assert_eq!(errors.len(), 3);
        assert_eq!(
            errors.get(Field::Bio),
            Some("Bio cannot be more than 120 characters")
        );

        let at_limit = check_input(&input(
            1.into(),
            &"a".repeat(20),
            &"a".repeat(40),
            &"a".repeat(120),
        ));
        assert!(at_limit.is_ok());
    }

    #[test]
    fn missing_fields_are_reported_as_required() {
        let errors = check_input(&RecordInput::default()).expect_err("invalid");
        assert_eq!(errors.get(Field::ClientId), Some(CLIENT_ID_REQUIRED));
        assert_eq!(errors.get(Field::Name), Some("Name is required"));
        assert_eq!(errors.get(Field::Address), Some("Address is required"));
        assert_eq!(errors.get(Field::Bio), Some("Bio is required"));
    }

    #[test]
    fn patch_checks_only_present_fields() {
        let body: RecordInput = serde_json::from_str(r#"{"name": "Ann L33"}"#).expect("json");
        let errors = check_patch(&body).expect_err("invalid");
        assert_eq!(errors.len(), 1);

        let body: RecordInput = serde_json::from_str(r#"{"bio": "Pilot"}"#).expect("json");
        let patch = check_patch(&body).expect("valid");
        assert_eq!(patch.bio.as_deref(), Some("Pilot"));
        assert!(patch.name.is_none());
    }

    #[test]
    fn patch_rejects_explicit_nulls_as_required() {
        let body: RecordInput =
            serde_json::from_str(r#"{"clientId": null, "name": null, "bio": null}"#)
                .expect("json");
        let errors = check_patch(&body).expect_err("invalid");
        assert_eq!(errors.get(Field::ClientId), Some(CLIENT_ID_REQUIRED));
        assert_eq!(errors.get(Field::Name), Some("Name is required"));
        assert_eq!(errors.get(Field::Bio), Some("Bio is required"));
        assert_eq!(errors.get(Field::Address), None);
    }

    #[test]
    fn partial_edits_follow_form_filtering() {
        assert!(admits_partial(Field::ClientId, ""));
        assert!(admits_partial(Field::ClientId, "10000"));
        assert!(!admits_partial(Field::ClientId, "10001"));
        assert!(!admits_partial(Field::ClientId, "12a"));
        assert!(admits_partial(Field::Name, ""));
        assert!(!admits_partial(Field::Name, "Ann1"));
        assert!(!admits_partial(Field::Address, &"a".repeat(41)));
        assert!(admits_partial(Field::Bio, &"a".repeat(120)));
        assert!(!admits_partial(Field::Bio, &"a".repeat(121)));
    }

    #[test]
    fn summary_lists_field_and_message() {
        let mut errors = FieldErrors::new();
        errors.insert(Field::Name, "Name is required");
        errors.insert(Field::ClientId, CLIENT_ID_RANGE);
        assert_eq!(
            errors.summary(),
            "clientId: Client ID must be a number between 1 and 10000, name: Name is required"
        );
    }
}
