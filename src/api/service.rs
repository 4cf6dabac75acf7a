//! Purpose: Implement the record service operations over an injected store.
//! Exports: `RecordService`.
//! Role: The single authority for validation and clientId uniqueness; the HTTP
//!       server and in-process callers both go through it.
//! Invariants: Every store failure leaves here as Validation, NotFound, or a
//!       server-class kind; Conflict never escapes unshaped.
//! Invariants: The clientId pre-check is a fast path; the store write decides.
#![allow(clippy::result_large_err)]

use std::sync::Arc;

use tracing::{debug, error, warn};

use super::{ApiResult, RecordApi};
use crate::core::error::{Error, ErrorKind};
use crate::core::record::{ClientId, Record, RecordDraft, RecordId, RecordInput, RecordPatch};
use crate::core::rules::{self, check_draft, check_input, check_patch, duplicate_client_id_error};
use crate::core::store::RecordStore;

pub const NOT_FOUND_MESSAGE: &str = "Record not found";

#[derive(Clone)]
pub struct RecordService {
    store: Arc<dyn RecordStore>,
}

impl RecordService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub fn describe_store(&self) -> String {
        self.store.describe()
    }

    pub fn list(&self) -> ApiResult<Vec<Record>> {
        self.store.list().map_err(|err| shape_store_error("list", err))
    }

    pub fn get(&self, id: &RecordId) -> ApiResult<Record> {
        self.store
            .get(id)
            .map_err(|err| shape_store_error("get", err))?
            .ok_or_else(not_found)
    }

    /// Validates an untrusted body and creates the record.
    pub fn create(&self, input: &RecordInput) -> ApiResult<Record> {
        let draft = check_input(input).map_err(|errors| {
            debug!(errors = %errors.summary(), "create rejected by validation");
            errors.into_error()
        })?;
        self.insert(draft)
    }

    /// Creates from an already-typed draft; the draft is still checked.
    pub fn create_draft(&self, draft: RecordDraft) -> ApiResult<Record> {
        check_draft(&draft).map_err(|errors| errors.into_error())?;
        self.insert(draft)
    }

    fn insert(&self, draft: RecordDraft) -> ApiResult<Record> {
        let existing = self
            .store
            .find_by_client_id(draft.client_id)
            .map_err(|err| shape_store_error("create", err))?;
        if existing.is_some() {
            debug!(client_id = %draft.client_id, "create rejected by duplicate pre-check");
            return Err(duplicate_client_id_error());
        }
        let record = self
            .store
            .insert(draft)
            .map_err(|err| shape_store_error("create", err))?;
        debug!(id = %record.id, client_id = %record.client_id, "record created");
        Ok(record)
    }

    /// Validates the supplied subset of fields and merges it into `id`.
    pub fn update(&self, id: &RecordId, input: &RecordInput) -> ApiResult<Record> {
        let patch = check_patch(input).map_err(|errors| {
            debug!(%id, errors = %errors.summary(), "update rejected by validation");
            errors.into_error()
        })?;
        self.update_patch(id, patch)
    }

    pub fn update_patch(&self, id: &RecordId, patch: RecordPatch) -> ApiResult<Record> {
        let existing = self.get(id)?;
        let mut merged = existing.clone();
        merged.apply(&patch);
        check_draft(&merged.draft()).map_err(|errors| errors.into_error())?;

        if let Some(client_id) = patch.client_id {
            if client_id != existing.client_id && !self.client_id_available(client_id, Some(id))? {
                debug!(%id, %client_id, "update rejected by duplicate pre-check");
                return Err(duplicate_client_id_error());
            }
        }

        let updated = self
            .store
            .update(id, &patch)
            .map_err(|err| shape_store_error("update", err))?
            .ok_or_else(not_found)?;
        debug!(%id, "record updated");
        Ok(updated)
    }

    /// Removes `id` permanently and returns what was removed.
    pub fn delete(&self, id: &RecordId) -> ApiResult<Record> {
        let removed = self
            .store
            .delete(id)
            .map_err(|err| shape_store_error("delete", err))?
            .ok_or_else(not_found)?;
        debug!(%id, client_id = %removed.client_id, "record deleted");
        Ok(removed)
    }

    /// Whether `client_id` is free, ignoring the record `exclude` (if any).
    pub fn client_id_available(
        &self,
        client_id: ClientId,
        exclude: Option<&RecordId>,
    ) -> ApiResult<bool> {
        let holder = self
            .store
            .find_by_client_id(client_id)
            .map_err(|err| shape_store_error("check client id", err))?;
        Ok(match holder {
            Some(record) => exclude.is_some_and(|id| &record.id == id),
            None => true,
        })
    }

    /// Parses a path-supplied client id with the shared rules.
    pub fn parse_client_id(&self, raw: &str) -> ApiResult<ClientId> {
        rules::parse_client_id(raw).map_err(|message| {
            let mut errors = rules::FieldErrors::new();
            errors.insert(rules::Field::ClientId, message);
            errors.into_error()
        })
    }
}

impl RecordApi for RecordService {
    fn list_records(&self) -> ApiResult<Vec<Record>> {
        self.list()
    }

    fn create_record(&self, draft: &RecordDraft) -> ApiResult<Record> {
        self.create_draft(draft.clone())
    }

    fn update_record(&self, id: &RecordId, patch: &RecordPatch) -> ApiResult<Record> {
        self.update_patch(id, patch.clone())
    }

    fn delete_record(&self, id: &RecordId) -> ApiResult<()> {
        self.delete(id).map(|_| ())
    }
}

fn not_found() -> Error {
    Error::new(ErrorKind::NotFound).with_message(NOT_FOUND_MESSAGE)
}

fn shape_store_error(operation: &str, err: Error) -> Error {
    match err.kind() {
        ErrorKind::Conflict => {
            warn!(operation, detail = ?err.detail(), "store rejected duplicate clientId");
            duplicate_client_id_error()
        }
        ErrorKind::Unavailable | ErrorKind::Corrupt | ErrorKind::Io | ErrorKind::Internal => {
            error!(operation, error = %err, "store operation failed");
            err
        }
        _ => {
            error!(operation, error = %err, "unexpected store error");
            Error::new(ErrorKind::Internal)
                .with_message("unexpected store error")
                .with_source(err)
        }
    }
}
