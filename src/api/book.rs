//! Purpose: Hold client-side state for browsing and editing records.
//! Exports: `RecordBook`, `RecordForm`, `FormMode`, `Submission`, `SubmitOutcome`.
//! Role: Front ends (the console, tests) drive this instead of calling a transport
//!       directly; it works over any `RecordApi`.
//! Invariants: The snapshot is only replaced by a full list call, never patched.
//! Invariants: At most one submission is in flight per form.
//! Invariants: Local checks use the same rule table as the service.
use std::collections::HashSet;

use tracing::{debug, warn};

use super::RecordApi;
use super::view::{char_counter, render_table};
use crate::core::error::{Error, ErrorKind};
use crate::core::record::{ClientIdInput, Record, RecordDraft, RecordId, RecordInput, RecordPatch};
use crate::core::rules::{Field, FieldErrors, admits_partial, check_field, check_input};

pub const NETWORK_ERROR_MESSAGE: &str = "Network error - please check if the server is running";
pub const FETCH_FAILED_MESSAGE: &str = "Failed to fetch records";
pub const DELETE_FAILED_MESSAGE: &str = "Failed to delete record";
const SAVE_FAILED_MESSAGE: &str = "An error occurred";

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FormMode {
    Create,
    Edit(RecordId),
}

/// Request produced by a successful local check, waiting to be sent.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Submission {
    Create(RecordDraft),
    Update(RecordId, RecordPatch),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SubmitOutcome {
    Saved(Record),
    /// Local checks failed; see the form's field errors.
    Invalid,
    /// The service or transport refused; see the form's submit error.
    Failed(String),
    /// A submission is already in flight.
    Busy,
}

#[derive(Clone, Debug)]
pub struct RecordForm {
    mode: FormMode,
    values: [String; 4],
    errors: FieldErrors,
    submit_error: Option<String>,
    submitting: bool,
}

fn slot(field: Field) -> usize {
    match field {
        Field::ClientId => 0,
        Field::Name => 1,
        Field::Address => 2,
        Field::Bio => 3,
    }
}

impl Default for RecordForm {
    fn default() -> Self {
        Self::create()
    }
}

impl RecordForm {
    pub fn create() -> Self {
        Self {
            mode: FormMode::Create,
            values: Default::default(),
            errors: FieldErrors::new(),
            submit_error: None,
            submitting: false,
        }
    }

    pub fn edit(record: &Record) -> Self {
        Self {
            mode: FormMode::Edit(record.id.clone()),
            values: [
                record.client_id.to_string(),
                record.name.clone(),
                record.address.clone(),
                record.bio.clone(),
            ],
            errors: FieldErrors::new(),
            submit_error: None,
            submitting: false,
        }
    }

    pub fn mode(&self) -> &FormMode {
        &self.mode
    }

    pub fn title(&self) -> &'static str {
        match self.mode {
            FormMode::Create => "Create New Record",
            FormMode::Edit(_) => "Update Record",
        }
    }

    pub fn submit_label(&self) -> &'static str {
        match (&self.mode, self.submitting) {
            (FormMode::Create, false) => "Create Record",
            (FormMode::Create, true) => "Creating...",
            (FormMode::Edit(_), false) => "Update Record",
            (FormMode::Edit(_), true) => "Updating...",
        }
    }

    pub fn value(&self, field: Field) -> &str {
        &self.values[slot(field)]
    }

    pub fn error(&self, field: Field) -> Option<&str> {
        self.errors.get(field)
    }

    pub fn submit_error(&self) -> Option<&str> {
        self.submit_error.as_deref()
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn counter(&self, field: Field) -> Option<String> {
        char_counter(field, self.value(field))
    }

    /// Applies an edit to one field. Edits the field filter refuses (wrong
    /// characters, over the length cap) leave the value unchanged and return
    /// `false`.
    pub fn input(&mut self, field: Field, value: &str) -> bool {
        if !admits_partial(field, value) {
            return false;
        }
        self.values[slot(field)] = value.to_string();
        self.submit_error = None;
        match check_field(field, value) {
            Ok(()) => self.errors.remove(field),
            Err(message) => self.errors.insert(field, message),
        }
        true
    }

    /// Checks every field; on success returns the draft to send.
    pub fn validate_all(&mut self) -> Option<RecordDraft> {
        let input = RecordInput::from_values(
            Some(ClientIdInput::Text(self.value(Field::ClientId).to_string())),
            Some(self.value(Field::Name).to_string()),
            Some(self.value(Field::Address).to_string()),
            Some(self.value(Field::Bio).to_string()),
        );
        match check_input(&input) {
            Ok(draft) => {
                self.errors.clear();
                Some(draft)
            }
            Err(errors) => {
                self.errors = errors;
                None
            }
        }
    }
}

pub struct RecordBook<A> {
    api: A,
    records: Vec<Record>,
    list_error: Option<String>,
    form: RecordForm,
    expanded: HashSet<RecordId>,
}

impl<A: RecordApi> RecordBook<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            records: Vec::new(),
            list_error: None,
            form: RecordForm::create(),
            expanded: HashSet::new(),
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn record(&self, id: &RecordId) -> Option<&Record> {
        self.records.iter().find(|record| &record.id == id)
    }

    pub fn list_error(&self) -> Option<&str> {
        self.list_error.as_deref()
    }

    pub fn form(&self) -> &RecordForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut RecordForm {
        &mut self.form
    }

    /// Replaces the snapshot with a fresh list. On failure the previous
    /// snapshot is kept and the list error is set.
    pub fn refresh(&mut self) -> bool {
        match self.api.list_records() {
            Ok(records) => {
                self.expanded
                    .retain(|id| records.iter().any(|record| &record.id == id));
                self.records = records;
                self.list_error = None;
                true
            }
            Err(err) => {
                warn!(error = %err, "failed to fetch records");
                self.list_error = Some(FETCH_FAILED_MESSAGE.to_string());
                false
            }
        }
    }

    pub fn open_create(&mut self) {
        self.form = RecordForm::create();
    }

    /// Loads a record from the snapshot into the form. Returns `false` when the
    /// id is not in the snapshot.
    pub fn open_edit(&mut self, id: &RecordId) -> bool {
        match self.record(id) {
            Some(record) => {
                self.form = RecordForm::edit(record);
                true
            }
            None => false,
        }
    }

    pub fn cancel(&mut self) {
        self.open_create();
    }

    /// Runs local checks and marks the form in flight.
    pub fn begin_submit(&mut self) -> Result<Submission, SubmitOutcome> {
        if self.form.submitting {
            return Err(SubmitOutcome::Busy);
        }
        self.form.submit_error = None;
        let Some(draft) = self.form.validate_all() else {
            return Err(SubmitOutcome::Invalid);
        };
        self.form.submitting = true;
        Ok(match &self.form.mode {
            FormMode::Create => Submission::Create(draft),
            FormMode::Edit(id) => Submission::Update(id.clone(), RecordPatch::from(draft)),
        })
    }

    pub fn send(&self, submission: &Submission) -> Result<Record, Error> {
        match submission {
            Submission::Create(draft) => self.api.create_record(draft),
            Submission::Update(id, patch) => self.api.update_record(id, patch),
        }
    }

    /// Clears the in-flight flag and applies the result. Success resets the form
    /// and refreshes the list.
    pub fn complete_submit(&mut self, result: Result<Record, Error>) -> SubmitOutcome {
        self.form.submitting = false;
        match result {
            Ok(record) => {
                debug!(id = %record.id, "record saved");
                self.form = RecordForm::create();
                self.refresh();
                SubmitOutcome::Saved(record)
            }
            Err(err) => {
                let message = failure_message(&err);
                if let Some(fields) = err.fields() {
                    for (field, text) in fields.iter() {
                        self.form.errors.insert(field, text);
                    }
                }
                self.form.submit_error = Some(message.clone());
                SubmitOutcome::Failed(message)
            }
        }
    }

    pub fn submit(&mut self) -> SubmitOutcome {
        match self.begin_submit() {
            Ok(submission) => {
                let result = self.send(&submission);
                self.complete_submit(result)
            }
            Err(outcome) => outcome,
        }
    }

    /// Deletes and refreshes. A record open in the form is dropped from it.
    pub fn delete(&mut self, id: &RecordId) -> bool {
        match self.api.delete_record(id) {
            Ok(()) => {
                if self.form.mode == FormMode::Edit(id.clone()) {
                    self.form = RecordForm::create();
                }
                self.expanded.remove(id);
                self.refresh();
                true
            }
            Err(err) => {
                warn!(%id, error = %err, "failed to delete record");
                self.list_error = Some(DELETE_FAILED_MESSAGE.to_string());
                false
            }
        }
    }

    /// Flips the bio between preview and full text; returns the new state.
    pub fn toggle_bio(&mut self, id: &RecordId) -> bool {
        if self.expanded.remove(id) {
            false
        } else {
            self.expanded.insert(id.clone());
            true
        }
    }

    pub fn is_expanded(&self, id: &RecordId) -> bool {
        self.expanded.contains(id)
    }

    pub fn render(&self) -> String {
        render_table(&self.records, &self.expanded)
    }
}

/// Text shown for a failed submission.
pub fn failure_message(err: &Error) -> String {
    match err.kind() {
        ErrorKind::Network | ErrorKind::Timeout => NETWORK_ERROR_MESSAGE.to_string(),
        _ => match (err.message(), err.detail()) {
            (Some(message), Some(detail)) => format!("{message}: {detail}"),
            (Some(message), None) => message.to_string(),
            (None, _) => SAVE_FAILED_MESSAGE.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DELETE_FAILED_MESSAGE, FETCH_FAILED_MESSAGE, FormMode, NETWORK_ERROR_MESSAGE, RecordBook,
        SubmitOutcome,
    };
    use crate::api::{ApiResult, RecordApi, RecordService};
    use crate::core::error::{Error, ErrorKind};
    use crate::core::record::{Record, RecordDraft, RecordId, RecordPatch};
    use crate::core::rules::{DUPLICATE_CLIENT_ID, Field};
    use crate::core::store::MemoryStore;
    use std::sync::Arc;

    fn book() -> RecordBook<RecordService> {
        RecordBook::new(RecordService::new(Arc::new(MemoryStore::new())))
    }

    fn fill(book: &mut RecordBook<RecordService>, client_id: &str, name: &str) {
        let form = book.form_mut();
        assert!(form.input(Field::ClientId, client_id));
        assert!(form.input(Field::Name, name));
        assert!(form.input(Field::Address, "1 Main St"));
        assert!(form.input(Field::Bio, "Engineer"));
    }

    #[test]
    fn create_submits_and_refreshes() {
        let mut book = book();
        assert_eq!(book.form().title(), "Create New Record");
        fill(&mut book, "1", "Ann Lee");
        let SubmitOutcome::Saved(record) = book.submit() else {
            panic!("expected save");
        };
        assert_eq!(book.records(), &[record]);
        assert_eq!(book.form().value(Field::Name), "");
        assert_eq!(book.form().mode(), &FormMode::Create);
    }

    #[test]
    fn input_filter_refuses_bad_keystrokes() {
        let mut book = book();
        let form = book.form_mut();
        assert!(form.input(Field::Name, "Ann"));
        assert!(!form.input(Field::Name, "Ann1"));
        assert_eq!(form.value(Field::Name), "Ann");
        assert!(!form.input(Field::ClientId, "10001"));
        assert!(!form.input(Field::Bio, &"a".repeat(121)));
        assert_eq!(form.counter(Field::Name).as_deref(), Some("3/20"));
    }

    #[test]
    fn local_check_blocks_incomplete_form() {
        let mut book = book();
        book.form_mut().input(Field::Name, "Ann");
        assert_eq!(book.submit(), SubmitOutcome::Invalid);
        assert_eq!(book.form().error(Field::Bio), Some("Bio is required"));
        assert!(book.records().is_empty());
    }

    #[test]
    fn duplicate_is_reported_verbatim() {
        let mut book = book();
        fill(&mut book, "1", "Ann Lee");
        book.submit();
        fill(&mut book, "1", "Bo");
        let outcome = book.submit();
        assert_eq!(
            outcome,
            SubmitOutcome::Failed(format!("Validation Error: {DUPLICATE_CLIENT_ID}"))
        );
        assert_eq!(book.form().error(Field::ClientId), Some(DUPLICATE_CLIENT_ID));
        assert_eq!(book.records().len(), 1);
        assert!(!book.form().is_submitting());
    }

    #[test]
    fn second_submit_while_in_flight_is_refused() {
        let mut book = book();
        fill(&mut book, "1", "Ann Lee");
        let submission = book.begin_submit().expect("submission");
        assert_eq!(book.form().submit_label(), "Creating...");
        assert_eq!(book.submit(), SubmitOutcome::Busy);
        let result = book.send(&submission);
        assert!(matches!(book.complete_submit(result), SubmitOutcome::Saved(_)));
        assert_eq!(book.records().len(), 1);
    }

    #[test]
    fn edit_updates_and_cancel_restores_create_mode() {
        let mut book = book();
        fill(&mut book, "1", "Ann Lee");
        let SubmitOutcome::Saved(ann) = book.submit() else {
            panic!("expected save");
        };
        assert!(book.open_edit(&ann.id));
        assert_eq!(book.form().title(), "Update Record");
        assert_eq!(book.form().value(Field::ClientId), "1");
        book.form_mut().input(Field::Bio, "Manager");
        let SubmitOutcome::Saved(updated) = book.submit() else {
            panic!("expected save");
        };
        assert_eq!(updated.id, ann.id);
        assert_eq!(book.records()[0].bio, "Manager");

        assert!(book.open_edit(&ann.id));
        book.cancel();
        assert_eq!(book.form().mode(), &FormMode::Create);
        assert!(!book.open_edit(&RecordId::new("missing")));
    }

    #[test]
    fn delete_removes_and_reports_failure() {
        let mut book = book();
        fill(&mut book, "1", "Ann Lee");
        let SubmitOutcome::Saved(ann) = book.submit() else {
            panic!("expected save");
        };
        book.open_edit(&ann.id);
        assert!(book.delete(&ann.id));
        assert!(book.records().is_empty());
        assert_eq!(book.form().mode(), &FormMode::Create);
        assert!(!book.delete(&ann.id));
        assert_eq!(book.list_error(), Some(DELETE_FAILED_MESSAGE));
    }

    #[test]
    fn toggle_bio_flips_state() {
        let mut book = book();
        let id = RecordId::new("a");
        assert!(book.toggle_bio(&id));
        assert!(book.is_expanded(&id));
        assert!(!book.toggle_bio(&id));
    }

    struct Offline;

    impl RecordApi for Offline {
        fn list_records(&self) -> ApiResult<Vec<Record>> {
            Err(Error::new(ErrorKind::Network))
        }
        fn create_record(&self, _draft: &RecordDraft) -> ApiResult<Record> {
            Err(Error::new(ErrorKind::Timeout))
        }
        fn update_record(&self, _id: &RecordId, _patch: &RecordPatch) -> ApiResult<Record> {
            Err(Error::new(ErrorKind::Network))
        }
        fn delete_record(&self, _id: &RecordId) -> ApiResult<()> {
            Err(Error::new(ErrorKind::Network))
        }
    }

    #[test]
    fn transport_failures_use_network_message() {
        let mut book = RecordBook::new(Offline);
        assert!(!book.refresh());
        assert_eq!(book.list_error(), Some(FETCH_FAILED_MESSAGE));
        let form = book.form_mut();
        form.input(Field::ClientId, "3");
        form.input(Field::Name, "Ann");
        form.input(Field::Address, "x");
        form.input(Field::Bio, "y");
        assert_eq!(
            book.submit(),
            SubmitOutcome::Failed(NETWORK_ERROR_MESSAGE.to_string())
        );
        assert_eq!(book.form().submit_error(), Some(NETWORK_ERROR_MESSAGE));
    }
}
