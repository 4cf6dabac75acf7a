//! Purpose: Define the public Rust API boundary for clientbook.
//! Exports: Record types, the service, the HTTP client, and the record book.
//! Role: Public surface shared by the CLI, the server, the console, and tests.
//! Invariants: `RecordApi` is the only seam between the book and a transport.
//! Invariants: Internal modules remain private and are re-exported selectively.

mod book;
mod remote;
mod service;
mod view;

pub use crate::core::error::{Error, ErrorKind, to_exit_code};
pub use crate::core::record::{
    ClientId, ClientIdInput, Record, RecordDraft, RecordId, RecordInput, RecordPatch,
};
pub use crate::core::rules::{Field, FieldErrors};
pub use crate::core::store::{FileStore, MemoryStore, RecordStore};
pub use book::{
    DELETE_FAILED_MESSAGE, FETCH_FAILED_MESSAGE, FormMode, NETWORK_ERROR_MESSAGE, RecordBook,
    RecordForm, Submission, SubmitOutcome, failure_message,
};
pub use remote::{DEFAULT_TIMEOUT, RemoteClient};
pub use service::{NOT_FOUND_MESSAGE, RecordService};
pub use view::{BioView, NO_RECORDS, bio_view, char_counter, render_table};

pub type ApiResult<T> = Result<T, Error>;

/// Record operations as seen by a client, whether it talks to a server over
/// HTTP or to a service in the same process.
pub trait RecordApi {
    fn list_records(&self) -> ApiResult<Vec<Record>>;

    fn create_record(&self, draft: &RecordDraft) -> ApiResult<Record>;

    fn update_record(&self, id: &RecordId, patch: &RecordPatch) -> ApiResult<Record>;

    fn delete_record(&self, id: &RecordId) -> ApiResult<()>;
}

impl<T: RecordApi + ?Sized> RecordApi for &T {
    fn list_records(&self) -> ApiResult<Vec<Record>> {
        (**self).list_records()
    }

    fn create_record(&self, draft: &RecordDraft) -> ApiResult<Record> {
        (**self).create_record(draft)
    }

    fn update_record(&self, id: &RecordId, patch: &RecordPatch) -> ApiResult<Record> {
        (**self).update_record(id, patch)
    }

    fn delete_record(&self, id: &RecordId) -> ApiResult<()> {
        (**self).delete_record(id)
    }
}
