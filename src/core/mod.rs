// Core modules: record model, validation rules, storage, and error modeling.
pub mod error;
pub mod record;
pub mod rules;
pub mod store;
