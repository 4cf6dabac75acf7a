//! Purpose: Hold top-level CLI command dispatch for `clientbook`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Local and remote targets share one `RecordApi` path through `Backend`.
//! Invariants: Create/update input is checked locally before it leaves the process.

use super::*;

use clientbook::api::{
    ApiResult, ClientId, Field, FieldErrors, Record, RecordApi, RecordBook, RecordDraft, RecordId,
    RecordPatch, RecordService, render_table,
};
use clientbook::core::rules::{check_input, check_patch, parse_client_id};
use clientbook::store_paths::{StoreLocation, open_store};
use std::collections::HashSet;

pub(super) fn dispatch_command(command: Command) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "clientbook", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Version => {
            emit_version_output();
            Ok(RunOutcome::ok())
        }
        Command::Serve(args) => {
            let config = serve_config_from_args(args)?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to start runtime")
                        .with_source(err)
                })?;
            runtime.block_on(serve::serve(config))?;
            Ok(RunOutcome::ok())
        }
        Command::Records { target, command } => {
            let backend = Backend::from_target(target)?;
            run_records_command(&backend, command)
        }
        Command::Console { target } => {
            let backend = Backend::from_target(target)?;
            let mut book = RecordBook::new(backend);
            let stdin = io::stdin();
            let stdout = io::stdout();
            console::run(&mut book, stdin.lock(), stdout.lock()).map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("console i/o failed")
                    .with_source(err)
            })?;
            Ok(RunOutcome::ok())
        }
    }
}

fn serve_config_from_args(args: ServeArgs) -> Result<serve::ServeConfig, Error> {
    let store = match args.store {
        Some(raw) => raw.parse::<StoreLocation>()?,
        None => StoreLocation::default(),
    };
    Ok(serve::ServeConfig {
        bind: args.bind,
        store,
        cors_origins: args
            .cors_origin
            .into_iter()
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect(),
        allow_non_loopback: args.allow_non_loopback,
        max_body_bytes: args.max_body_bytes,
    })
}

/// Either a server reached over HTTP or a store opened in this process.
enum Backend {
    Remote(RemoteClient),
    Local(RecordService),
}

impl Backend {
    fn from_target(target: TargetArgs) -> Result<Self, Error> {
        if let Some(raw) = target.store {
            let location = raw.parse::<StoreLocation>()?;
            return Ok(Backend::Local(RecordService::new(open_store(&location)?)));
        }
        Ok(Backend::Remote(remote_client(target.url, target.timeout_ms)?))
    }

    fn get(&self, id: &RecordId) -> ApiResult<Record> {
        match self {
            Backend::Remote(client) => client.get(id),
            Backend::Local(service) => service.get(id),
        }
    }

    fn client_id_available(
        &self,
        client_id: ClientId,
        exclude: Option<&RecordId>,
    ) -> ApiResult<bool> {
        match (self, exclude) {
            (Backend::Local(service), exclude) => service.client_id_available(client_id, exclude),
            (Backend::Remote(client), None) => client.client_id_available(client_id),
            (Backend::Remote(client), Some(id)) => {
                if client.client_id_available(client_id)? {
                    return Ok(true);
                }
                Ok(client.get(id)?.client_id == client_id)
            }
        }
    }
}

impl RecordApi for Backend {
    fn list_records(&self) -> ApiResult<Vec<Record>> {
        match self {
            Backend::Remote(client) => client.list_records(),
            Backend::Local(service) => service.list_records(),
        }
    }

    fn create_record(&self, draft: &RecordDraft) -> ApiResult<Record> {
        match self {
            Backend::Remote(client) => client.create_record(draft),
            Backend::Local(service) => service.create_record(draft),
        }
    }

    fn update_record(&self, id: &RecordId, patch: &RecordPatch) -> ApiResult<Record> {
        match self {
            Backend::Remote(client) => client.update_record(id, patch),
            Backend::Local(service) => service.update_record(id, patch),
        }
    }

    fn delete_record(&self, id: &RecordId) -> ApiResult<()> {
        match self {
            Backend::Remote(client) => client.delete_record(id),
            Backend::Local(service) => service.delete_record(id),
        }
    }
}

fn run_records_command(backend: &Backend, command: RecordsCommand) -> Result<RunOutcome, Error> {
    match command {
        RecordsCommand::List { json } => {
            let records = backend.list_records()?;
            if io::stdout().is_terminal() && !json {
                print!("{}", render_table(&records, &HashSet::new()));
            } else {
                emit_json(records_json(&records)?);
            }
            Ok(RunOutcome::ok())
        }
        RecordsCommand::Get { id } => {
            let record = backend.get(&RecordId::new(id))?;
            emit_json(record_json(&record)?);
            Ok(RunOutcome::ok())
        }
        RecordsCommand::Create { fields } => {
            let draft = check_input(&fields.into_input()).map_err(FieldErrors::into_error)?;
            let record = backend.create_record(&draft)?;
            emit_json(record_json(&record)?);
            Ok(RunOutcome::ok())
        }
        RecordsCommand::Update { id, fields } => {
            let patch = check_patch(&fields.into_input()).map_err(FieldErrors::into_error)?;
            if patch.is_empty() {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("update requires at least one field")
                    .with_hint("Pass one or more of --client-id, --name, --address, --bio."));
            }
            let record = backend.update_record(&RecordId::new(id), &patch)?;
            emit_json(record_json(&record)?);
            Ok(RunOutcome::ok())
        }
        RecordsCommand::Delete { id } => {
            let id = RecordId::new(id);
            backend.delete_record(&id)?;
            emit_json(json!({ "deleted": id }));
            Ok(RunOutcome::ok())
        }
        RecordsCommand::Check { client_id, exclude } => {
            let client_id = parse_client_id(&client_id).map_err(|message| {
                let mut errors = FieldErrors::new();
                errors.insert(Field::ClientId, message);
                errors.into_error()
            })?;
            let exclude = exclude.map(RecordId::new);
            let available = backend.client_id_available(client_id, exclude.as_ref())?;
            emit_json(json!({ "clientId": client_id, "available": available }));
            Ok(RunOutcome::ok())
        }
    }
}

fn record_json(record: &Record) -> Result<Value, Error> {
    serde_json::to_value(record).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode record")
            .with_source(err)
    })
}

fn records_json(records: &[Record]) -> Result<Value, Error> {
    serde_json::to_value(records).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode records")
            .with_source(err)
    })
}
