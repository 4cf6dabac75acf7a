//! Purpose: `clientbook` CLI entry point.
//! Role: Binary crate root; parses args, runs commands, emits JSON or tables on stdout.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: Record commands go through `RecordApi` whether local or remote.
#![allow(clippy::result_large_err)]
use std::io::{self, IsTerminal};
use std::net::SocketAddr;
use std::time::Duration;

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;

mod command_dispatch;
mod console;
mod serve;

use clientbook::api::{ClientIdInput, Error, ErrorKind, RecordInput, RemoteClient, to_exit_code};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                let message = clap_error_summary(&err);
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(message)
                        .with_hint(clap_error_hint(&err)),
                    ColorMode::Auto,
                ));
            }
        },
    };

    let color_mode = cli.color;
    command_dispatch::dispatch_command(cli.command)
        .map_err(add_network_hint)
        .map_err(add_corrupt_hint)
        .map_err(add_internal_hint)
        .map_err(|err| (err, color_mode))
}

#[derive(Parser)]
#[command(
    name = "clientbook",
    version,
    about = "Client records over a small REST service",
    help_template = r#"{about-with-newline}
{before-help}USAGE
  {usage}

COMMANDS
{subcommands}

OPTIONS
{options}

{after-help}
"#,
    long_about = None,
    before_help = r#"Each record has a unique Client ID (1-10000), a name, an address, and a bio.

Mental model:
  - `serve` runs the HTTP service over a record store
  - `records` lists and edits records (over HTTP, or straight against a store)
  - `console` is an interactive front end over the same operations
"#,
    after_help = r#"EXAMPLES
  $ clientbook serve --store memory:
  $ clientbook records create --client-id 1 --name "Ann Lee" --address "1 Main St" --bio Engineer
  $ clientbook records list
  $ clientbook console

  $ clientbook <command> --help"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Run the HTTP record service",
        long_about = r#"Serve the record API over HTTP.

Routes: GET/POST /records, GET/PUT/DELETE /records/:id,
GET /records/check-client-id/:clientId, GET /health."#,
        after_help = r#"EXAMPLES
  $ clientbook serve
  $ clientbook serve --bind 127.0.0.1:4000 --store ./records.json
  $ CLIENTBOOK_CORS_ORIGIN=http://localhost:5173 clientbook serve"#
    )]
    Serve(ServeArgs),
    #[command(
        arg_required_else_help = true,
        about = "List, read, create, update, and delete records",
        after_help = r#"EXAMPLES
  $ clientbook records list
  $ clientbook records get 65f0c0ffee0123456789abcd
  $ clientbook records update 65f0c0ffee0123456789abcd --bio "Manager"
  $ clientbook records --store ./records.json check 12"#
    )]
    Records {
        #[command(flatten)]
        target: TargetArgs,
        #[command(subcommand)]
        command: RecordsCommand,
    },
    #[command(about = "Interactive record console")]
    Console {
        #[command(flatten)]
        target: TargetArgs,
    },
    #[command(
        arg_required_else_help = true,
        about = "Generate shell completions",
        after_help = r#"EXAMPLES
  $ clientbook completion bash > ~/.local/share/bash-completion/completions/clientbook
  $ clientbook completion zsh > ~/.zfunc/_clientbook"#
    )]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
    #[command(about = "Print version")]
    Version,
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(
        long,
        env = "CLIENTBOOK_BIND",
        default_value = "127.0.0.1:4000",
        help = "Listen address"
    )]
    bind: SocketAddr,
    #[arg(
        long,
        env = "CLIENTBOOK_STORE",
        value_name = "STORE",
        help = "Record store: memory:, file:<path>, or a path (default ~/.clientbook/records.json)"
    )]
    store: Option<String>,
    #[arg(
        long = "cors-origin",
        env = "CLIENTBOOK_CORS_ORIGIN",
        value_name = "ORIGIN",
        value_delimiter = ',',
        default_value = "http://localhost:3000",
        help = "Allowed browser origin (repeatable, or `*`)"
    )]
    cors_origin: Vec<String>,
    #[arg(long, help = "Permit binding to a non-loopback address")]
    allow_non_loopback: bool,
    #[arg(
        long,
        default_value_t = 1024 * 1024,
        help = "Maximum request body size in bytes"
    )]
    max_body_bytes: u64,
}

/// Where record commands send their operations.
#[derive(Args, Debug)]
struct TargetArgs {
    #[arg(
        long,
        env = "CLIENTBOOK_URL",
        value_name = "URL",
        global = true,
        help = "Server base URL (default http://127.0.0.1:4000)"
    )]
    url: Option<String>,
    #[arg(
        long,
        value_name = "STORE",
        global = true,
        help = "Operate on a store directly instead of a server (takes precedence over --url)"
    )]
    store: Option<String>,
    #[arg(
        long,
        env = "CLIENTBOOK_TIMEOUT_MS",
        value_name = "MS",
        default_value_t = 5000,
        global = true,
        help = "Request timeout in milliseconds"
    )]
    timeout_ms: u64,
}

#[derive(Subcommand, Debug)]
enum RecordsCommand {
    #[command(about = "List records, newest first")]
    List {
        #[arg(long, help = "Emit JSON even on a terminal")]
        json: bool,
    },
    #[command(about = "Show one record")]
    Get { id: String },
    #[command(about = "Create a record")]
    Create {
        #[command(flatten)]
        fields: RecordFieldArgs,
    },
    #[command(about = "Update fields of a record")]
    Update {
        id: String,
        #[command(flatten)]
        fields: RecordFieldArgs,
    },
    #[command(about = "Delete a record permanently")]
    Delete { id: String },
    #[command(about = "Check whether a Client ID is free")]
    Check {
        client_id: String,
        #[arg(long, value_name = "ID", help = "Ignore this record when checking")]
        exclude: Option<String>,
    },
}

#[derive(Args, Debug, Default)]
struct RecordFieldArgs {
    #[arg(long, value_name = "N", help = "Client ID (1-10000)")]
    client_id: Option<String>,
    #[arg(long, help = "Name (letters and spaces, max 20)")]
    name: Option<String>,
    #[arg(long, help = "Address (max 40)")]
    address: Option<String>,
    #[arg(long, help = "Bio (max 120)")]
    bio: Option<String>,
}

impl RecordFieldArgs {
    fn into_input(self) -> RecordInput {
        RecordInput::from_values(
            self.client_id.map(ClientIdInput::Text),
            self.name,
            self.address,
            self.bio,
        )
    }
}

const DEFAULT_URL: &str = "http://127.0.0.1:4000";

fn remote_client(url: Option<String>, timeout_ms: u64) -> Result<RemoteClient, Error> {
    if timeout_ms == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--timeout-ms must be greater than zero")
            .with_hint("Use a positive value like 5000."));
    }
    let url = url.unwrap_or_else(|| DEFAULT_URL.to_string());
    Ok(RemoteClient::new(url)?.with_timeout(Duration::from_millis(timeout_ms)))
}

fn add_network_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::Network | ErrorKind::Timeout => err.with_hint(
            "Is the server running? Start it with `clientbook serve`, or pass --url/--store.",
        ),
        ErrorKind::Unavailable => err.with_hint("The record store is unavailable. Retry shortly."),
        ErrorKind::Io => err.with_hint("I/O error. Check the path, filesystem, and disk space."),
        _ => err,
    }
}

fn add_corrupt_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Corrupt || err.hint().is_some() {
        return err;
    }
    err.with_hint("Store file appears corrupt. Restore it from a backup or point --store elsewhere.")
}

fn add_internal_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Internal || err.hint().is_some() {
        return err;
    }
    err.with_hint(
        "Unexpected internal failure. Retry with RUST_LOG=debug and share command/context if it persists.",
    )
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_version_output() {
    if io::stdout().is_terminal() {
        println!("clientbook {}", env!("CARGO_PKG_VERSION"));
    } else {
        emit_json(json!({
            "name": "clientbook",
            "version": env!("CARGO_PKG_VERSION"),
        }));
    }
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error",
        ErrorKind::Usage => "usage error",
        ErrorKind::Validation => "validation error",
        ErrorKind::NotFound => "not found",
        ErrorKind::Conflict => "conflict",
        ErrorKind::Unavailable => "store unavailable",
        ErrorKind::Corrupt => "corrupt data",
        ErrorKind::Io => "i/o error",
        ErrorKind::Network => "network error",
        ErrorKind::Timeout => "request timed out",
    }
    .to_string()
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(detail) = err.detail() {
        inner.insert("detail".to_string(), json!(detail));
    }
    if let Some(fields) = err.fields() {
        let fields: Map<String, Value> = fields
            .iter()
            .map(|(field, message)| (field.as_str().to_string(), json!(message)))
            .collect();
        inner.insert("fields".to_string(), Value::Object(fields));
    }
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = vec![format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    )];

    let fields = err.fields();
    match (err.detail(), fields) {
        (_, Some(fields)) if !fields.is_empty() => {
            for (field, message) in fields.iter() {
                lines.push(format!("  {}: {message}", field.label()));
            }
        }
        (Some(detail), _) => lines.push(format!(
            "{} {detail}",
            colorize_label("detail:", use_color, AnsiColor::Yellow)
        )),
        _ => {}
    }
    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }

    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

fn clap_error_hint(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let usage = rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("Usage: "))
        .map(str::trim);
    let Some(usage) = usage else {
        return "Try `clientbook --help`.".to_string();
    };
    let parts: Vec<&str> = usage
        .split_whitespace()
        .skip_while(|token| *token != "clientbook")
        .skip(1)
        .take_while(|token| {
            !(token.starts_with('-') || token.starts_with('<') || token.starts_with('['))
        })
        .collect();
    if parts.is_empty() {
        "Try `clientbook --help`.".to_string()
    } else {
        format!("Try `clientbook {} --help`.", parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command, RecordsCommand, clap_error_hint, error_json, error_text};
    use clap::{CommandFactory, Parser};
    use clientbook::api::{Error, ErrorKind, Field, FieldErrors};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn records_create_parses_field_flags() {
        let cli = Cli::try_parse_from([
            "clientbook",
            "records",
            "--store",
            "memory:",
            "create",
            "--client-id",
            "1",
            "--name",
            "Ann Lee",
            "--address",
            "1 Main St",
            "--bio",
            "Engineer",
        ])
        .expect("parse");
        let Command::Records { target, command } = cli.command else {
            panic!("expected records command");
        };
        assert_eq!(target.store.as_deref(), Some("memory:"));
        let RecordsCommand::Create { fields } = command else {
            panic!("expected create");
        };
        assert_eq!(fields.client_id.as_deref(), Some("1"));
        assert_eq!(fields.name.as_deref(), Some("Ann Lee"));
    }

    #[test]
    fn clap_hint_names_subcommand() {
        let err = Cli::try_parse_from(["clientbook", "records", "get"]).err().expect("error");
        assert_eq!(clap_error_hint(&err), "Try `clientbook records get --help`.");
    }

    #[test]
    fn validation_errors_render_per_field() {
        let mut fields = FieldErrors::new();
        fields.insert(Field::Name, "Name is required");
        let err = fields.into_error();
        let text = error_text(&err, false);
        assert!(text.starts_with("error: Validation Error"));
        assert!(text.contains("  Name: Name is required"));
        let json = error_json(&err);
        assert_eq!(json["error"]["kind"], "Validation");
        assert_eq!(json["error"]["fields"]["name"], "Name is required");
    }

    #[test]
    fn error_json_includes_hint() {
        let err = Error::new(ErrorKind::Network)
            .with_message("request failed")
            .with_hint("start the server");
        let json = error_json(&err);
        assert_eq!(json["error"]["message"], "request failed");
        assert_eq!(json["error"]["hint"], "start the server");
    }
}
