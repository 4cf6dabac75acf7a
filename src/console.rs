//! Purpose: Line-oriented interactive front end over `RecordBook`.
//! Exports: `run`.
//! Role: Terminal stand-in for the record list and form; one command per line.
//! Invariants: Every mutation goes through the book, so the list is re-fetched after it.
//! Invariants: Rows are addressed by their 1-based position in the last listing.

use std::io::{self, BufRead, Write};

use clientbook::api::{
    Field, RecordApi, RecordBook, RecordId, SubmitOutcome, bio_view,
};

const HELP: &str = "\
commands:
  list                 refresh and show records
  new                  start a new record
  edit <n>             load row n into the form
  set <field> <value>  set clientId, name, address, or bio
  form                 show the form
  save                 submit the form
  cancel               discard the form
  delete <n>           delete row n
  more <n>             show more/less of row n's bio
  help                 show this help
  quit                 leave the console";

pub fn run<A, R, W>(book: &mut RecordBook<A>, input: R, mut out: W) -> io::Result<()>
where
    A: RecordApi,
    R: BufRead,
    W: Write,
{
    book.refresh();
    print_list(book, &mut out)?;
    writeln!(out, "type `help` for commands")?;
    prompt(&mut out)?;

    for line in input.lines() {
        let line = line?;
        let line = line.trim();
        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };
        match command {
            "" => {}
            "quit" | "exit" => break,
            "help" => writeln!(out, "{HELP}")?,
            "list" | "ls" => {
                book.refresh();
                print_list(book, &mut out)?;
            }
            "new" => {
                book.open_create();
                print_form(book, &mut out)?;
            }
            "edit" => match row_id(book, rest) {
                Some(id) => {
                    book.open_edit(&id);
                    print_form(book, &mut out)?;
                }
                None => writeln!(out, "no row `{rest}`")?,
            },
            "set" => set_field(book, rest, &mut out)?,
            "form" => print_form(book, &mut out)?,
            "save" => save(book, &mut out)?,
            "cancel" => {
                book.cancel();
                writeln!(out, "form cleared")?;
            }
            "delete" | "rm" => match row_id(book, rest) {
                Some(id) => {
                    if book.delete(&id) {
                        writeln!(out, "deleted")?;
                    }
                    print_list(book, &mut out)?;
                }
                None => writeln!(out, "no row `{rest}`")?,
            },
            "more" => match row_id(book, rest) {
                Some(id) => {
                    book.toggle_bio(&id);
                    if let Some(record) = book.record(&id) {
                        let view = bio_view(&record.bio, book.is_expanded(&id));
                        writeln!(out, "{}", view.text)?;
                    }
                }
                None => writeln!(out, "no row `{rest}`")?,
            },
            other => writeln!(out, "unknown command `{other}` (try `help`)")?,
        }
        prompt(&mut out)?;
    }
    Ok(())
}

fn prompt<W: Write>(out: &mut W) -> io::Result<()> {
    write!(out, "> ")?;
    out.flush()
}

fn row_id<A: RecordApi>(book: &RecordBook<A>, raw: &str) -> Option<RecordId> {
    let index: usize = raw.parse().ok()?;
    book.records()
        .get(index.checked_sub(1)?)
        .map(|record| record.id.clone())
}

fn print_list<A: RecordApi, W: Write>(book: &RecordBook<A>, out: &mut W) -> io::Result<()> {
    if let Some(error) = book.list_error() {
        writeln!(out, "{error}")?;
    }
    write!(out, "{}", book.render())
}

fn print_form<A: RecordApi, W: Write>(book: &RecordBook<A>, out: &mut W) -> io::Result<()> {
    let form = book.form();
    writeln!(out, "{}", form.title())?;
    for field in Field::ALL {
        let counter = form
            .counter(field)
            .map(|counter| format!(" ({counter})"))
            .unwrap_or_default();
        writeln!(out, "  {}: {}{counter}", field.label(), form.value(field))?;
        if let Some(error) = form.error(field) {
            writeln!(out, "    ! {error}")?;
        }
    }
    if let Some(error) = form.submit_error() {
        writeln!(out, "  ! {error}")?;
    }
    writeln!(out, "  [{}]", form.submit_label())
}

fn set_field<A: RecordApi, W: Write>(
    book: &mut RecordBook<A>,
    rest: &str,
    out: &mut W,
) -> io::Result<()> {
    let (name, value) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let normalized: String = name.chars().filter(|c| *c != '-' && *c != '_').collect();
    let Some(field) = Field::parse(&normalized) else {
        return writeln!(out, "unknown field `{name}`");
    };
    let value = value.trim_start();
    if !book.form_mut().input(field, value) {
        return writeln!(out, "{} refused: not allowed in this field", field.label());
    }
    let form = book.form();
    match form.error(field) {
        Some(error) => writeln!(out, "{}: {error}", field.label()),
        None => match form.counter(field) {
            Some(counter) => writeln!(out, "{} ok ({counter})", field.label()),
            None => writeln!(out, "{} ok", field.label()),
        },
    }
}

fn save<A: RecordApi, W: Write>(book: &mut RecordBook<A>, out: &mut W) -> io::Result<()> {
    match book.submit() {
        SubmitOutcome::Saved(record) => {
            writeln!(out, "saved client {}", record.client_id)?;
            print_list(book, out)
        }
        SubmitOutcome::Invalid => print_form(book, out),
        SubmitOutcome::Failed(message) => writeln!(out, "{message}"),
        SubmitOutcome::Busy => writeln!(out, "a save is already in progress"),
    }
}
