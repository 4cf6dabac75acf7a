// Presentation helpers for record lists: bio previews, counters, and plain tables.
use std::collections::HashSet;
use std::fmt::Write as _;

use crate::core::record::{Record, RecordId};
use crate::core::rules::Field;

pub const BIO_PREVIEW_CHARS: usize = 30;
pub const SHOW_MORE: &str = "Show More";
pub const SHOW_LESS: &str = "Show Less";
pub const NO_RECORDS: &str = "No records found";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BioView {
    pub text: String,
    /// Label of the expand/collapse control; `None` when the bio is short.
    pub toggle: Option<&'static str>,
}

pub fn bio_view(bio: &str, expanded: bool) -> BioView {
    if bio.chars().count() <= BIO_PREVIEW_CHARS {
        return BioView {
            text: bio.to_string(),
            toggle: None,
        };
    }
    if expanded {
        return BioView {
            text: bio.to_string(),
            toggle: Some(SHOW_LESS),
        };
    }
    let preview: String = bio.chars().take(BIO_PREVIEW_CHARS).collect();
    BioView {
        text: format!("{preview}..."),
        toggle: Some(SHOW_MORE),
    }
}

/// `used/max` counter for a text field; `None` for `clientId`.
pub fn char_counter(field: Field, value: &str) -> Option<String> {
    let rule = field.rule()?;
    Some(format!("{}/{}", value.chars().count(), rule.max_chars))
}

const HEADERS: [&str; 5] = ["#", "Client ID", "Name", "Address", "Bio"];

pub fn render_table(records: &[Record], expanded: &HashSet<RecordId>) -> String {
    if records.is_empty() {
        return format!("{NO_RECORDS}\n");
    }
    let rows: Vec<[String; 5]> = records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let bio = bio_view(&record.bio, expanded.contains(&record.id));
            let bio = match bio.toggle {
                Some(toggle) => format!("{} [{toggle}]", bio.text),
                None => bio.text,
            };
            [
                (index + 1).to_string(),
                record.client_id.to_string(),
                record.name.clone(),
                record.address.clone(),
                bio,
            ]
        })
        .collect();

    let mut widths = HEADERS.map(|header| header.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_row(&mut out, &HEADERS.map(str::to_string), &widths);
    let rule: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
    let _ = writeln!(out, "{}", rule.join("-+-"));
    for row in &rows {
        push_row(&mut out, row, &widths);
    }
    out
}

fn push_row(out: &mut String, cells: &[String; 5], widths: &[usize; 5]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect();
    let _ = writeln!(out, "{}", line.join(" | ").trim_end());
}
