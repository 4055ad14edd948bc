//! Output header construction.
//!
//! The consensus BAM keeps the input's reference sequences, read groups, programs and
//! comments, declares itself unsorted and gains a @PG record chained to the input's last
//! program.

use std::collections::HashSet;

use anyhow::{Context, Result};
use bstr::BString;
use noodles::sam::Header;
use noodles::sam::header::record::value::Map;
use noodles::sam::header::record::value::map::header::tag as header_tag;
use noodles::sam::header::record::value::map::program::tag;
use noodles::sam::header::record::value::map::{self, Program};

/// Program name written to @PG records.
pub const PROGRAM_NAME: &str = "fgcollapse";

/// ID of the last program in the @PG chain: the one no other program names as PP.
#[must_use]
pub fn last_program_id(header: &Header) -> Option<String> {
    let programs = header.programs();
    let programs = programs.as_ref();
    let referenced: HashSet<&[u8]> = programs
        .values()
        .filter_map(|pg| pg.other_fields().get(&tag::PREVIOUS_PROGRAM_ID))
        .map(AsRef::as_ref)
        .collect();
    programs
        .keys()
        .find(|id| !referenced.contains(id.as_slice()))
        .or_else(|| programs.keys().next())
        .map(|id| String::from_utf8_lossy(id).into_owned())
}

/// `base_id`, or `base_id.N` for the first N not already used in `header`.
#[must_use]
pub fn unique_program_id(header: &Header, base_id: &str) -> String {
    let programs = header.programs();
    let programs = programs.as_ref();
    if !programs.contains_key(base_id.as_bytes()) {
        return base_id.to_string();
    }
    (1..)
        .map(|i| format!("{base_id}.{i}"))
        .find(|candidate| !programs.contains_key(candidate.as_bytes()))
        .unwrap_or_else(|| base_id.to_string())
}

/// Builds the header for consensus output from the input header.
pub fn build_output_header(input: &Header, version: &str, command_line: &str) -> Result<Header> {
    let hd = Map::<map::Header>::builder()
        .insert(header_tag::SORT_ORDER, BString::from("unsorted"))
        .build()
        .context("Failed to build @HD record")?;

    let mut builder = Header::builder().set_header(hd);
    for (name, sequence) in input.reference_sequences() {
        builder = builder.add_reference_sequence(name.as_slice(), sequence.clone());
    }
    for (id, rg) in input.read_groups() {
        builder = builder.add_read_group(id.as_slice(), rg.clone());
    }
    for (id, pg) in input.programs().as_ref() {
        builder = builder.add_program(id.as_slice(), pg.clone());
    }
    for comment in input.comments() {
        builder = builder.add_comment(comment.clone());
    }

    let mut pg = Map::<Program>::builder()
        .insert(tag::NAME, PROGRAM_NAME)
        .insert(tag::VERSION, version)
        .insert(tag::COMMAND_LINE, command_line);
    if let Some(previous) = last_program_id(input) {
        pg = pg.insert(tag::PREVIOUS_PROGRAM_ID, previous);
    }
    let pg = pg.build().context("Failed to build @PG record")?;
    let id = unique_program_id(input, PROGRAM_NAME);

    Ok(builder.add_program(id, pg).build())
}
