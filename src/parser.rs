//! Debian control-record stream parsing.
//!
//! A record ("paragraph") is a run of `Key: value` fields, where lines
//! beginning with a space or tab continue the previous value. Records are
//! separated by blank lines. This grammar covers `Packages` indices, the
//! status file and per-package `control` files alike.

use nom::{
    bytes::complete::{tag, take_while1},
    character::complete::space0,
    combinator::rest,
    sequence::separated_pair,
    IResult, Parser,
};

#[derive(Debug, Clone, Default)]
pub struct Paragraph {
    pub fields: Vec<(String, String)>,
}

impl Paragraph {
    /// Look up a field, case-insensitively as dpkg does.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// First line of a multi-line field value.
    pub fn get_first_line(&self, name: &str) -> Option<&str> {
        self.get(name).map(|v| v.lines().next().unwrap_or(""))
    }

}

#[inline]
fn field_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c != ':' && c != '\n' && !c.is_ascii_whitespace())(input)
}

#[inline]
fn separator(input: &str) -> IResult<&str, ()> {
    let (input, _) = tag(":")(input)?;
    let (input, _) = space0(input)?;
    Ok((input, ()))
}

#[inline]
fn field_line(input: &str) -> IResult<&str, (&str, &str)> {
    separated_pair(field_name, separator, rest).parse(input)
}

/// Parse a whole record stream into paragraphs. Lines that do not fit the
/// grammar are skipped with a debug log rather than failing the stream;
/// repositories occasionally ship slightly malformed entries.
pub fn parse_paragraphs(input: &str) -> Vec<Paragraph> {
    let mut paragraphs = Vec::new();
    let mut current = Paragraph::default();

    for line in input.lines() {
        if line.trim().is_empty() {
            if !current.fields.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
            continue;
        }

        if line.starts_with(' ') || line.starts_with('\t') {
            // Continuation of the previous field.
            if let Some((_, v)) = current.fields.last_mut() {
                v.push('\n');
                v.push_str(line.trim_start());
            }
            continue;
        }

        match field_line(line) {
            Ok((_, (k, v))) => current.fields.push((k.to_string(), v.to_string())),
            Err(_) => log::debug!("skipping malformed control line: {:?}", line),
        }
    }

    if !current.fields.is_empty() {
        paragraphs.push(current);
    }

    paragraphs
}

/// Split a raw record stream into verbatim blocks (text between blank
/// lines), preserving each block's exact bytes. Used when rewriting the
/// status file so untouched records survive byte-for-byte.
pub fn split_blocks(input: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut start = None;
    let mut pos = 0;

    for line in input.split_inclusive('\n') {
        if line.trim().is_empty() {
            if let Some(s) = start.take() {
                blocks.push(input[s..pos].trim_end_matches('\n'));
            }
        } else if start.is_none() {
            start = Some(pos);
        }
        pos += line.len();
    }
    if let Some(s) = start {
        blocks.push(input[s..].trim_end_matches('\n'));
    }

    blocks
}
