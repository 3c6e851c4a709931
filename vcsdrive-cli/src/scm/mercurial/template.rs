// SPDX-FileCopyrightText: 2024 Mathieu Fenniak <mathieu@fenniak.net>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use time::{OffsetDateTime, UtcOffset};
use winnow::ascii::{dec_int, hex_digit1};
use winnow::combinator::{opt, separated, separated_pair, terminated};
use winnow::token::{rest, take_till};
use winnow::{ModalResult, Parser};

use crate::errors::RevisionParseError;
use crate::scm::Revision;
use crate::scm::revision_parser::RevisionGrammar;

const FIELD_SEPARATOR: char = '\x1f';
const RECORD_SEPARATOR: char = '\x1e';
const NODE_HEX_LEN: usize = 40;
const NULL_NODE: &str = "0000000000000000000000000000000000000000";

/// `hg log` template producing one record per revision:
/// `node US p1node SP p2node US author US hgdate US description RS`.
///
/// Author and description are free text, so hg emits them as JSON strings; control characters (including both
/// separators) arrive escaped and can't split a record.
pub const LOG_TEMPLATE: &str =
    r"{node}\x1f{p1node} {p2node}\x1f{author|json}\x1f{date|hgdate}\x1f{desc|json}\x1e";

pub struct MercurialLogGrammar;

struct RawEntry<'i> {
    node: &'i str,
    parents: Vec<&'i str>,
    author: String,
    /// Unix seconds, and the offset in seconds *west* of UTC (hg's convention).
    date: Option<(i64, i32)>,
    description: String,
}

fn node<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    hex_digit1
        .verify(|s: &str| s.len() == NODE_HEX_LEN)
        .parse_next(input)
}

fn parents<'i>(input: &mut &'i str) -> ModalResult<Vec<&'i str>> {
    separated(0.., node, ' ').parse_next(input)
}

fn hgdate(input: &mut &str) -> ModalResult<(i64, i32)> {
    separated_pair(dec_int, ' ', dec_int).parse_next(input)
}

fn json_text(raw: &str) -> Result<String, serde_json::Error> {
    serde_json::from_str(raw)
}

fn json_field(input: &mut &str) -> ModalResult<String> {
    terminated(
        take_till(0.., FIELD_SEPARATOR).try_map(json_text),
        FIELD_SEPARATOR,
    )
    .parse_next(input)
}

fn raw_entry<'i>(input: &mut &'i str) -> ModalResult<RawEntry<'i>> {
    let node = terminated(node, FIELD_SEPARATOR).parse_next(input)?;
    let parents = terminated(parents, FIELD_SEPARATOR).parse_next(input)?;
    let author = json_field.parse_next(input)?;
    let date = terminated(opt(hgdate), FIELD_SEPARATOR).parse_next(input)?;
    let description = rest.try_map(json_text).parse_next(input)?;
    Ok(RawEntry {
        node,
        parents,
        author,
        date,
        description,
    })
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

fn convert_date(
    index: usize,
    (seconds, west_offset): (i64, i32),
) -> Result<OffsetDateTime, RevisionParseError> {
    let invalid = |reason: String| RevisionParseError::InvalidDate {
        index,
        raw: format!("{seconds} {west_offset}"),
        reason,
    };
    let offset = west_offset
        .checked_neg()
        .ok_or_else(|| invalid(String::from("offset out of range")))
        .and_then(|east| {
            UtcOffset::from_whole_seconds(east).map_err(|e| invalid(e.to_string()))
        })?;
    Ok(OffsetDateTime::from_unix_timestamp(seconds)
        .map_err(|e| invalid(e.to_string()))?
        .to_offset(offset))
}

impl RevisionGrammar for MercurialLogGrammar {
    const RECORD_SEPARATOR: char = RECORD_SEPARATOR;

    fn parse_entry(&self, index: usize, entry: &str) -> Result<Revision, RevisionParseError> {
        let raw = raw_entry
            .parse(entry)
            .map_err(|e| RevisionParseError::MalformedEntry {
                index,
                reason: e.to_string(),
            })?;

        Ok(Revision {
            id: String::from(raw.node),
            parents: raw
                .parents
                .into_iter()
                .filter(|p| *p != NULL_NODE)
                .map(String::from)
                .collect(),
            author: non_empty(raw.author),
            date: raw.date.map(|d| convert_date(index, d)).transpose()?,
            message: non_empty(raw.description),
        })
    }
}
