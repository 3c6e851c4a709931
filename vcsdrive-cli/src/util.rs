// SPDX-FileCopyrightText: 2024 Mathieu Fenniak <mathieu@fenniak.net>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use serde::{Serializer, ser};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Serializes an optional timestamp as an RFC 3339 string, or `null`.
#[allow(clippy::ref_option)] // signature dictated by `serialize_with`
pub fn optional_rfc3339<S>(date: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match date {
        Some(date) => {
            let formatted = date.format(&Rfc3339).map_err(ser::Error::custom)?;
            serializer.serialize_str(&formatted)
        }
        None => serializer.serialize_none(),
    }
}

/// Quotes `value` as a single-quoted string literal, the form revset-style query languages accept for symbols.
///
/// Backslashes and single quotes are escaped, so the result always parses as exactly one literal regardless of what
/// the value contains.
#[must_use]
pub fn quote_symbol(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\\' || c == '\'' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}
