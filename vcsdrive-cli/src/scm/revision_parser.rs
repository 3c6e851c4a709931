// SPDX-FileCopyrightText: 2024 Mathieu Fenniak <mathieu@fenniak.net>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::errors::RevisionParseError;
use crate::scm::Revision;

/// Backend-specific decoding of a single log entry.
///
/// Implementations only describe how one entry looks; splitting a command's output into entries, skipping the empty
/// fragments a trailing (or leading) separator produces, and preserving the tool's ordering are handled once in
/// [`parse_revisions`].
pub trait RevisionGrammar {
    /// Separator placed after every entry by the backend's output template.
    const RECORD_SEPARATOR: char;

    /// Decode one entry; `index` is the entry's position in the output, for error reporting.
    fn parse_entry(&self, index: usize, entry: &str) -> Result<Revision, RevisionParseError>;
}

/// Decode all entries in `output`, in the order the tool emitted them.
///
/// Output with no entries is a valid, empty result and not an error.
pub fn parse_revisions<G: RevisionGrammar>(
    grammar: &G,
    output: &str,
) -> Result<Vec<Revision>, RevisionParseError> {
    output
        .split(G::RECORD_SEPARATOR)
        .map(|entry| entry.trim_start_matches(['\r', '\n']))
        .filter(|entry| !entry.trim().is_empty())
        .enumerate()
        .map(|(index, entry)| grammar.parse_entry(index, entry))
        .collect()
}
