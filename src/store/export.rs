/// Comment-preserving re-materialization of a table's data definition file.
use rusqlite::types::Value;
use rustc_hash::FxHashMap;
use thiserror::Error;

use super::statement::{
    classify_statement, numeric_text, serialize_row, split_statements, value_text, Segment,
    StatementKind,
};

/// Declared shape of a table, as the export needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableShape<'a> {
    pub name: &'a str,
    pub columns: &'a [String],
    pub primary_key: usize,
}

/// An insert into the table that the merge cannot read back, so it cannot
/// tell which rows the statement holds.
#[derive(Debug, Error)]
#[error("cannot rewrite insert into {table}: {statement}")]
pub struct UnrecognizedRow {
    pub table: String,
    pub statement: String,
}

/// Current rows indexed for matching against statements in the file.
struct RowIndex<'r> {
    rows: &'r [Vec<Value>],
    by_key: FxHashMap<String, usize>,
    /// Numeric keys by canonical number text, for `'3.0'` against a stored 3.
    by_number: FxHashMap<String, usize>,
    keyless: Vec<usize>,
    emitted: Vec<bool>,
}

impl<'r> RowIndex<'r> {
    fn new(shape: &TableShape<'_>, rows: &'r [Vec<Value>]) -> Self {
        let mut index = RowIndex {
            rows,
            by_key: FxHashMap::default(),
            by_number: FxHashMap::default(),
            keyless: Vec::new(),
            emitted: vec![false; rows.len()],
        };
        for (idx, row) in rows.iter().enumerate() {
            let key_value = row.get(shape.primary_key);
            match key_value.and_then(value_text) {
                Some(key) => {
                    if matches!(key_value, Some(Value::Integer(_) | Value::Real(_))) {
                        index.by_number.insert(key.clone(), idx);
                    }
                    index.by_key.insert(key, idx);
                }
                None => index.keyless.push(idx),
            }
        }
        index
    }

    /// Claim the row a key refers to, unless an earlier statement has.
    fn claim_key(&mut self, key: &str) -> Option<usize> {
        let idx = self
            .by_key
            .get(key)
            .or_else(|| numeric_text(key).and_then(|n| self.by_number.get(&n)))
            .copied()
            .filter(|&idx| !self.emitted[idx])?;
        self.emitted[idx] = true;
        Some(idx)
    }

    /// Claim the first unclaimed keyless row `is_match` accepts.
    fn claim_keyless(&mut self, is_match: impl Fn(&[Value]) -> bool) -> Option<usize> {
        let idx = self
            .keyless
            .iter()
            .copied()
            .find(|&idx| !self.emitted[idx] && is_match(self.rows[idx].as_slice()))?;
        self.emitted[idx] = true;
        Some(idx)
    }
}

/// Rebuild a data file from its previous text and the table's current rows.
///
/// Row statements for this table are kept verbatim when their rows are
/// unchanged, rewritten in place when a row changed and dropped when none
/// of their rows remain. A multi-row statement with any change is rewritten
/// as one statement per remaining row. Everything else in the file is
/// copied through untouched. Rows never matched against a statement are
/// appended at the end in `rows` order.
pub fn merge_data_file(
    shape: &TableShape<'_>,
    rows: &[Vec<Value>],
    existing: &str,
) -> Result<String, UnrecognizedRow> {
    let mut index = RowIndex::new(shape, rows);
    let line_break = if existing.contains("\r\n") { "\r\n" } else { "\n" };
    let segments = split_statements(existing);
    let mut out = String::with_capacity(existing.len());
    // Set after a dropped statement that had its line to itself.
    let mut swallow_line_break = false;

    for (position, segment) in segments.iter().enumerate() {
        let statement = match *segment {
            Segment::Text(text) => {
                let text = if swallow_line_break {
                    skip_blank_line_rest(text)
                } else {
                    text
                };
                swallow_line_break = false;
                out.push_str(text);
                continue;
            }
            Segment::Statement(statement) => statement,
        };
        swallow_line_break = false;

        let stmt = match classify_statement(shape.name, statement) {
            StatementKind::Other => {
                out.push_str(statement);
                continue;
            }
            StatementKind::Unrecognized => {
                return Err(UnrecognizedRow {
                    table: shape.name.to_string(),
                    statement: statement.trim().to_string(),
                })
            }
            StatementKind::Rows(stmt) => stmt,
        };

        let mut matched = Vec::with_capacity(stmt.rows.len());
        let mut unchanged = true;
        for tuple in &stmt.rows {
            let claimed = match stmt.key(tuple, shape.columns, shape.primary_key) {
                Some(key) => index.claim_key(key),
                None => index.claim_keyless(|row| stmt.matches_row(tuple, shape.columns, row)),
            };
            match claimed {
                Some(idx) => {
                    unchanged &= stmt.matches_row(tuple, shape.columns, &rows[idx]);
                    matched.push(idx);
                }
                None => unchanged = false,
            }
        }

        if unchanged {
            out.push_str(statement);
        } else if !matched.is_empty() {
            let rewritten: Vec<String> = matched
                .iter()
                .map(|&idx| serialize_row(shape.name, shape.columns, &rows[idx]))
                .collect();
            out.push_str(&rewritten.join(line_break));
        } else if starts_line(&out) && next_is_line_end(&segments, position) {
            // The statement owned its line; drop the whole line.
            let kept = out.trim_end_matches([' ', '\t']).len();
            out.truncate(kept);
            swallow_line_break = true;
        }
    }

    let mut pending = index
        .emitted
        .iter()
        .enumerate()
        .filter(|(_, done)| !**done)
        .map(|(idx, _)| idx)
        .peekable();

    if pending.peek().is_some() && !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    for idx in pending {
        out.push_str(&serialize_row(shape.name, shape.columns, &rows[idx]));
        out.push('\n');
    }

    Ok(out)
}

/// Whether only spaces or tabs sit between the last line break and the end.
fn starts_line(out: &str) -> bool {
    let trimmed = out.trim_end_matches([' ', '\t']);
    trimmed.is_empty() || trimmed.ends_with('\n')
}

/// Whether the statement at `position` is followed only by blanks up to a
/// line break or the end of the file.
fn next_is_line_end(segments: &[Segment<'_>], position: usize) -> bool {
    match segments.get(position + 1) {
        None => true,
        Some(Segment::Statement(_)) => false,
        Some(Segment::Text(text)) => {
            let rest = text.split('\n').next().unwrap_or_default();
            rest.trim_end_matches('\r').chars().all(|c| c == ' ' || c == '\t')
        }
    }
}

/// Drop blanks and one line break from the start of `text`.
fn skip_blank_line_rest(text: &str) -> &str {
    match text.find('\n') {
        Some(end) => &text[end + 1..],
        None => "",
    }
}
