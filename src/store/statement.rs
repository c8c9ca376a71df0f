/// Row statements in data definition files: finding them, recognizing them
/// and writing them.
///
/// A data file is split into statements at every `;` outside quotes and
/// comments, so a row may span any number of lines. A row statement is
/// `INSERT INTO table [(cols)] VALUES (...)[, (...)]*;`. Everything between
/// statements (comments, blank lines) is opaque text.
use regex::Regex;
use rusqlite::types::Value;
use std::fmt::Write as _;
use std::sync::OnceLock;

fn insert_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r#"(?is)^\s*INSERT\s+(?:OR\s+\w+\s+)?INTO\s+["`\[]?(\w+)["`\]]?\s*(?:\(([^)]*)\))?\s*VALUES\s*(.*?)\s*;\s*$"#,
        )
        .unwrap_or_else(|e| unreachable!("insert pattern is valid: {e}"))
    })
}

fn insert_target_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?is)^\s*INSERT\s+(?:OR\s+\w+\s+)?INTO\s+["`\[]?(\w+)"#)
            .unwrap_or_else(|e| unreachable!("insert target pattern is valid: {e}"))
    })
}

/// A piece of a data file: either one complete statement (through its
/// terminating `;`) or the text between statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Statement(&'a str),
}

/// Split `text` into statements and the text between them.
///
/// Concatenating the segments gives back `text` exactly. A statement left
/// unterminated at the end of the file runs to the end.
pub fn split_statements(text: &str) -> Vec<Segment<'_>> {
    let bytes = text.as_bytes();
    let mut segments = Vec::new();
    let mut text_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b if b.is_ascii_whitespace() => i += 1,
            b'-' if bytes.get(i + 1) == Some(&b'-') => i = line_end(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = comment_end(bytes, i),
            _ => {
                if text_start < i {
                    segments.push(Segment::Text(&text[text_start..i]));
                }
                let end = statement_end(bytes, i);
                segments.push(Segment::Statement(&text[i..end]));
                i = end;
                text_start = end;
            }
        }
    }
    if text_start < bytes.len() {
        segments.push(Segment::Text(&text[text_start..]));
    }
    segments
}

/// Index of the `\n` ending the line that contains `from`, or the end.
fn line_end(bytes: &[u8], from: usize) -> usize {
    bytes[from..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |p| from + p)
}

/// Index just past the `*/` closing a block comment opened at `from`.
fn comment_end(bytes: &[u8], from: usize) -> usize {
    bytes[from + 2..]
        .windows(2)
        .position(|w| w == b"*/")
        .map_or(bytes.len(), |p| from + 2 + p + 2)
}

/// Index just past the `;` ending the statement that starts at `start`.
fn statement_end(bytes: &[u8], start: usize) -> usize {
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            // A doubled quote closes and reopens the literal.
            quote @ (b'\'' | b'"' | b'`') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    i += 1;
                }
                i += 1;
            }
            b'[' => {
                while i < bytes.len() && bytes[i] != b']' {
                    i += 1;
                }
                i += 1;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => i = line_end(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = comment_end(bytes, i),
            b';' => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// A literal in a VALUES list, as written in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Null,
    /// Quoted string with `''` escapes already undone.
    Text(String),
    /// Bare token such as `42` or `3.5`.
    Bare(String),
    /// `X'...'` blob, hex digits uppercased.
    Blob(String),
}

impl Literal {
    /// Text used to compare this literal with a primary-key value.
    pub fn key_text(&self) -> Option<&str> {
        match self {
            Literal::Null => None,
            Literal::Text(s) | Literal::Bare(s) | Literal::Blob(s) => Some(s),
        }
    }

    /// Whether loading this literal could have produced `value`.
    ///
    /// Numeric values compare by number, so `'3'`, `3.0` and `'3.00'`
    /// all match a stored 3.
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Literal::Null, Value::Null) => true,
            (Literal::Text(s) | Literal::Bare(s), Value::Text(t)) => s == t,
            (Literal::Text(s) | Literal::Bare(s), Value::Integer(_) | Value::Real(_)) => {
                numeric_text(s).is_some_and(|n| Some(n) == value_text(value))
            }
            (Literal::Blob(hex), Value::Blob(b)) => *hex == hex_upper(b),
            _ => false,
        }
    }
}

/// A recognized row statement: one or more tuples for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowStatement {
    pub table: String,
    /// Explicit column list, if the statement names one.
    pub columns: Option<Vec<String>>,
    pub rows: Vec<Vec<Literal>>,
}

impl RowStatement {
    /// Position within a tuple of the declared column `table_columns[index]`.
    fn position(&self, table_columns: &[String], index: usize) -> Option<usize> {
        match &self.columns {
            Some(cols) => {
                let name = table_columns.get(index)?;
                cols.iter().position(|c| c.eq_ignore_ascii_case(name))
            }
            None => Some(index),
        }
    }

    /// Primary-key text of `tuple`.
    ///
    /// `table_columns` and `pk_index` describe the declared table; they are
    /// used when the statement omits its column list.
    pub fn key<'s>(
        &self,
        tuple: &'s [Literal],
        table_columns: &[String],
        pk_index: usize,
    ) -> Option<&'s str> {
        let position = self.position(table_columns, pk_index)?;
        tuple.get(position)?.key_text()
    }

    /// Whether `tuple` already holds exactly the values of `row`.
    ///
    /// Columns the statement does not name must be NULL in `row`.
    pub fn matches_row(&self, tuple: &[Literal], table_columns: &[String], row: &[Value]) -> bool {
        if row.len() != table_columns.len() {
            return false;
        }
        let width = self.columns.as_ref().map_or(table_columns.len(), Vec::len);
        if tuple.len() != width {
            return false;
        }
        if let Some(cols) = &self.columns {
            let all_declared = cols
                .iter()
                .all(|c| table_columns.iter().any(|t| t.eq_ignore_ascii_case(c)));
            if !all_declared {
                return false;
            }
        }
        row.iter()
            .enumerate()
            .all(|(index, value)| match self.position(table_columns, index) {
                Some(position) => tuple[position].matches(value),
                None => matches!(value, Value::Null),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementKind {
    Rows(RowStatement),
    /// An insert into the table whose values cannot be read back as
    /// literals (expressions, `SELECT`, malformed quoting).
    Unrecognized,
    Other,
}

/// Decide whether `statement` inserts rows into `table`.
///
/// Table names compare case-insensitively.
pub fn classify_statement(table: &str, statement: &str) -> StatementKind {
    let targets_table = insert_target_pattern()
        .captures(statement)
        .is_some_and(|caps| caps[1].eq_ignore_ascii_case(table));
    if !targets_table {
        return StatementKind::Other;
    }

    let Some(caps) = insert_pattern().captures(statement) else {
        return StatementKind::Unrecognized;
    };
    let columns = caps.get(2).map(|m| {
        m.as_str()
            .split(',')
            .map(|c| unquote_ident(c.trim()).to_string())
            .collect::<Vec<_>>()
    });
    match parse_tuples(&caps[3]) {
        Some(rows) => StatementKind::Rows(RowStatement {
            table: caps[1].to_string(),
            columns,
            rows,
        }),
        None => StatementKind::Unrecognized,
    }
}

fn unquote_ident(ident: &str) -> &str {
    let stripped = ident
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| ident.strip_prefix('`').and_then(|s| s.strip_suffix('`')))
        .or_else(|| ident.strip_prefix('[').and_then(|s| s.strip_suffix(']')));
    stripped.unwrap_or(ident)
}

/// Tokenize a `(...), (...)` tuple list.
pub fn parse_tuples(input: &str) -> Option<Vec<Vec<Literal>>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tuples = Vec::new();
    let mut i = 0;

    loop {
        skip_whitespace(&chars, &mut i);
        if chars.get(i) != Some(&'(') {
            return None;
        }
        i += 1;
        tuples.push(parse_tuple(&chars, &mut i)?);
        skip_whitespace(&chars, &mut i);
        match chars.get(i).copied() {
            None => return Some(tuples),
            Some(',') => i += 1,
            Some(_) => return None,
        }
    }
}

fn skip_whitespace(chars: &[char], i: &mut usize) {
    while *i < chars.len() && chars[*i].is_whitespace() {
        *i += 1;
    }
}

/// Tokenize one tuple; `i` points just past its `(` and ends just past `)`.
fn parse_tuple(chars: &[char], i: &mut usize) -> Option<Vec<Literal>> {
    let mut values = Vec::new();
    loop {
        skip_whitespace(chars, i);
        let c = *chars.get(*i)?;

        if c == '\'' {
            let (text, next) = read_quoted(chars, *i)?;
            values.push(Literal::Text(text));
            *i = next;
        } else if (c == 'X' || c == 'x') && chars.get(*i + 1) == Some(&'\'') {
            let (hex, next) = read_quoted(chars, *i + 1)?;
            if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                return None;
            }
            values.push(Literal::Blob(hex.to_ascii_uppercase()));
            *i = next;
        } else {
            let start = *i;
            while *i < chars.len() && chars[*i] != ',' && chars[*i] != ')' {
                *i += 1;
            }
            let token: String = chars[start..*i].iter().collect();
            let token = token.trim();
            if token.is_empty() || token.contains(&['(', '\'', '"'][..]) {
                return None;
            }
            if token.eq_ignore_ascii_case("NULL") {
                values.push(Literal::Null);
            } else {
                values.push(Literal::Bare(token.to_string()));
            }
        }

        skip_whitespace(chars, i);
        match *chars.get(*i)? {
            ',' => *i += 1,
            ')' => {
                *i += 1;
                return Some(values);
            }
            _ => return None,
        }
    }
}

/// Read a `'...'` literal starting at `start`; returns the unescaped text
/// and the index just past the closing quote.
fn read_quoted(chars: &[char], start: usize) -> Option<(String, usize)> {
    let mut text = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == '\'' {
            if chars.get(i + 1) == Some(&'\'') {
                text.push('\'');
                i += 2;
                continue;
            }
            return Some((text, i + 1));
        }
        text.push(chars[i]);
        i += 1;
    }
    None
}

/// Text form of a stored value, as used for primary-key comparison.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(r) => Some(real_text(*r)),
        Value::Text(s) => Some(s.clone()),
        Value::Blob(b) => Some(hex_upper(b)),
    }
}

/// Integral reals print without a fraction, so `'3'` in a REAL column
/// writes back as `'3'`.
fn real_text(r: f64) -> String {
    if r.fract() == 0.0 && r.abs() < 1e15 {
        format!("{}", r as i64)
    } else {
        format!("{r:?}")
    }
}

/// Canonical number text of a literal, if it reads as a number.
pub fn numeric_text(literal: &str) -> Option<String> {
    let literal = literal.trim();
    if let Ok(i) = literal.parse::<i64>() {
        return Some(i.to_string());
    }
    let r = literal.parse::<f64>().ok()?;
    r.is_finite().then(|| real_text(r))
}

fn hex_upper(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02X}");
    }
    out
}

/// Render one value as a SQL literal. Everything but NULL and blobs is
/// single-quoted, with embedded quotes doubled.
pub fn render_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Blob(b) => format!("X'{}'", hex_upper(b)),
        other => {
            let text = value_text(other).unwrap_or_default();
            format!("'{}'", text.replace('\'', "''"))
        }
    }
}

/// Serialize a row as one statement, without a line terminator. Text with
/// line breaks keeps them, so the statement may span several lines.
pub fn serialize_row(table: &str, columns: &[String], values: &[Value]) -> String {
    let literals: Vec<String> = values.iter().map(render_literal).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({});",
        table,
        columns.join(", "),
        literals.join(", ")
    )
}
