//! CSV upload interpreter
//!
//! Turns raw upload bytes into ordered candidate rows. Header presence is
//! sniffed from the first non-blank line: any alphabetic character there means
//! the line is a header. This is the same heuristic uploaders already rely on,
//! and it misfires on a headerless file whose first name starts with a letter
//! (that row is then read as a header).
//!
//! With headers, columns are resolved case-insensitively, so `name`, `Name`
//! and ` NAME ` all feed the `name` field. Without headers the first three
//! columns are `name`, `address`, `phone`.

use csv::{ReaderBuilder, StringRecord, Trim};
use serde::ser::{Serialize, Serializer};

use crate::error::{InterpretError, InterpretResult};

/// Default row cap per upload
pub const DEFAULT_MAX_ROWS: usize = 20;

/// Columns a header row must provide
pub const REQUIRED_COLUMNS: [&str; 2] = ["name", "address"];

const POSITIONAL_COLUMNS: [&str; 3] = ["name", "address", "phone"];

/// Knobs for [`interpret`]
#[derive(Debug, Clone, Copy)]
pub struct InterpretOptions {
    /// Uploads with more candidate rows than this are rejected
    pub max_rows: usize,
    /// Reject the whole upload when a headerless row has fewer than two
    /// columns, instead of recording a per-row rejection
    pub strict_columns: bool,
}

impl Default for InterpretOptions {
    fn default() -> Self {
        Self {
            max_rows: DEFAULT_MAX_ROWS,
            strict_columns: false,
        }
    }
}

/// Structural problem found while reading a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowDefect {
    /// Headerless row without both a name and an address column
    TooFewColumns { found: usize },
}

/// A row as read from the upload, before any business rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRow {
    /// 1-based position among data rows (the header is not counted)
    pub row_number: usize,
    /// Column name and raw value pairs in column order
    pub fields: Vec<(String, String)>,
    pub defect: Option<RowDefect>,
}

impl CandidateRow {
    /// Case-insensitive column lookup; the first matching column wins
    pub fn field(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key.trim().eq_ignore_ascii_case(column))
            .map(|(_, value)| value.as_str())
    }

    /// The row rendered as a JSON object, kept alongside row errors
    pub fn raw_data(&self) -> String {
        serde_json::to_string(&FieldsView(&self.fields)).unwrap_or_default()
    }
}

struct FieldsView<'a>(&'a [(String, String)]);

impl Serialize for FieldsView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(k, v)| (k, v)))
    }
}

/// Result of interpreting one upload
#[derive(Debug, Clone)]
pub struct InterpretedUpload {
    pub rows: Vec<CandidateRow>,
    pub has_headers: bool,
    /// Header names as written, or the positional names for headerless input
    pub columns: Vec<String>,
}

/// Interpret raw upload bytes
///
/// # Errors
///
/// - [`InterpretError::Decode`] if the bytes are not UTF-8
/// - [`InterpretError::EmptyInput`] if nothing but whitespace was uploaded
/// - [`InterpretError::MissingColumns`] if a header row lacks `name` or `address`
/// - [`InterpretError::NoDataRows`] if a header row is all there is
/// - [`InterpretError::TooFewColumns`] for short headerless rows in strict mode
/// - [`InterpretError::TooManyRows`] if the row cap is exceeded
#[tracing::instrument(skip(raw), fields(bytes = raw.len(), max_rows = options.max_rows))]
pub fn interpret(raw: &[u8], options: InterpretOptions) -> InterpretResult<InterpretedUpload> {
    let text = std::str::from_utf8(raw).map_err(|e| InterpretError::Decode {
        valid_up_to: e.valid_up_to(),
    })?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let first_line = text
        .lines()
        .find(|line| !line.trim().is_empty())
        .ok_or(InterpretError::EmptyInput)?;
    let has_headers = first_line.chars().any(char::is_alphabetic);

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    for record in reader.records() {
        records.push(record?);
    }

    let upload = if has_headers {
        with_headers(records)?
    } else {
        headerless(records, options.strict_columns)?
    };

    if upload.rows.len() > options.max_rows {
        return Err(InterpretError::TooManyRows {
            max: options.max_rows,
            found: upload.rows.len(),
        });
    }

    tracing::debug!(
        rows = upload.rows.len(),
        has_headers = upload.has_headers,
        "Upload interpreted"
    );

    Ok(upload)
}

fn is_blank(record: &StringRecord) -> bool {
    record.iter().all(|field| field.trim().is_empty())
}

fn with_headers(records: Vec<StringRecord>) -> InterpretResult<InterpretedUpload> {
    let mut records = records.into_iter().skip_while(is_blank);
    let header = records.next().ok_or(InterpretError::EmptyInput)?;
    let columns: Vec<String> = header.iter().map(str::to_string).collect();

    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|required| !columns.iter().any(|c| c.trim().eq_ignore_ascii_case(required)))
        .map(|required| required.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(InterpretError::MissingColumns {
            missing,
            available: columns,
        });
    }

    let rows: Vec<CandidateRow> = records
        .enumerate()
        .map(|(idx, record)| CandidateRow {
            row_number: idx + 1,
            fields: columns
                .iter()
                .zip(record.iter())
                .map(|(column, value)| (column.clone(), value.to_string()))
                .collect(),
            defect: None,
        })
        .collect();

    if rows.is_empty() {
        return Err(InterpretError::NoDataRows);
    }

    Ok(InterpretedUpload {
        rows,
        has_headers: true,
        columns,
    })
}

fn headerless(records: Vec<StringRecord>, strict: bool) -> InterpretResult<InterpretedUpload> {
    let mut rows = Vec::with_capacity(records.len());

    for (idx, record) in records.iter().enumerate() {
        let row_number = idx + 1;
        let defect = if record.len() < 2 {
            if strict && !is_blank(record) {
                return Err(InterpretError::TooFewColumns { row: row_number });
            }
            Some(RowDefect::TooFewColumns {
                found: record.len(),
            })
        } else {
            None
        };

        rows.push(CandidateRow {
            row_number,
            fields: POSITIONAL_COLUMNS
                .iter()
                .zip(record.iter())
                .map(|(column, value)| (column.to_string(), value.to_string()))
                .collect(),
            defect,
        });
    }

    Ok(InterpretedUpload {
        rows,
        has_headers: false,
        columns: POSITIONAL_COLUMNS.iter().map(|c| c.to_string()).collect(),
    })
}
