//! JSON Lines row source.
//!
//! The engine itself consumes [`SourceRow`] values and leaves tabular
//! parsing to the host; this adapter covers the CLI case, where rows
//! arrive as one JSON object per line with a `kind` column naming the
//! record kind and every other entry carrying a cell value.

use std::io::BufRead;

use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::batch::SourceRow;
use crate::record::RawRecord;
use crate::schema::RecordKind;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read row source: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
}

/// Parse a JSON Lines reader into source rows. Blank lines are skipped;
/// any malformed line fails the whole parse, since a broken input file
/// should be fixed rather than half-imported.
pub fn read_rows(reader: impl BufRead) -> Result<Vec<SourceRow>, SourceError> {
    let mut rows = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let number = index + 1;
        if line.trim().is_empty() {
            continue;
        }

        let value: JsonValue =
            serde_json::from_str(&line).map_err(|err| SourceError::Parse {
                line: number,
                message: err.to_string(),
            })?;

        let JsonValue::Object(object) = value else {
            return Err(SourceError::Parse {
                line: number,
                message: "expected a JSON object".to_string(),
            });
        };

        let mut kind: Option<RecordKind> = None;
        let mut fields = RawRecord::new();

        for (key, value) in object {
            if key == "kind" {
                let name = value.as_str().ok_or_else(|| SourceError::Parse {
                    line: number,
                    message: "`kind` must be a string".to_string(),
                })?;
                kind = Some(name.parse().map_err(|message| SourceError::Parse {
                    line: number,
                    message,
                })?);
                continue;
            }

            let cell = match value {
                JsonValue::String(text) => text,
                JsonValue::Bool(flag) => flag.to_string(),
                JsonValue::Number(number) => number.to_string(),
                JsonValue::Null => String::new(),
                other => {
                    return Err(SourceError::Parse {
                        line: number,
                        message: format!("column `{}` holds non-scalar value {}", key, other),
                    });
                }
            };
            fields.insert(key, cell);
        }

        let kind = kind.ok_or_else(|| SourceError::Parse {
            line: number,
            message: "missing `kind` column".to_string(),
        })?;

        rows.push(SourceRow { kind, fields });
    }

    log::debug!("parsed {} source rows", rows.len());
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rows_and_coerces_scalars() {
        let input = concat!(
            r#"{"kind":"course","title":"Rust 101","featured":true,"length":45}"#,
            "\n\n",
            r#"{"kind":"lesson","title":"Ownership","passmark":70.5}"#,
            "\n",
        );

        let rows = read_rows(input.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].kind, RecordKind::Course);
        assert_eq!(rows[0].fields.get("featured").map(String::as_str), Some("true"));
        assert_eq!(rows[0].fields.get("length").map(String::as_str), Some("45"));
        assert_eq!(rows[1].fields.get("passmark").map(String::as_str), Some("70.5"));
    }

    #[test]
    fn unknown_kind_names_the_line() {
        let input = r#"{"kind":"webinar","title":"Nope"}"#;
        let err = read_rows(input.as_bytes()).unwrap_err();
        match err {
            SourceError::Parse { line, message } => {
                assert_eq!(line, 1);
                assert!(message.contains("webinar"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_kind_is_rejected() {
        let input = r#"{"title":"No kind"}"#;
        assert!(matches!(
            read_rows(input.as_bytes()),
            Err(SourceError::Parse { .. })
        ));
    }

    #[test]
    fn nested_values_are_rejected() {
        let input = r#"{"kind":"course","title":"X","meta":{"a":1}}"#;
        assert!(matches!(
            read_rows(input.as_bytes()),
            Err(SourceError::Parse { .. })
        ));
    }
}
