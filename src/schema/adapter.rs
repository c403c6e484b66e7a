//! Adapter between session rows and per-subject session sequences
//!
//! This module parses row batches and regroups them by subject so externally
//! collected sessions can go through the same feature pipeline as synthetic ones.

use crate::error::SynthError;
use crate::schema::session_row::{SessionRow, ROW_COLUMNS};
use crate::types::SubjectSessions;
use std::collections::HashMap;
use tracing::warn;

/// Adapter for converting session rows to subject sequences and back
pub struct SessionRowAdapter;

impl SessionRowAdapter {
    /// Parse a JSON string containing an array of rows
    pub fn parse_array(json: &str) -> Result<Vec<SessionRow>, SynthError> {
        let rows: Vec<SessionRow> = serde_json::from_str(json)?;
        for row in &rows {
            row.validate()?;
        }
        Ok(rows)
    }

    /// Parse NDJSON (newline-delimited JSON) containing rows
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<SessionRow>, SynthError> {
        let mut rows = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let row = serde_json::from_str::<SessionRow>(trimmed).map_err(|e| {
                SynthError::ParseError(format!("Failed to parse line {}: {}", line_num + 1, e))
            })?;
            row.validate().map_err(|e| {
                SynthError::ParseError(format!("Invalid row on line {}: {}", line_num + 1, e))
            })?;
            rows.push(row);
        }
        Ok(rows)
    }

    /// Encode rows as NDJSON, one row per line
    pub fn to_ndjson(rows: &[SessionRow]) -> Result<String, SynthError> {
        let mut output = String::new();
        for row in rows {
            output.push_str(&serde_json::to_string(row)?);
            output.push('\n');
        }
        Ok(output)
    }

    /// Parse CSV with a header row naming the row columns, in any order
    pub fn parse_csv(data: &str) -> Result<Vec<SessionRow>, SynthError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(data.as_bytes());
        let headers = reader.headers().map_err(csv_error)?.clone();

        let mut rows = Vec::new();
        let mut record = csv::StringRecord::new();
        while reader.read_record(&mut record).map_err(csv_error)? {
            let line = record.position().map_or(0, |p| p.line());
            let row: SessionRow = record.deserialize(Some(&headers)).map_err(|e| {
                SynthError::ParseError(format!("Failed to parse line {line}: {e}"))
            })?;
            row.validate().map_err(|e| {
                SynthError::ParseError(format!("Invalid row on line {line}: {e}"))
            })?;
            rows.push(row);
        }
        Ok(rows)
    }

    /// Encode rows as CSV with a header line
    pub fn to_csv(rows: &[SessionRow]) -> Result<String, SynthError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer.write_record(ROW_COLUMNS).map_err(csv_error)?;
        for row in rows {
            writer.serialize(row).map_err(csv_error)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| SynthError::Io(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| SynthError::Io(e.to_string()))
    }

    /// Flatten subjects into rows, in subject then session order.
    ///
    /// With `rounded`, metrics are reduced to export precision.
    pub fn to_rows(subjects: &[SubjectSessions], rounded: bool) -> Vec<SessionRow> {
        subjects
            .iter()
            .flat_map(|subject| {
                subject.sessions.iter().map(move |session| {
                    let row = SessionRow::from_record(session, subject.pattern);
                    if rounded {
                        row.rounded()
                    } else {
                        row
                    }
                })
            })
            .collect()
    }

    /// Group rows by subject, keeping subjects in order of first appearance.
    ///
    /// Sessions are sorted by session id. A subject's pattern is taken from its
    /// lowest session id; disagreeing rows are logged and ignored.
    pub fn group(rows: Vec<SessionRow>) -> Vec<SubjectSessions> {
        let mut order: Vec<String> = Vec::new();
        let mut by_subject: HashMap<String, Vec<SessionRow>> = HashMap::new();

        for row in rows {
            if !by_subject.contains_key(&row.subject_id) {
                order.push(row.subject_id.clone());
            }
            by_subject.entry(row.subject_id.clone()).or_default().push(row);
        }

        let mut subjects = Vec::with_capacity(order.len());
        for subject_id in order {
            let Some(mut rows) = by_subject.remove(&subject_id) else {
                continue;
            };
            rows.sort_by_key(|r| r.session_id);

            let pattern = rows[0].pattern_type;
            if rows.iter().any(|r| r.pattern_type != pattern) {
                warn!(subject_id = %subject_id, pattern = %pattern, "conflicting pattern_type rows, keeping first session's");
            }

            subjects.push(SubjectSessions {
                sessions: rows.iter().map(SessionRow::to_record).collect(),
                subject_id,
                pattern,
            });
        }
        subjects
    }
}

fn csv_error(e: csv::Error) -> SynthError {
    SynthError::ParseError(format!("CSV error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TrendPattern;

    fn sample_ndjson() -> &'static str {
        r#"{"subject_id":"SUB_0002","session_id":2,"date":"2024-01-15","memory_accuracy":0.61,"reaction_time_ms":360.0,"pattern_level":5.5,"language_wpm":131.0,"pattern_type":"declining"}
{"subject_id":"SUB_0001","session_id":1,"date":"2024-01-01","memory_accuracy":0.7,"reaction_time_ms":350.0,"pattern_level":6.0,"language_wpm":140.0,"pattern_type":"stable"}

{"subject_id":"SUB_0002","session_id":1,"date":"2024-01-02","memory_accuracy":0.66,"reaction_time_ms":340.0,"pattern_level":5.9,"language_wpm":137.0,"pattern_type":"declining"}
"#
    }

    #[test]
    fn test_parse_ndjson() {
        let rows = SessionRowAdapter::parse_ndjson(sample_ndjson()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].pattern_type, TrendPattern::Declining);
    }

    #[test]
    fn test_parse_ndjson_reports_line() {
        let err = SessionRowAdapter::parse_ndjson("{\"subject_id\": 3}\n").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_parse_array_validates_rows() {
        let json = r#"[{"subject_id":"A","session_id":0,"date":"2024-01-01","memory_accuracy":0.7,"reaction_time_ms":350.0,"pattern_level":6.0,"language_wpm":140.0,"pattern_type":"stable"}]"#;
        assert!(matches!(
            SessionRowAdapter::parse_array(json),
            Err(SynthError::ParseError(_))
        ));
    }

    #[test]
    fn test_group_sorts_sessions() {
        let rows = SessionRowAdapter::parse_ndjson(sample_ndjson()).unwrap();
        let subjects = SessionRowAdapter::group(rows);

        assert_eq!(subjects.len(), 2);
        assert_eq!(subjects[0].subject_id, "SUB_0002");
        assert_eq!(subjects[0].pattern, TrendPattern::Declining);
        let ids: Vec<u32> = subjects[0].sessions.iter().map(|s| s.session_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(subjects[1].len(), 1);
    }

    #[test]
    fn test_ndjson_round_trip_keeps_subjects() {
        let rows = SessionRowAdapter::parse_ndjson(sample_ndjson()).unwrap();
        let subjects = SessionRowAdapter::group(rows);

        let ndjson = SessionRowAdapter::to_ndjson(&SessionRowAdapter::to_rows(&subjects, true)).unwrap();
        assert_eq!(ndjson.lines().count(), 3);

        let regrouped = SessionRowAdapter::group(SessionRowAdapter::parse_ndjson(&ndjson).unwrap());
        assert_eq!(regrouped, subjects);
    }

    #[test]
    fn test_parse_csv_table() {
        let csv = "subject_id,session_id,date,memory_accuracy,reaction_time_ms,pattern_level,language_wpm,pattern_type
SUB_0001,1,2024-01-01,0.712,351.3,6.0,140.0,stable
SUB_0001,2,2024-01-15,0.705,348.9,5.8,138.2,stable
";
        let rows = SessionRowAdapter::parse_csv(csv).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].session_id, 2);
        assert_eq!(rows[1].memory_accuracy, 0.705);
        assert_eq!(rows[0].pattern_type, TrendPattern::Stable);
    }

    #[test]
    fn test_parse_csv_rejects_out_of_range_metric() {
        let csv = "subject_id,session_id,date,memory_accuracy,reaction_time_ms,pattern_level,language_wpm,pattern_type
SUB_0001,1,2024-01-01,0.7,350.0,6.0,140.0,declining
SUB_0001,2,2024-01-15,1.8,350.0,6.0,140.0,declining
";
        let err = SessionRowAdapter::parse_csv(csv).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("line 3"), "{message}");
        assert!(message.contains("memory_accuracy"), "{message}");
    }

    #[test]
    fn test_csv_round_trip_keeps_subjects() {
        let subjects = SessionRowAdapter::group(SessionRowAdapter::parse_ndjson(sample_ndjson()).unwrap());
        let csv = SessionRowAdapter::to_csv(&SessionRowAdapter::to_rows(&subjects, true)).unwrap();

        assert!(csv.starts_with("subject_id,session_id,date,"));
        assert_eq!(csv.lines().count(), 4);

        let regrouped = SessionRowAdapter::group(SessionRowAdapter::parse_csv(&csv).unwrap());
        assert_eq!(regrouped, subjects);
    }

    #[test]
    fn test_parse_ndjson_rejects_out_of_range_metric() {
        let line = r#"{"subject_id":"SUB_0001","session_id":1,"date":"2024-01-01","memory_accuracy":1.8,"reaction_time_ms":350.0,"pattern_level":6.0,"language_wpm":140.0,"pattern_type":"stable"}"#;
        let err = SessionRowAdapter::parse_ndjson(line).unwrap_err();
        assert!(err.to_string().contains("line 1"));
        assert!(err.to_string().contains("memory_accuracy"));
    }
}
