//! Extraction of telemetry records from one raw logger document.
//!
//! A document starts with a fixed-size header. The vehicle name sits in the
//! second tab-separated field of the fifth header line. After the header comes
//! a tab-separated table whose first line holds the column names.

use crate::error::{FeedError, Result};
use crate::record::{coerce_gear, coerce_number, TelemetryRecord};

/// Number of header lines preceding the column-name line.
pub const HEADER_LINES: usize = 15;
/// Zero-based header line carrying the vehicle name.
pub const VEHICLE_ID_LINE: usize = 4;
/// Zero-based tab field of [`VEHICLE_ID_LINE`] carrying the vehicle name.
pub const VEHICLE_ID_FIELD: usize = 1;

pub const TIME_COLUMN: &str = "Time";
pub const GEAR_COLUMN: &str = "TransGear[TransGear]";
pub const VEHICLE_SPEED_COLUMN: &str = "VehicleSpeed[mph]";
pub const ENGINE_SPEED_COLUMN: &str = "EngineSpeed[rpm]";

/// A raw document handed over by whatever reads the logger export.
#[derive(Debug, Clone)]
pub struct RawDocument {
    /// Name used in error reports, usually the file name.
    pub name: String,
    pub text: String,
}

impl RawDocument {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

/// Records extracted from one document.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub vehicle_id: String,
    pub records: Vec<TelemetryRecord>,
}

struct ColumnIndex {
    time: usize,
    gear: usize,
    vehicle_speed: usize,
    engine_speed: usize,
    width: usize,
}

impl ColumnIndex {
    fn from_header(document: &str, header: &str) -> Result<Self> {
        let names: Vec<&str> = header.split('\t').map(str::trim).collect();
        let find = |column: &str| {
            names
                .iter()
                .position(|n| *n == column)
                .ok_or_else(|| FeedError::parse(document, format!("missing column {column}")))
        };
        Ok(Self {
            time: find(TIME_COLUMN)?,
            gear: find(GEAR_COLUMN)?,
            vehicle_speed: find(VEHICLE_SPEED_COLUMN)?,
            engine_speed: find(ENGINE_SPEED_COLUMN)?,
            width: names.len(),
        })
    }
}

/// Parses one document into records tagged with the document's vehicle name.
///
/// A document whose header or column layout does not match is rejected as a
/// whole. Unparseable numeric cells do not reject anything; they become `None`.
pub fn parse_document(doc: &RawDocument) -> Result<ParsedDocument> {
    let lines: Vec<&str> = doc
        .text
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .collect();

    let vehicle_id = lines
        .get(VEHICLE_ID_LINE)
        .and_then(|line| line.split('\t').nth(VEHICLE_ID_FIELD))
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            FeedError::parse(
                &doc.name,
                format!(
                    "no vehicle name in field {} of header line {}",
                    VEHICLE_ID_FIELD + 1,
                    VEHICLE_ID_LINE + 1
                ),
            )
        })?
        .to_string();

    if lines.len() <= HEADER_LINES {
        return Err(FeedError::parse(
            &doc.name,
            format!(
                "expected {} header lines followed by a column header, found {} lines",
                HEADER_LINES,
                lines.len()
            ),
        ));
    }

    let mut body = lines[HEADER_LINES..]
        .iter()
        .enumerate()
        .map(|(i, l)| (HEADER_LINES + i + 1, *l))
        .filter(|(_, l)| !l.trim().is_empty());

    let (_, header) = body
        .next()
        .ok_or_else(|| FeedError::parse(&doc.name, "missing column header line"))?;
    let columns = ColumnIndex::from_header(&doc.name, header)?;

    let mut records = Vec::new();
    for (line_no, line) in body {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() > columns.width {
            return Err(FeedError::parse(
                &doc.name,
                format!(
                    "line {line_no}: expected {} fields, saw {}",
                    columns.width,
                    fields.len()
                ),
            ));
        }
        let cell = |idx: usize| fields.get(idx).copied().unwrap_or("");
        records.push(TelemetryRecord {
            vehicle_id: vehicle_id.clone(),
            time: cell(columns.time).to_string(),
            trans_gear: coerce_gear(cell(columns.gear)),
            vehicle_speed_mph: coerce_number(cell(columns.vehicle_speed)),
            engine_speed_rpm: coerce_number(cell(columns.engine_speed)),
        });
    }

    tracing::debug!(
        "parsed document {}: vehicle={} rows={}",
        doc.name,
        vehicle_id,
        records.len()
    );
    Ok(ParsedDocument {
        vehicle_id,
        records,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds a document in the logger layout with the given data rows.
    pub(crate) fn logger_document(vehicle: &str, rows: &[(&str, &str, &str, &str)]) -> String {
        let mut text = String::new();
        for i in 0..HEADER_LINES {
            if i == VEHICLE_ID_LINE {
                text.push_str(&format!("CarName\t{vehicle}\n"));
            } else {
                text.push_str(&format!("Header{i}\tvalue\n"));
            }
        }
        text.push_str("Time\tTransGear[TransGear]\tVehicleSpeed[mph]\tEngineSpeed[rpm]\tThrottle[%]\n");
        for (time, gear, mph, rpm) in rows {
            text.push_str(&format!("{time}\t{gear}\t{mph}\t{rpm}\t100\n"));
        }
        text
    }

    #[test]
    fn parses_vehicle_and_rows() {
        let text = logger_document(
            "Car 10",
            &[("0.00", "3", "120.5", "9800"), ("0.01", "3", "121.0", "bad")],
        );
        let records = parse_document(&RawDocument::new("car10.txt", text))
            .unwrap()
            .records;
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.vehicle_id == "Car 10"));
        assert_eq!(records[0].time, "0.00");
        assert_eq!(records[0].trans_gear, Some(3));
        assert_eq!(records[0].engine_speed_rpm, Some(9800.0));
        assert_eq!(records[1].engine_speed_rpm, None);
    }

    #[test]
    fn handles_crlf_and_blank_lines() {
        let text = logger_document("Car 3", &[("1.5", "2", "80", "7000")]).replace('\n', "\r\n")
            + "\r\n\r\n";
        let records = parse_document(&RawDocument::new("car3.txt", text)).unwrap().records;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].vehicle_id, "Car 3");
        assert_eq!(records[0].vehicle_speed_mph, Some(80.0));
    }

    #[test]
    fn document_without_rows_still_names_vehicle() {
        let parsed = parse_document(&RawDocument::new("idle.txt", logger_document("Car 8", &[]))).unwrap();
        assert_eq!(parsed.vehicle_id, "Car 8");
        assert!(parsed.records.is_empty());
    }

    #[test]
    fn time_is_kept_as_written() {
        let text = logger_document("Car 2", &[(" 00:01.250 ", "4", "130", "9900")]);
        let records = parse_document(&RawDocument::new("car2.txt", text)).unwrap().records;
        assert_eq!(records[0].time, " 00:01.250 ");
    }

    #[test]
    fn rejects_short_header() {
        let err = parse_document(&RawDocument::new("short.txt", "a\nb\nc\n")).unwrap_err();
        match err {
            FeedError::Parse { document, .. } => assert_eq!(document, "short.txt"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn rejects_missing_column() {
        let text = logger_document("Car 1", &[("0", "1", "10", "5000")])
            .replace("EngineSpeed[rpm]", "EngineSpeed[rps]");
        let err = parse_document(&RawDocument::new("car1.txt", text)).unwrap_err();
        assert!(err.to_string().contains("EngineSpeed[rpm]"));
    }

    #[test]
    fn rejects_overlong_row() {
        let mut text = logger_document("Car 1", &[]);
        text.push_str("0\t1\t10\t5000\t100\textra\n");
        let err = parse_document(&RawDocument::new("car1.txt", text)).unwrap_err();
        assert!(err.to_string().contains("expected 5 fields"));
    }

    #[test]
    fn short_rows_become_missing_values() {
        let mut text = logger_document("Car 1", &[]);
        text.push_str("0.2\t4\n");
        let records = parse_document(&RawDocument::new("car1.txt", text)).unwrap().records;
        assert_eq!(records[0].trans_gear, Some(4));
        assert_eq!(records[0].vehicle_speed_mph, None);
        assert_eq!(records[0].engine_speed_rpm, None);
    }
}
