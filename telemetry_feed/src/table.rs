//! Comma-separated table of balanced samples.
//!
//! The column names are consumed by downstream plotting tools and must not
//! change.

use std::io::{Read, Write};

use crate::error::{FeedError, Result};
use crate::record::{coerce_gear, TelemetrySample};

pub const CAR_NAME_COLUMN: &str = "CarName";

/// Header of the balanced table, in order.
pub const BALANCED_COLUMNS: [&str; 5] = [
    CAR_NAME_COLUMN,
    crate::document::TIME_COLUMN,
    crate::document::GEAR_COLUMN,
    crate::document::VEHICLE_SPEED_COLUMN,
    crate::document::ENGINE_SPEED_COLUMN,
];

/// The balanced columns of one sample, in header order.
pub fn sample_fields(sample: &TelemetrySample) -> [String; 5] {
    [
        sample.vehicle_id.clone(),
        sample.time.clone(),
        sample.trans_gear.to_string(),
        sample.vehicle_speed_mph.to_string(),
        sample.engine_speed_rpm.to_string(),
    ]
}

/// Writes the header and one row per sample.
pub fn write_balanced<'a, W: Write>(
    out: W,
    samples: impl IntoIterator<Item = &'a TelemetrySample>,
) -> csv::Result<usize> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(BALANCED_COLUMNS)?;
    let mut rows = 0;
    for sample in samples {
        wtr.write_record(sample_fields(sample))?;
        rows += 1;
    }
    wtr.flush()?;
    Ok(rows)
}

fn table_error(err: csv::Error) -> FeedError {
    let line = err.position().map(|p| p.line() as usize).unwrap_or(0);
    FeedError::malformed_table(line, err.to_string())
}

/// Reads a table written by [`write_balanced`].
///
/// Columns are located by name, so extra columns (such as the ones added by
/// gear inference) are ignored.
pub fn read_balanced<R: Read>(input: R) -> Result<Vec<TelemetrySample>> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(input);
    let names = rdr.headers().map_err(table_error)?.clone();
    let mut index = [0usize; 5];
    for (slot, column) in index.iter_mut().zip(BALANCED_COLUMNS) {
        *slot = names
            .iter()
            .position(|n| n.trim() == column)
            .ok_or_else(|| FeedError::malformed_table(1, format!("missing column {column}")))?;
    }

    let mut samples = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(table_error)?;
        let line_no = record.position().map(|p| p.line() as usize).unwrap_or(0);
        let cell = |k: usize| -> Result<&str> {
            record.get(index[k]).ok_or_else(|| {
                FeedError::malformed_table(line_no, format!("missing {}", BALANCED_COLUMNS[k]))
            })
        };
        let number = |k: usize| -> Result<f64> {
            let raw = cell(k)?;
            raw.trim().parse::<f64>().map_err(|_| {
                FeedError::malformed_table(
                    line_no,
                    format!("{} is not a number: {raw:?}", BALANCED_COLUMNS[k]),
                )
            })
        };
        let gear_raw = cell(2)?;
        let trans_gear = coerce_gear(gear_raw)
            .and_then(|g| u8::try_from(g).ok())
            .ok_or_else(|| {
                FeedError::malformed_table(line_no, format!("invalid gear {gear_raw:?}"))
            })?;
        samples.push(TelemetrySample {
            vehicle_id: cell(0)?.to_string(),
            time: cell(1)?.to_string(),
            trans_gear,
            vehicle_speed_mph: number(3)?,
            engine_speed_rpm: number(4)?,
        });
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample(vehicle: &str, time: &str) -> TelemetrySample {
        TelemetrySample {
            vehicle_id: vehicle.into(),
            time: time.into(),
            trans_gear: 5,
            vehicle_speed_mph: 171.25,
            engine_speed_rpm: 11250.0,
        }
    }

    #[test]
    fn writes_expected_header_and_rows() {
        let mut buf = Vec::new();
        let rows = write_balanced(&mut buf, &[sample("Car 9", "12.01")]).unwrap();
        assert_eq!(rows, 1);
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            "CarName,Time,TransGear[TransGear],VehicleSpeed[mph],EngineSpeed[rpm]\n\
             Car 9,12.01,5,171.25,11250\n"
        );
    }

    #[test]
    fn quoted_names_survive_reading() {
        let samples = vec![
            sample("Smith, \"Jr\"", "0.5"),
            sample("Car 2", "lap 3\nsector 1"),
        ];
        let mut buf = Vec::new();
        write_balanced(&mut buf, &samples).unwrap();
        let back = read_balanced(Cursor::new(buf)).unwrap();
        assert_eq!(back, samples);
    }

    #[test]
    fn reads_columns_by_name() {
        let text = "Extra,EngineSpeed[rpm],CarName,TransGear[TransGear],Time,VehicleSpeed[mph]\n\
                    x,9000,Car 4,3.0,1.25,140\n";
        let back = read_balanced(Cursor::new(text)).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].vehicle_id, "Car 4");
        assert_eq!(back[0].trans_gear, 3);
        assert_eq!(back[0].engine_speed_rpm, 9000.0);
    }

    #[test]
    fn reports_bad_rows_with_line_number() {
        let text = "CarName,Time,TransGear[TransGear],VehicleSpeed[mph],EngineSpeed[rpm]\n\
                    Car 1,0,2,100,9000\n\
                    Car 1,0,2,fast,9000\n";
        match read_balanced(Cursor::new(text)).unwrap_err() {
            FeedError::MalformedTable { line, reason } => {
                assert_eq!(line, 3);
                assert!(reason.contains("VehicleSpeed[mph]"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn ragged_row_is_reported_with_line_number() {
        let text = "CarName,Time,TransGear[TransGear],VehicleSpeed[mph],EngineSpeed[rpm]\n\
                    Car 1,0,2,100,9000\n\
                    Car 1,0,2\n";
        match read_balanced(Cursor::new(text)).unwrap_err() {
            FeedError::MalformedTable { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_header_column_is_rejected() {
        let text = "CarName,Time,VehicleSpeed[mph],EngineSpeed[rpm]\n";
        assert!(read_balanced(Cursor::new(text)).is_err());
    }
}
