use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use csv::Reader;
use log::info;

use crate::error::BattdegError;
use crate::schema::{detect_layout, ColumnLayout, FileUnit, Record};
use crate::settings::{CellSettings, LayoutChoice};

/// Ordering key recovered from a filename. One experiment sticks to one
/// naming convention, so keys within a run are homogeneous.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum AcquisitionKey {
    Date(NaiveDate),
    Index(u32),
}

/// Parse `<cell_type>_<cell_num>_<month>_<day>_<year>.<ext>`. Two-digit
/// years are 2000-relative (the lab's files span 2010..2014).
fn parse_dated(name: &str) -> Option<(String, NaiveDate)> {
    let stem = name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name);
    let parts: Vec<&str> = stem.split('_').collect();
    if parts.len() != 5 {
        return None;
    }
    let month: u32 = parts[2].parse().ok()?;
    let day: u32 = parts[3].parse().ok()?;
    let mut year: i32 = parts[4].parse().ok()?;
    if year < 100 {
        year += 2000;
    }
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some((format!("{}_{}", parts[0], parts[1]), date))
}

/// Parse `<experiment_name>(<file_index>).<ext>`.
fn parse_indexed(name: &str) -> Option<(String, u32)> {
    let open = name.find('(')?;
    let close = name[open..].find(')')? + open;
    let index: u32 = name[open + 1..close].parse().ok()?;
    Some((name[..open].to_string(), index))
}

/// Order a directory listing into true chronological acquisition order,
/// keeping only the files that share `file_name_format`'s experiment prefix
/// and naming convention. Ties on the key fall back to lexical filename
/// order so runs are deterministic.
fn order_file_names(
    names: &[String],
    file_name_format: &str,
    ignore_file_indices: &[u32],
) -> Result<Vec<String>, BattdegError> {
    let mut keyed: Vec<(AcquisitionKey, String)> = Vec::new();

    if let Some((exp_name, _)) = parse_indexed(file_name_format) {
        for name in names {
            if let Some((exp, index)) = parse_indexed(name) {
                if exp == exp_name && !ignore_file_indices.contains(&index) {
                    keyed.push((AcquisitionKey::Index(index), name.clone()));
                }
            }
        }
    } else if let Some((prefix, _)) = parse_dated(file_name_format) {
        for name in names {
            if let Some((p, date)) = parse_dated(name) {
                if p == prefix {
                    keyed.push((AcquisitionKey::Date(date), name.clone()));
                }
            }
        }
    } else {
        return Err(BattdegError::InvalidArgument(format!(
            "file_name_format '{file_name_format}' matches no known naming convention"
        )));
    }

    if keyed.is_empty() {
        return Err(BattdegError::NotFound(format!(
            "no files matching '{file_name_format}' found"
        )));
    }

    keyed.sort();
    Ok(keyed.into_iter().map(|(_, name)| name).collect())
}

fn parse_cell_f64(s: &str, file: &str, line: usize) -> Result<f64, BattdegError> {
    s.trim().parse().map_err(|_| BattdegError::Parse {
        file: file.to_string(),
        line,
        reason: format!("'{s}' is not a number"),
    })
}

fn parse_cell_i64(s: &str, file: &str, line: usize) -> Result<i64, BattdegError> {
    // Some exports write the cycle counter as a float ("3.0").
    if let Ok(v) = s.trim().parse::<i64>() {
        return Ok(v);
    }
    parse_cell_f64(s, file, line).map(|v| v as i64)
}

/// Read one source file into a typed unit. The header row is resolved
/// against the layout before any record is touched, so a malformed file
/// fails on its schema, not mid-parse.
fn read_file_unit(
    path: &Path,
    choice: &LayoutChoice,
) -> Result<(FileUnit, ColumnLayout), BattdegError> {
    let mut rdr = Reader::from_path(path)?;
    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();

    let (layout, indices) = match choice {
        LayoutChoice::Fixed(layout) => (layout.clone(), layout.resolve(&headers)?),
        LayoutChoice::Auto => detect_layout(&headers)?,
    };

    let file = path.display().to_string();
    let mut records = Vec::new();
    for (row, result) in rdr.records().enumerate() {
        let csv_record = result?;
        // Data row 0 sits on file line 2, after the header.
        let line = row + 2;
        let cell = |i: usize| csv_record.get(i).unwrap_or("");
        records.push(Record {
            cycle_index: parse_cell_i64(cell(indices.cycle_index), &file, line)?,
            elapsed_time: parse_cell_f64(cell(indices.elapsed_time), &file, line)?,
            charge_ah: parse_cell_f64(cell(indices.charge), &file, line)?,
            discharge_ah: parse_cell_f64(cell(indices.discharge), &file, line)?,
            extras: indices.extra.iter().map(|&i| cell(i).to_string()).collect(),
        });
    }

    let source = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or(file);

    Ok((
        FileUnit {
            records,
            extra_headers: indices.extra_headers,
            source,
        },
        layout,
    ))
}

/// Read every file of the experiment, delivered in true chronological
/// acquisition order, ready for the merger. Also returns the column layout
/// resolved for the first file so the writer can reuse its names.
pub fn read_experiment(
    settings: &CellSettings,
) -> Result<(Vec<FileUnit>, ColumnLayout), BattdegError> {
    let dir = Path::new(&settings.data_dir);
    if !dir.is_dir() {
        return Err(BattdegError::NotFound(format!(
            "data directory {} does not exist",
            dir.display()
        )));
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.path().is_file() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }

    let ordered = order_file_names(
        &names,
        &settings.file_name_format,
        &settings.ignore_file_indices,
    )?;
    info!(
        "{}: reading {} file(s) matching '{}'",
        settings.data_dir,
        ordered.len(),
        settings.file_name_format
    );

    let mut units = Vec::new();
    let mut first_layout = None;
    for name in &ordered {
        let (unit, layout) = read_file_unit(&dir.join(name), &settings.layout)?;
        first_layout.get_or_insert(layout);
        units.push(unit);
    }

    // order_file_names guarantees at least one match.
    let layout = first_layout.expect("at least one file unit");
    Ok((units, layout))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn dated_names_sort_chronologically() {
        let listing = names(&[
            "CS2_33_1_5_11.csv",
            "CS2_33_8_17_10.csv",
            "CS2_33_12_30_10.csv",
            "CS2_34_1_1_10.csv",
            "readme.txt",
        ]);
        let ordered = order_file_names(&listing, "CS2_33_8_17_10.csv", &[]).unwrap();
        assert_eq!(
            ordered,
            names(&["CS2_33_8_17_10.csv", "CS2_33_12_30_10.csv", "CS2_33_1_5_11.csv"])
        );
    }

    #[test]
    fn indexed_names_sort_by_index_with_ignores() {
        let listing = names(&["PL12(10).csv", "PL12(2).csv", "PL12(4).csv", "PL13(1).csv"]);
        let ordered = order_file_names(&listing, "PL12(4).csv", &[2]).unwrap();
        assert_eq!(ordered, names(&["PL12(4).csv", "PL12(10).csv"]));
    }

    #[test]
    fn no_matches_is_not_found() {
        let listing = names(&["PL12(1).csv"]);
        assert!(matches!(
            order_file_names(&listing, "PL99(1).csv", &[]),
            Err(BattdegError::NotFound(_))
        ));
    }

    #[test]
    fn unknown_convention_is_invalid_argument() {
        let listing = names(&["data.csv"]);
        assert!(matches!(
            order_file_names(&listing, "data.csv", &[]),
            Err(BattdegError::InvalidArgument(_))
        ));
    }

    #[test]
    fn two_digit_years_are_2000_relative() {
        let (_, date) = parse_dated("CX2_16_3_1_11.xlsx").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2011, 3, 1).unwrap());

        let (_, date) = parse_dated("CX2_16_3_1_2011.xlsx").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2011, 3, 1).unwrap());
    }

    #[test]
    fn malformed_dates_rejected() {
        assert!(parse_dated("CX2_16_13_1_11.xlsx").is_none());
        assert!(parse_dated("CX2_16_1_11.xlsx").is_none());
        assert!(parse_indexed("PL12(x).csv").is_none());
        assert!(parse_indexed("PL12.csv").is_none());
    }

    use crate::cycle_capacity::CycleBaseline;
    use std::path::PathBuf;

    fn fixture_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("battdeg_{name}"));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn reads_typed_records_with_extras() {
        let dir = fixture_dir("reads_typed");
        let path = dir.join("PL12(1).csv");
        fs::write(
            &path,
            "Cycle,Time_sec,Charge_Ah,Discharge_Ah,Voltage\n\
             1,0.0,0.0,0.0,3.3\n\
             2,10.0,0.5,0.1,3.1\n",
        )
        .unwrap();

        let (unit, layout) = read_file_unit(&path, &LayoutChoice::Auto).unwrap();
        assert_eq!(layout, crate::schema::PL_SAMPLES);
        assert_eq!(unit.source, "PL12(1).csv");
        assert_eq!(unit.extra_headers, vec!["Voltage"]);
        assert_eq!(unit.records.len(), 2);
        assert_eq!(unit.records[1].cycle_index, 2);
        assert_eq!(unit.records[1].elapsed_time, 10.0);
        assert_eq!(unit.records[1].charge_ah, 0.5);
        assert_eq!(unit.records[1].discharge_ah, 0.1);
        assert_eq!(unit.records[1].extras, vec!["3.1"]);
    }

    #[test]
    fn bad_cell_names_file_and_line() {
        let dir = fixture_dir("bad_cell");
        let path = dir.join("PL12(1).csv");
        fs::write(
            &path,
            "Cycle,Time_sec,Charge_Ah,Discharge_Ah\n\
             1,0.0,0.0,0.0\n\
             1,5.0,not_a_number,0.1\n",
        )
        .unwrap();

        match read_file_unit(&path, &LayoutChoice::Auto).unwrap_err() {
            BattdegError::Parse { file, line, reason } => {
                assert!(file.ends_with("PL12(1).csv"));
                // Header on line 1, first data row on line 2.
                assert_eq!(line, 3);
                assert!(reason.contains("not_a_number"));
            }
            other => panic!("expected Parse, got {other:?}"),
        }
    }

    #[test]
    fn schema_failure_precedes_row_parse() {
        let dir = fixture_dir("schema_first");
        let path = dir.join("PL12(1).csv");
        // The rows are garbage too; the schema must fail first.
        fs::write(&path, "Cycle,Seconds\nx,y\n").unwrap();

        match read_file_unit(&path, &LayoutChoice::Fixed(crate::schema::PL_SAMPLES)).unwrap_err() {
            BattdegError::SchemaError { missing } => {
                assert_eq!(missing, vec!["Time_sec", "Charge_Ah", "Discharge_Ah"]);
            }
            other => panic!("expected SchemaError, got {other:?}"),
        }
    }

    fn cell_settings(dir: &std::path::Path, format: &str, ignore: Vec<u32>) -> CellSettings {
        CellSettings {
            data_dir: dir.display().to_string(),
            file_name_format: format.to_string(),
            ignore_file_indices: ignore,
            layout: LayoutChoice::Auto,
            baseline: CycleBaseline::CarryOver,
            output_path: String::new(),
        }
    }

    #[test]
    fn experiment_delivers_units_in_acquisition_order() {
        let dir = fixture_dir("experiment_order");
        let header = "Cycle,Time_sec,Charge_Ah,Discharge_Ah\n";
        fs::write(dir.join("PL12(2).csv"), format!("{header}1,0.0,0.2,0.0\n")).unwrap();
        fs::write(dir.join("PL12(1).csv"), format!("{header}1,0.0,0.1,0.0\n")).unwrap();
        fs::write(dir.join("PL12(3).csv"), format!("{header}1,0.0,0.3,0.0\n")).unwrap();

        let settings = cell_settings(&dir, "PL12(1).csv", vec![2]);
        let (units, layout) = read_experiment(&settings).unwrap();
        assert_eq!(layout, crate::schema::PL_SAMPLES);
        let sources: Vec<&str> = units.iter().map(|u| u.source.as_str()).collect();
        assert_eq!(sources, vec!["PL12(1).csv", "PL12(3).csv"]);
        assert_eq!(units[1].records[0].charge_ah, 0.3);
    }

    #[test]
    fn missing_data_dir_is_not_found() {
        let dir = std::env::temp_dir().join("battdeg_no_such_dir");
        let _ = fs::remove_dir_all(&dir);
        let settings = cell_settings(&dir, "PL12(1).csv", Vec::new());
        assert!(matches!(
            read_experiment(&settings),
            Err(BattdegError::NotFound(_))
        ));
    }

    #[test]
    fn equal_dates_keep_lexical_order() {
        // Same acquisition date under two export extensions.
        let listing = names(&["CS2_33_1_5_11.xlsx", "CS2_33_1_5_11.csv"]);
        let ordered = order_file_names(&listing, "CS2_33_1_5_11.csv", &[]).unwrap();
        assert_eq!(ordered, names(&["CS2_33_1_5_11.csv", "CS2_33_1_5_11.xlsx"]));
    }
}
