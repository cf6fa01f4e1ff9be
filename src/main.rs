mod cycle_capacity;
mod error;
mod file_reader;
mod schema;
mod settings;
mod timeline;

use std::env;
use std::path::Path;
use std::process::ExitCode;

use csv::Writer;
use log::{error, info, warn};
use rayon::prelude::*;

use cycle_capacity::{per_cycle_capacity, CycleCapacityTable};
use error::BattdegError;
use file_reader::read_experiment;
use schema::ColumnLayout;
use settings::{load_settings, CellSettings};
use timeline::merge_file_units;

fn main() -> ExitCode {
    env_logger::init();

    let settings_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "pipeline_settings.json".to_string());

    let cells = match load_settings(Path::new(&settings_path)) {
        Ok(cells) => cells,
        Err(e) => {
            error!("{settings_path}: {e}");
            return ExitCode::FAILURE;
        }
    };

    // One independent pipeline per cell; they share nothing.
    let failures: usize = cells
        .par_iter()
        .map(|cell| match run_cell(cell) {
            Ok(()) => 0,
            Err(e) => {
                error!("{}: {e}", cell.output_path);
                1
            }
        })
        .sum();

    if failures > 0 {
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// Read, merge, extract, write: the whole pipeline for one cell.
fn run_cell(cell: &CellSettings) -> Result<(), BattdegError> {
    let (units, layout) = read_experiment(cell)?;

    let (merged, breaches) = merge_file_units(&units);
    for b in &breaches {
        warn!(
            "{}: non-monotonic {} in {} at row {}; later files may be over-offset",
            cell.data_dir, b.counter, units[b.unit].source, b.row
        );
    }

    let table = per_cycle_capacity(&merged, cell.baseline);
    write_output(&table, &layout, &cell.output_path)?;

    info!(
        "{}: wrote {} records across {} file(s)",
        cell.output_path,
        table.timeline.len(),
        units.len()
    );
    Ok(())
}

/// Write the merged timeline with the derived capacity columns appended.
/// Counter columns keep the input dialect's names; derived columns follow
/// the lab's established names.
fn write_output(
    table: &CycleCapacityTable,
    layout: &ColumnLayout,
    output_path: &str,
) -> Result<(), BattdegError> {
    let mut wtr = Writer::from_path(output_path)?;

    let mut header = vec![
        layout.cycle_index.to_string(),
        layout.elapsed_time.to_string(),
        layout.charge.to_string(),
        layout.discharge.to_string(),
    ];
    header.extend(table.timeline.extra_headers.iter().cloned());
    header.extend(
        ["charge_cycle_ah", "discharge_cycle_ah", "net_capacity_ah", "capacity_ah"]
            .map(str::to_string),
    );
    wtr.write_record(&header)?;

    for (i, r) in table.timeline.records.iter().enumerate() {
        let mut row = vec![
            r.cycle_index.to_string(),
            r.elapsed_time.to_string(),
            r.charge_ah.to_string(),
            r.discharge_ah.to_string(),
        ];
        row.extend(r.extras.iter().cloned());
        row.push(table.charge_cycle_ah[i].to_string());
        row.push(table.discharge_cycle_ah[i].to_string());
        row.push(table.net_capacity_ah[i].to_string());
        row.push(table.capacity_ah[i].to_string());
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}
