use crate::schema::{FileUnit, MergedTimeline, Record};

/// The four counters that must never reset across the merged timeline.
pub const COUNTERS: [&str; 4] = ["cycle_index", "elapsed_time", "charge_ah", "discharge_ah"];

/// A decreasing step found in a counter that the instrument promises is
/// monotonic within one file. The offset arithmetic still uses the maximum
/// observed value, so a breach can over-offset every later file; it is
/// reported rather than corrected.
#[derive(Clone, Debug, PartialEq)]
pub struct CounterBreach {
    /// Position of the file unit in the merge input.
    pub unit: usize,
    /// Which counter stepped backwards, named as in [`COUNTERS`].
    pub counter: &'static str,
    /// Row (within the unit) whose value is below its predecessor's.
    pub row: usize,
}

/// Running maxima of the monotonic counters over all units merged so far.
#[derive(Clone, Copy, Debug, Default)]
struct RunningMax {
    cycle_index: i64,
    elapsed_time: f64,
    charge_ah: f64,
    discharge_ah: f64,
}

impl RunningMax {
    fn absorb(&mut self, r: &Record) {
        self.cycle_index = self.cycle_index.max(r.cycle_index);
        self.elapsed_time = self.elapsed_time.max(r.elapsed_time);
        self.charge_ah = self.charge_ah.max(r.charge_ah);
        self.discharge_ah = self.discharge_ah.max(r.discharge_ah);
    }
}

/// Concatenate file units (already in acquisition-date order) into one
/// timeline with file-continuous counters.
///
/// Unit 0 passes through unmodified and seeds the running maxima. Every
/// record of each later unit gets the running maximum of each counter added
/// to that counter, so no counter ever resets mid-stream; the maxima then
/// absorb the adjusted unit. A record's index in the result is its fresh
/// ordinal, the per-file ordinals are discarded.
///
/// Pass-through columns take unit 0's headers; later units' extras are
/// re-mapped by header name and absent columns become empty cells.
///
/// Returns the timeline together with every non-monotonic step found in the
/// raw units (see [`CounterBreach`]).
pub fn merge_file_units(units: &[FileUnit]) -> (MergedTimeline, Vec<CounterBreach>) {
    let mut breaches = Vec::new();
    for (k, unit) in units.iter().enumerate() {
        audit_monotonicity(k, unit, &mut breaches);
    }

    let Some(first) = units.first() else {
        return (MergedTimeline::default(), breaches);
    };

    let mut merged = MergedTimeline {
        records: Vec::with_capacity(units.iter().map(|u| u.records.len()).sum()),
        extra_headers: first.extra_headers.clone(),
    };

    let mut max = RunningMax::default();
    for r in &first.records {
        max.absorb(r);
        merged.records.push(r.clone());
    }

    for unit in &units[1..] {
        let remap = extras_remap(&merged.extra_headers, &unit.extra_headers);
        let offset = max;
        for r in &unit.records {
            let adjusted = Record {
                cycle_index: r.cycle_index + offset.cycle_index,
                elapsed_time: r.elapsed_time + offset.elapsed_time,
                charge_ah: r.charge_ah + offset.charge_ah,
                discharge_ah: r.discharge_ah + offset.discharge_ah,
                extras: remap
                    .iter()
                    .map(|src| match src {
                        Some(i) => r.extras.get(*i).cloned().unwrap_or_default(),
                        None => String::new(),
                    })
                    .collect(),
            };
            max.absorb(&adjusted);
            merged.records.push(adjusted);
        }
    }

    (merged, breaches)
}

/// For each output header, the position of the matching column in the unit
/// being appended, if it has one.
fn extras_remap(out_headers: &[String], unit_headers: &[String]) -> Vec<Option<usize>> {
    out_headers
        .iter()
        .map(|h| unit_headers.iter().position(|u| u == h))
        .collect()
}

fn audit_monotonicity(unit_idx: usize, unit: &FileUnit, out: &mut Vec<CounterBreach>) {
    for (i, pair) in unit.records.windows(2).enumerate() {
        let (prev, cur) = (&pair[0], &pair[1]);
        let row = i + 1;
        let checks: [(bool, &'static str); 4] = [
            (cur.cycle_index < prev.cycle_index, COUNTERS[0]),
            (cur.elapsed_time < prev.elapsed_time, COUNTERS[1]),
            (cur.charge_ah < prev.charge_ah, COUNTERS[2]),
            (cur.discharge_ah < prev.discharge_ah, COUNTERS[3]),
        ];
        for (decreased, counter) in checks {
            if decreased {
                out.push(CounterBreach {
                    unit: unit_idx,
                    counter,
                    row,
                });
            }
        }
    }
}
