use crate::error::BattdegError;

/// Names of the four monotonic counter columns in a source file. The cyclers
/// in the lab exported two header dialects, so the layout is data, not code:
/// it is resolved against a file's header row exactly once, at ingestion, and
/// everything downstream works on typed fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnLayout {
    pub cycle_index: &'static str,
    pub elapsed_time: &'static str,
    pub charge: &'static str,
    pub discharge: &'static str,
}

/// Arbin-style sheets (CS2/CX2 cells).
pub const ARBIN: ColumnLayout = ColumnLayout {
    cycle_index: "Cycle_Index",
    elapsed_time: "Test_Time(s)",
    charge: "Charge_Capacity(Ah)",
    discharge: "Discharge_Capacity(Ah)",
};

/// PL-sample CSV exports.
pub const PL_SAMPLES: ColumnLayout = ColumnLayout {
    cycle_index: "Cycle",
    elapsed_time: "Time_sec",
    charge: "Charge_Ah",
    discharge: "Discharge_Ah",
};

/// Positions of the counter columns in one file's header row, plus the
/// positions and names of every other column, carried through verbatim.
#[derive(Clone, Debug)]
pub struct ColumnIndices {
    pub cycle_index: usize,
    pub elapsed_time: usize,
    pub charge: usize,
    pub discharge: usize,
    pub extra: Vec<usize>,
    pub extra_headers: Vec<String>,
}

impl ColumnLayout {
    /// Resolve this layout against a header row. All missing required
    /// columns are reported together, so one failed run names every problem.
    pub fn resolve(&self, headers: &[String]) -> Result<ColumnIndices, BattdegError> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);

        let mut missing = Vec::new();
        let cycle_index = find(self.cycle_index);
        let elapsed_time = find(self.elapsed_time);
        let charge = find(self.charge);
        let discharge = find(self.discharge);

        for (idx, name) in [
            (&cycle_index, self.cycle_index),
            (&elapsed_time, self.elapsed_time),
            (&charge, self.charge),
            (&discharge, self.discharge),
        ] {
            if idx.is_none() {
                missing.push(name);
            }
        }
        if !missing.is_empty() {
            return Err(BattdegError::schema(missing));
        }

        let required = [
            cycle_index.unwrap(),
            elapsed_time.unwrap(),
            charge.unwrap(),
            discharge.unwrap(),
        ];
        let mut extra = Vec::new();
        let mut extra_headers = Vec::new();
        for (i, h) in headers.iter().enumerate() {
            if !required.contains(&i) {
                extra.push(i);
                extra_headers.push(h.trim().to_string());
            }
        }

        Ok(ColumnIndices {
            cycle_index: required[0],
            elapsed_time: required[1],
            charge: required[2],
            discharge: required[3],
            extra,
            extra_headers,
        })
    }
}

/// Try the known dialects in turn. Used when the settings do not pin one.
pub fn detect_layout(headers: &[String]) -> Result<(ColumnLayout, ColumnIndices), BattdegError> {
    for layout in [ARBIN, PL_SAMPLES] {
        if let Ok(indices) = layout.resolve(headers) {
            return Ok((layout, indices));
        }
    }
    // Neither dialect fits; report against the Arbin names.
    Err(ARBIN.resolve(headers).unwrap_err())
}

/// One sampled measurement from the cycler. The four counters are cumulative
/// within a file and reset at every new file; `extras` holds the remaining
/// cells of the source row (current, voltage, ...) verbatim.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub cycle_index: i64,
    pub elapsed_time: f64,
    pub charge_ah: f64,
    pub discharge_ah: f64,
    pub extras: Vec<String>,
}

/// The records of one source file, in file order. `extra_headers` applies to
/// every record's `extras`, in the same order. `source` is the originating
/// filename, kept so diagnostics can point at a concrete export.
#[derive(Clone, Debug, Default)]
pub struct FileUnit {
    pub records: Vec<Record>,
    pub extra_headers: Vec<String>,
    pub source: String,
}

/// File units concatenated into one stream with file-continuous counters.
/// A record's position in `records` is its ordinal in the merged timeline.
#[derive(Clone, Debug, Default)]
pub struct MergedTimeline {
    pub records: Vec<Record>,
    pub extra_headers: Vec<String>,
}

impl MergedTimeline {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
