use crate::schema::{MergedTimeline, Record};

/// How the first record of a cycle segment is baselined against the
/// cumulative counters. Both behaviors exist in the lab's processing
/// scripts, so the choice is a setting rather than a constant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleBaseline {
    /// Subtract the cumulative value of the previous segment's last record.
    /// The boundary record inherits the tail of the prior cycle, matching
    /// the instrument's carry-over across a continuous charge/discharge.
    CarryOver,
    /// Subtract the cumulative value of the segment's own first record, so
    /// every segment starts at zero.
    ZeroBased,
}

/// The merged timeline plus the derived per-cycle capacity columns. The
/// derived vectors run parallel to `timeline.records`; the inputs are never
/// touched.
#[derive(Clone, Debug)]
pub struct CycleCapacityTable {
    pub timeline: MergedTimeline,
    /// Capacity accumulated since the start of the record's own cycle (Ah).
    pub charge_cycle_ah: Vec<f64>,
    pub discharge_cycle_ah: Vec<f64>,
    /// Per-cycle net: `charge_cycle_ah - discharge_cycle_ah`.
    pub net_capacity_ah: Vec<f64>,
    /// Raw-cumulative net: `charge_ah - discharge_ah`. Kept alongside the
    /// per-cycle variant because both are in use downstream; they disagree
    /// on any multi-cycle dataset.
    pub capacity_ah: Vec<f64>,
}

/// Exclusive end offsets of each cycle segment, scanning the records in
/// encounter order. Maximal contiguous runs of equal `cycle_index` form the
/// segments; the merged order is respected, never re-sorted.
pub fn cycle_start_indices(records: &[Record]) -> Vec<usize> {
    let mut bounds = Vec::new();
    let mut iter = records.iter().enumerate().peekable();
    while let Some((i, r)) = iter.next() {
        match iter.peek() {
            Some((_, next)) if next.cycle_index == r.cycle_index => {}
            _ => bounds.push(i + 1),
        }
    }
    bounds
}

/// Recover the incremental capacity within each cycle from the cumulative
/// instrument counters.
///
/// Segment 0 keeps the raw cumulative values. For every later segment
/// spanning `[a, b)`, each record's cumulative counter is rebased by the
/// policy's baseline (see [`CycleBaseline`]). Negative results are passed
/// through as-is; the source data contains instrument artifacts and the
/// downstream model treats them as outliers.
pub fn per_cycle_capacity(timeline: &MergedTimeline, baseline: CycleBaseline) -> CycleCapacityTable {
    let records = &timeline.records;
    let bounds = cycle_start_indices(records);

    let mut charge_cycle_ah: Vec<f64> = records.iter().map(|r| r.charge_ah).collect();
    let mut discharge_cycle_ah: Vec<f64> = records.iter().map(|r| r.discharge_ah).collect();

    for i in 1..bounds.len() {
        let a = bounds[i - 1];
        let b = bounds[i];
        let (charge_base, discharge_base) = match baseline {
            CycleBaseline::CarryOver => (records[a - 1].charge_ah, records[a - 1].discharge_ah),
            CycleBaseline::ZeroBased => (records[a].charge_ah, records[a].discharge_ah),
        };
        for p in a..b {
            charge_cycle_ah[p] = records[p].charge_ah - charge_base;
            discharge_cycle_ah[p] = records[p].discharge_ah - discharge_base;
        }
    }

    let net_capacity_ah = charge_cycle_ah
        .iter()
        .zip(&discharge_cycle_ah)
        .map(|(c, d)| c - d)
        .collect();
    let capacity_ah = records.iter().map(|r| r.charge_ah - r.discharge_ah).collect();

    CycleCapacityTable {
        timeline: timeline.clone(),
        charge_cycle_ah,
        discharge_cycle_ah,
        net_capacity_ah,
        capacity_ah,
    }
}
