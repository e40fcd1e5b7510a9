use crate::beam::{to_micro_degrees, CanonicalBeam, FieldLayout, RawBeamRecord};
use crate::config::GateConfig;
use crate::processing::params::ParameterBlock;
use ndarray::{s, ArrayView1};

/// Gates that fit in the output after dropping the leading ones.
pub fn gates_copied(ngates_out: usize, raw_ngates: usize, ngates_dropped: usize) -> usize {
    ngates_out.min(raw_ngates.saturating_sub(ngates_dropped))
}

/// Fills `beam` from a decoded record.
///
/// With `load_data` false only the header is written. Otherwise the gate
/// buffer is zeroed and each active output field is copied from its input
/// position, skipping `ngates_dropped` leading gates.
pub fn load_beam(
    raw: &RawBeamRecord,
    params: &ParameterBlock,
    config: &GateConfig,
    load_data: bool,
    beam: &mut CanonicalBeam,
) {
    let header = raw.header();
    beam.time = header.time;
    beam.azimuth = to_micro_degrees(header.azimuth_deg);
    beam.elevation = to_micro_degrees(header.elevation_deg);
    beam.target_elevation = to_micro_degrees(header.target_elevation_deg);
    beam.volume_num = header.volume_num;
    beam.tilt_num = header.tilt_num;
    beam.scan_mode = header.scan_mode;
    beam.segment_name = raw.segment_name().map(str::to_string);
    beam.field_flag = params.field_flag as u32;
    beam.clear_flags();

    if !load_data {
        return;
    }

    beam.gate_data.fill(0);
    let samples = raw.samples();
    let dropped = if raw.pre_trimmed() { 0 } else { config.ngates_dropped };
    let copied = gates_copied(beam.ngates(), samples.ngates, dropped);

    for out in 0..beam.gate_data.nrows() {
        if !beam.field_active(out) {
            continue;
        }
        let position = match raw {
            RawBeamRecord::Chill(_) => Some(out),
            _ => config.out_field_pos.get(out).copied(),
        };
        let Some(slot) = position.and_then(|pos| samples.slot(pos)) else {
            continue;
        };
        let mut row = beam.gate_data.row_mut(out);
        match samples.layout {
            FieldLayout::Sequential => {
                let run = samples.field_run(slot, dropped, copied);
                row.slice_mut(s![..run.len()]).assign(&ArrayView1::from(run));
            }
            FieldLayout::Interleaved => {
                for gate in 0..copied {
                    row[gate] = samples.sample(slot, gate + dropped);
                }
            }
        }
    }
}
