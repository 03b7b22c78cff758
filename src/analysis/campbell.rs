//! Campbell diagram: modal sweeps over a speed range with mode tracking

use log::{info, warn};

use super::{CampbellOptions, CancelToken, ConvergencePolicy, ModalOptions};
use crate::error::{RotorError, RotorResult};
use crate::math::Mat;
use crate::results::{CampbellResult, ModalResult, ModeJump};
use crate::rotor::RotorSystem;

/// Per-speed modal quantities before tracking
#[derive(Debug, Clone)]
struct Sample {
    wd: Vec<f64>,
    wn: Vec<f64>,
    damping_ratio: Vec<f64>,
    log_dec: Vec<f64>,
    whirl: Vec<f64>,
}

impl From<ModalResult> for Sample {
    fn from(m: ModalResult) -> Self {
        let whirl = m.whirl_values();
        Self {
            wd: m.wd,
            wn: m.wn,
            damping_ratio: m.damping_ratio,
            log_dec: m.log_dec,
            whirl,
        }
    }
}

fn solve_sample<S>(system: &S, speed: f64, modal: &ModalOptions, cancel: Option<&CancelToken>) -> RotorResult<Sample>
where
    S: RotorSystem + ?Sized,
{
    CancelToken::check(cancel)?;
    Ok(system.run_modal(speed, modal)?.into())
}

/// Sweep `speeds` and track the lowest `frequencies` modes
pub fn run_campbell<S>(
    system: &S,
    speeds: &[f64],
    frequencies: usize,
    options: &CampbellOptions,
) -> RotorResult<CampbellResult>
where
    S: RotorSystem + ?Sized,
{
    if speeds.is_empty() {
        return Err(RotorError::InvalidInput("Campbell sweep needs at least one speed".to_string()));
    }
    info!(
        "Campbell sweep over {} speeds ({:.1} to {:.1} rad/s), {frequencies} modes",
        speeds.len(),
        speeds[0],
        speeds[speeds.len() - 1]
    );

    let modal = options.modal.clone().with_num_modes(frequencies);
    let cancel = options.cancel.as_ref();
    let raw = solve_all(system, speeds, &modal, cancel, options.parallel);

    let mut samples: Vec<Option<Sample>> = Vec::with_capacity(speeds.len());
    let mut missing = Vec::new();
    let mut warnings = Vec::new();
    for (i, r) in raw.into_iter().enumerate() {
        match r {
            Ok(s) => samples.push(Some(s)),
            Err(RotorError::EigenSolveFailed { speed }) if options.policy == ConvergencePolicy::BestEffort => {
                let msg = format!("eigensolve failed at speed {speed:.3} rad/s, sample left empty");
                warn!("{msg}");
                warnings.push(msg);
                missing.push(i);
                samples.push(None);
            }
            Err(e) => return Err(e),
        }
    }

    let mut result = CampbellResult {
        speeds: speeds.to_vec(),
        wd: Mat::from_element(speeds.len(), frequencies, f64::NAN),
        wn: Mat::from_element(speeds.len(), frequencies, f64::NAN),
        damping_ratio: Mat::from_element(speeds.len(), frequencies, f64::NAN),
        log_dec: Mat::from_element(speeds.len(), frequencies, f64::NAN),
        whirl_values: Mat::from_element(speeds.len(), frequencies, f64::NAN),
        missing,
        jumps: Vec::new(),
        warnings,
    };

    let mut last: Vec<Option<f64>> = vec![None; frequencies];
    for (i, sample) in samples.iter().enumerate() {
        let Some(sample) = sample else { continue };
        let slots = track(&last, &sample.wd);
        for (mode, slot) in slots.into_iter().enumerate() {
            let Some(slot) = slot else { continue };
            let wd = sample.wd[mode];
            if let Some(prev) = last[slot] {
                let rel = (wd - prev).abs() / prev.abs().max(f64::EPSILON);
                if rel > options.jump_tolerance {
                    let msg = format!(
                        "mode {slot} jumps from {prev:.3} to {wd:.3} rad/s at speed {:.3} rad/s",
                        speeds[i]
                    );
                    warn!("{msg}");
                    result.warnings.push(msg);
                    result.jumps.push(ModeJump {
                        speed_index: i,
                        mode: slot,
                        from: prev,
                        to: wd,
                    });
                }
            }
            result.wd[(i, slot)] = wd;
            result.wn[(i, slot)] = sample.wn[mode];
            result.damping_ratio[(i, slot)] = sample.damping_ratio[mode];
            result.log_dec[(i, slot)] = sample.log_dec[mode];
            result.whirl_values[(i, slot)] = sample.whirl[mode];
            last[slot] = Some(wd);
        }
    }

    let unstable = result.unstable();
    if !unstable.is_empty() {
        warn!("{} unstable (speed, mode) cells in the sweep", unstable.len());
    }
    Ok(result)
}

fn solve_all<S>(
    system: &S,
    speeds: &[f64],
    modal: &ModalOptions,
    cancel: Option<&CancelToken>,
    parallel: bool,
) -> Vec<RotorResult<Sample>>
where
    S: RotorSystem + ?Sized,
{
    #[cfg(feature = "parallel")]
    if parallel {
        use rayon::prelude::*;
        return speeds
            .par_iter()
            .map(|&s| solve_sample(system, s, modal, cancel))
            .collect();
    }
    #[cfg(not(feature = "parallel"))]
    if parallel {
        log::debug!("parallel Campbell requested without the `parallel` feature, running sequentially");
    }

    let mut out = Vec::with_capacity(speeds.len());
    for &s in speeds {
        let r = solve_sample(system, s, modal, cancel);
        let stop = matches!(r, Err(RotorError::Cancelled));
        out.push(r);
        if stop {
            break;
        }
    }
    out
}

/// Assign each new frequency to a tracked slot
///
/// Greedy nearest-neighbour matching against the last known frequency of
/// every slot, closest pairs first. Frequencies left over fill the
/// remaining slots in ascending order.
fn track(last: &[Option<f64>], wd: &[f64]) -> Vec<Option<usize>> {
    let mut pairs: Vec<(f64, usize, usize)> = Vec::new();
    for (mode, &w) in wd.iter().enumerate() {
        for (slot, prev) in last.iter().enumerate() {
            if let Some(p) = prev {
                pairs.push(((w - p).abs(), mode, slot));
            }
        }
    }
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut assigned: Vec<Option<usize>> = vec![None; wd.len()];
    let mut taken = vec![false; last.len()];
    for (_, mode, slot) in pairs {
        if assigned[mode].is_none() && !taken[slot] {
            assigned[mode] = Some(slot);
            taken[slot] = true;
        }
    }

    let mut free = (0..last.len()).filter(|&s| !taken[s]);
    for a in assigned.iter_mut() {
        if a.is_none() {
            *a = free.next();
        }
    }
    assigned
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_reorders_crossing_modes() {
        let last = vec![Some(100.0), Some(110.0)];
        // Sorted ascending, but slot 1 moved below slot 0
        let slots = track(&last, &[104.0, 109.0]);
        assert_eq!(slots, vec![Some(0), Some(1)]);
        let slots = track(&last, &[108.0, 112.0]);
        assert_eq!(slots, vec![Some(1), Some(0)]);
    }

    #[test]
    fn test_track_fills_new_slots_in_order() {
        let last = vec![Some(50.0), None, None];
        let slots = track(&last, &[49.0, 80.0, 90.0]);
        assert_eq!(slots, vec![Some(0), Some(1), Some(2)]);
    }

    #[test]
    fn test_track_more_modes_than_slots() {
        let last = vec![None];
        let slots = track(&last, &[10.0, 20.0]);
        assert_eq!(slots, vec![Some(0), None]);
    }
}
