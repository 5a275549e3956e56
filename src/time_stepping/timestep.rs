//! Maximum stable time steps per cell and their global extremes.

use itertools::{Itertools, MinMaxResult};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::algs::communicator::{Communicator, agree_on_failure};
use crate::data::cells::CellData;
use crate::lts_error::LtsWeightsError;

/// Per-cell time steps together with their global minimum and maximum.
///
/// Every process of one communicator holds the same two extremes.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalTimeStepDetails {
    pub global_min_time_step: f64,
    pub global_max_time_step: f64,
    pub time_steps: Vec<f64>,
}

/// CFL element length `cfl * 2 r / (2 order - 1)` of a cell with insphere radius `r`.
pub fn element_length_from_insphere(
    insphere_radius: f64,
    cfl: f64,
    order: u32,
) -> Result<f64, LtsWeightsError> {
    if !(insphere_radius > 0.0) || !(cfl > 0.0) || order == 0 {
        return Err(LtsWeightsError::physical(
            None,
            format!("insphere radius {insphere_radius}, cfl {cfl} and order {order} must be positive"),
        ));
    }
    Ok(cfl * 2.0 * insphere_radius / f64::from(2 * order - 1))
}

/// `min(maximum_allowed, element_length / velocity)` for one cell.
pub fn max_time_step(
    cell: usize,
    velocity: f64,
    element_length: f64,
    maximum_allowed: f64,
) -> Result<f64, LtsWeightsError> {
    if !(velocity > 0.0) || !velocity.is_finite() {
        return Err(LtsWeightsError::physical(
            Some(cell),
            format!("wave velocity must be positive and finite, got {velocity}"),
        ));
    }
    if !(element_length > 0.0) || !element_length.is_finite() {
        return Err(LtsWeightsError::physical(
            Some(cell),
            format!("element length must be positive and finite, got {element_length}"),
        ));
    }
    let dt = (element_length / velocity).min(maximum_allowed);
    if !(dt > 0.0) {
        return Err(LtsWeightsError::physical(
            Some(cell),
            format!("time step underflowed to {dt}"),
        ));
    }
    Ok(dt)
}

/// Maximum stable time step of every local cell.
pub fn compute_max_time_steps(
    cells: &CellData,
    maximum_allowed: f64,
) -> Result<Vec<f64>, LtsWeightsError> {
    if !(maximum_allowed > 0.0) {
        return Err(LtsWeightsError::physical(
            None,
            format!("maximum allowed time step must be positive, got {maximum_allowed}"),
        ));
    }
    let step = |(cell, (&v, &l)): (usize, (&f64, &f64))| max_time_step(cell, v, l, maximum_allowed);

    #[cfg(feature = "rayon")]
    let steps = cells
        .velocities()
        .par_iter()
        .zip(cells.element_lengths().par_iter())
        .enumerate()
        .map(step)
        .collect();
    #[cfg(not(feature = "rayon"))]
    let steps = cells
        .velocities()
        .iter()
        .zip(cells.element_lengths())
        .enumerate()
        .map(step)
        .collect();
    steps
}

/// Compute local time steps, then reduce their extremes over all ranks.
///
/// Collective: every rank must call this. A rank with invalid input still
/// takes part in the failure vote, so its peers return an error instead of
/// waiting forever in the min/max reduction.
pub fn collect_global_time_step_details<C: Communicator>(
    cells: &CellData,
    maximum_allowed: f64,
    comm: &C,
) -> Result<GlobalTimeStepDetails, LtsWeightsError> {
    let time_steps = agree_on_failure(
        comm,
        compute_max_time_steps(cells, maximum_allowed),
        || LtsWeightsError::physical(None, "another rank reported an invalid time step"),
    )?;

    // Neutral elements for ranks without cells.
    let (local_min, local_max) = match time_steps.iter().copied().minmax() {
        MinMaxResult::NoElements => (f64::INFINITY, 0.0),
        MinMaxResult::OneElement(x) => (x, x),
        MinMaxResult::MinMax(lo, hi) => (lo, hi),
    };
    let global_min_time_step = comm.allreduce_min(local_min)?;
    let global_max_time_step = comm.allreduce_max(local_max)?;

    if !global_min_time_step.is_finite() {
        return Err(LtsWeightsError::physical(
            None,
            "no rank owns any cell; global time step is undefined",
        ));
    }

    log::info!(
        "rank {}: time steps in [{global_min_time_step:e}, {global_max_time_step:e}] ({} local cells)",
        comm.rank(),
        time_steps.len()
    );
    Ok(GlobalTimeStepDetails {
        global_min_time_step,
        global_max_time_step,
        time_steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{NoComm, RayonComm};
    use proptest::prelude::*;
    use std::thread;

    #[test]
    fn ceiling_caps_slow_cells() {
        assert_eq!(max_time_step(0, 1.0, 10.0, 2.0).unwrap(), 2.0);
        assert_eq!(max_time_step(0, 10.0, 10.0, 2.0).unwrap(), 1.0);
    }

    #[test]
    fn zero_velocity_is_invalid() {
        let cells = CellData::interior(vec![1000.0, 0.0], 1.0);
        let err = collect_global_time_step_details(&cells, 1.0, &NoComm).unwrap_err();
        assert!(matches!(
            err,
            LtsWeightsError::InvalidPhysicalParameter { cell: Some(1), .. }
        ));
    }

    #[test]
    fn insphere_length_matches_cfl_rule() {
        // order 3: 2 * 0.5 * 1.5 / 5
        let l = element_length_from_insphere(1.5, 0.5, 3).unwrap();
        assert!((l - 0.3).abs() < 1e-15);
        assert!(element_length_from_insphere(1.0, 0.5, 0).is_err());
    }

    #[test]
    fn ranks_agree_on_extremes_and_empty_ranks_are_neutral() {
        let inputs = [vec![100.0, 200.0], vec![], vec![50.0]];
        let handles: Vec<_> = RayonComm::world(3)
            .into_iter()
            .zip(inputs)
            .map(|(comm, v)| {
                thread::spawn(move || {
                    let cells = CellData::interior(v, 1.0);
                    collect_global_time_step_details(&cells, 1.0, &comm).unwrap()
                })
            })
            .collect();
        for h in handles {
            let d = h.join().unwrap();
            assert_eq!(d.global_min_time_step, 1.0 / 200.0);
            assert_eq!(d.global_max_time_step, 1.0 / 50.0);
        }
    }

    #[test]
    fn one_bad_rank_fails_every_rank() {
        let inputs = [vec![100.0], vec![-1.0]];
        let handles: Vec<_> = RayonComm::world(2)
            .into_iter()
            .zip(inputs)
            .map(|(comm, v)| {
                thread::spawn(move || {
                    collect_global_time_step_details(&CellData::interior(v, 1.0), 1.0, &comm)
                })
            })
            .collect();
        for h in handles {
            assert!(matches!(
                h.join().unwrap(),
                Err(LtsWeightsError::InvalidPhysicalParameter { .. })
            ));
        }
    }

    proptest! {
        #[test]
        fn step_is_positive_and_capped(v in 1e-3f64..1e6, l in 1e-6f64..1e3, cap in 1e-6f64..1e3) {
            let dt = max_time_step(0, v, l, cap).unwrap();
            prop_assert!(dt > 0.0);
            prop_assert!(dt <= cap);
        }

        #[test]
        fn extremes_bound_every_step(v in proptest::collection::vec(1.0f64..1e4, 1..50)) {
            let cells = CellData::interior(v, 2.0);
            let d = collect_global_time_step_details(&cells, 1.0, &NoComm).unwrap();
            prop_assert!(d.global_min_time_step > 0.0);
            for &dt in &d.time_steps {
                prop_assert!(d.global_min_time_step <= dt && dt <= d.global_max_time_step);
            }
        }
    }
}
