//! Fan-out of independent projection jobs across worker threads.
//!
//! Jobs are drawn from a shared stack; the completion callback runs under
//! the same lock, so callbacks for distinct coords never execute
//! concurrently (but may arrive in any order).

use crate::coords::Coords;
use crate::engine::{CoordProjection, LiftGraph};
use crate::error::{Error, Result};
use std::sync::Mutex;
use std::thread;

struct BatchState<F> {
    jobs: Vec<Coords>,
    on_done: F,
    error: Option<Error>,
}

impl LiftGraph {
    /// Project every coordinate from `ref_species` into `qry_species`,
    /// invoking `on_done(coord, projection)` once per coordinate. With
    /// `n_workers <= 1` everything runs on the calling thread; otherwise
    /// exactly `n_workers` threads share the job stack. A failing worker
    /// records its error and stops; the others drain the remaining jobs,
    /// and the first recorded error is returned after all workers joined.
    pub fn project_coords<F>(
        &self,
        ref_species: &str,
        qry_species: &str,
        ref_coords: &[Coords],
        n_workers: usize,
        on_done: F,
    ) -> Result<()>
    where
        F: FnMut(Coords, CoordProjection) + Send,
    {
        if n_workers <= 1 {
            let mut on_done = on_done;
            let mut jobs = ref_coords.to_vec();
            while let Some(coord) = jobs.pop() {
                let projection = self.project_coord(ref_species, qry_species, coord)?;
                on_done(coord, projection);
            }
            return Ok(());
        }

        let state = Mutex::new(BatchState {
            jobs: ref_coords.to_vec(),
            on_done,
            error: None,
        });

        thread::scope(|scope| {
            for _ in 0..n_workers {
                scope.spawn(|| loop {
                    let coord = {
                        let mut state = state.lock().unwrap();
                        match state.jobs.pop() {
                            Some(coord) => coord,
                            None => return,
                        }
                    };

                    // The projection itself runs without the lock.
                    match self.project_coord(ref_species, qry_species, coord) {
                        Ok(projection) => {
                            let mut state = state.lock().unwrap();
                            (state.on_done)(coord, projection);
                        }
                        Err(e) => {
                            let mut state = state.lock().unwrap();
                            if state.error.is_none() {
                                state.error = Some(e);
                            }
                            return;
                        }
                    }
                });
            }
        });

        match state.into_inner().unwrap().error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Like [`project_coords`](Self::project_coords), collecting the
    /// results instead of calling back. No ordering guarantee.
    pub fn project_coords_collect(
        &self,
        ref_species: &str,
        qry_species: &str,
        ref_coords: &[Coords],
        n_workers: usize,
    ) -> Result<Vec<(Coords, CoordProjection)>> {
        let mut results = Vec::with_capacity(ref_coords.len());
        self.project_coords(ref_species, qry_species, ref_coords, n_workers, |coord, projection| {
            results.push((coord, projection));
        })?;
        Ok(results)
    }
}
