//! Wind-field resolution per weather situation.
//!
//! Policy: prefer a stored field over recomputation; flat unobstructed
//! terrain always computes fresh because the diagnostic profile is cheaper
//! than a file read. Whatever the path, the returned field satisfies the
//! mass-consistency contract before the transport engine sees it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::Domain;
use crate::meteo::WeatherSituation;
use crate::wind::diagnostic::enforce_mass_consistency;
use crate::wind::field::WindField;
use crate::wind::microscale::{self, apply_vegetation_adjustment};
use crate::wind::profile::initial_field;
use crate::wind::store::{FieldStore, WindClassKey};
use crate::wind::WindError;

/// Numerical controls for the diagnostic and microscale solvers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Gauss-Seidel sweeps per continuity enforcement.
    pub poisson_iterations: usize,
    /// Gauss-Seidel residual target.
    pub poisson_tolerance: f32,
    /// Continuity re-projection rounds of the microscale solver.
    pub microscale_outer: usize,
    /// Field-change target (m/s) that ends the re-projection early.
    pub microscale_tolerance: f32,
    /// Accepted divergence of a finished field (1/s).
    pub divergence_tolerance: f32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            poisson_iterations: 200,
            poisson_tolerance: 1.0e-4,
            microscale_outer: 8,
            microscale_tolerance: 0.02,
            divergence_tolerance: 0.1,
        }
    }
}

/// A resolved field plus provenance for persistence decisions.
pub struct SolvedField {
    pub field: Arc<WindField>,
    pub key: WindClassKey,
    /// True when the field was computed this situation (and should be
    /// handed to the flow-field writer).
    pub freshly_computed: bool,
}

/// Resolves wind fields, caching computes by wind class.
pub struct WindFieldSolver {
    config: SolverConfig,
    store: FieldStore,
}

impl WindFieldSolver {
    #[must_use]
    pub fn new(config: SolverConfig, store: FieldStore) -> Self {
        Self { config, store }
    }

    /// Resolve the wind field for the situation.
    ///
    /// # Errors
    /// `WindError::UnreadableField` when a stored snapshot exists but is
    /// corrupt, and `WindError::NotConverged` when the finished field
    /// violates the divergence contract. Both are situation-level faults:
    /// the control loop logs and skips.
    pub fn solve(
        &mut self,
        situation: &WeatherSituation,
        domain: &Domain,
    ) -> Result<SolvedField, WindError> {
        let key = WindClassKey::from_situation(situation);
        let geometry = domain.geometry();

        // Fast path: flat terrain without obstacles is cheaper to compute
        // than to read back.
        if !domain.needs_microscale() {
            let mut field = initial_field(situation, domain);
            enforce_mass_consistency(
                &mut field,
                domain,
                self.config.poisson_iterations,
                self.config.poisson_tolerance,
            );
            field.adjustments_applied = true;
            self.check_divergence(&field, domain)?;
            debug!(class = ?key, "diagnostic flat-terrain field computed");
            return Ok(SolvedField {
                field: Arc::new(field),
                key,
                freshly_computed: false,
            });
        }

        // Cache hit (memory or snapshot file) wins over recomputation.
        if let Some(hit) = self.store.lookup(key, geometry.cell_count())? {
            let field = if hit.adjustments_applied {
                hit
            } else {
                // Stored before adjustments were baked in: adjust a copy
                // and replace the cached entry.
                let mut adjusted = (*hit).clone();
                apply_vegetation_adjustment(&mut adjusted, domain);
                let adjusted = Arc::new(adjusted);
                self.store.insert(key, Arc::clone(&adjusted));
                adjusted
            };
            self.check_divergence(&field, domain)?;
            debug!(class = ?key, "wind field reused from store");
            return Ok(SolvedField {
                field,
                key,
                freshly_computed: false,
            });
        }

        info!(class = ?key, "no stored field for class, running microscale solver");
        let field = microscale::solve(situation, domain, &self.config);
        self.check_divergence(&field, domain)?;
        let field = Arc::new(field);
        self.store.insert(key, Arc::clone(&field));
        Ok(SolvedField {
            field,
            key,
            freshly_computed: true,
        })
    }

    fn check_divergence(&self, field: &WindField, domain: &Domain) -> Result<(), WindError> {
        let residual = field.max_divergence(domain.geometry(), domain);
        if residual > self.config.divergence_tolerance {
            return Err(WindError::NotConverged { residual });
        }
        Ok(())
    }
}
