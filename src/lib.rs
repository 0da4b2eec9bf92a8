//! # Plume - Online Gaussian-Process Informative Path Planning
//!
//! Plume simulates a mobile sensing agent that searches for the maximum of an
//! unknown scalar field. The agent keeps an online Gaussian-process surrogate
//! of the field and, at every decision epoch, drives the candidate path with
//! the best acquisition score.
//!
//! ## Key Features
//!
//! - **Online GP**: incremental Schur-complement updates of the Woodbury
//!   inverse with a conditioning check and batch fallback
//! - **Lazy posterior caches**: explicit `Unknown | Computed` cells reset on
//!   every new observation
//! - **Acquisition functions**: UCB, information gain, expected improvement,
//!   max-value entropy search and hotspot heuristics behind one trait
//! - **Lookahead**: Monte Carlo rollouts on a private copy of the model
//! - **Append-only run logs**: one flushed row per epoch
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use plume::builders::PlannerBuilder;
//! use plume::field::GaussianBumpField;
//! use plume::metrics::RunLog;
//! use plume::types::Extent;
//!
//! let field = GaussianBumpField::random(Extent::default(), 3, 0.1, 7).unwrap();
//! let mut planner = PlannerBuilder::new()
//!     .with_seed(7)
//!     .with_field(Box::new(field))
//!     .build()
//!     .unwrap();
//!
//! let mut log = RunLog::create("metrics.txt").unwrap();
//! let completed = planner.run(50, &mut log).unwrap();
//! println!("{} epochs, best value {}", completed, planner.current_max());
//! ```
//!
//! ## Module Organization
//!
//! - [`acquisition`] - Reward modes, scoring rules and max-belief sampling
//! - [`builders`] - Builder for planners
//! - [`config`] - Serializable run configuration
//! - [`debug`] - Numerical health checks
//! - [`error`] - Error types and result handling
//! - [`field`] - Field oracles
//! - [`gp`] - Online Gaussian-process surrogate model
//! - [`kernel`] - RBF kernel and hyperparameter training
//! - [`linalg`] - Cholesky-based dense linear algebra
//! - [`metrics`] - Per-epoch evaluation and run logs
//! - [`paths`] - Candidate path generation
//! - [`planner`] - The decision loop and lookahead planning
//! - [`types`] - Points, poses and path sets

pub mod acquisition;
pub mod builders;
pub mod config;
pub mod debug;
pub mod error;
pub mod field;
pub mod gp;
pub mod kernel;
pub mod linalg;
pub mod metrics;
pub mod paths;
pub mod planner;
pub mod types;

#[cfg(test)]
mod tests;
