//! Error taxonomy for the iteration engine.
//!
//! Three recoverable/terminal families:
//! - [`NumericalError`]: raised at the evaluation and solver boundaries,
//!   caught by the globalization mechanism (radius shrink, backtracking).
//! - [`ConfigurationError`]: unknown option values or missing solvers,
//!   fatal before the first iteration.
//! - [`MechanismError`]: resource exhaustion inside a mechanism, surfaced
//!   to the driver which converts it into a terminal status.
//!
//! Precondition violations (mismatched dimensions, nonpositive radii) are
//! bugs in a collaborator and are enforced with `assert!`.

use thiserror::Error;

/// Numerical failure raised by function evaluations, factorizations or the
/// QP/LP solver. The mechanism recovers locally from these.
#[derive(Error, Debug)]
pub enum NumericalError {
    /// A user function could not be evaluated at the requested point
    #[error("function evaluation failed: {0}")]
    EvaluationFailed(String),

    /// The symmetric-indefinite factorization broke down
    #[error("factorization breakdown: {0}")]
    Factorization(String),

    /// The QP/LP solver reported an internal failure
    #[error("subproblem solver failure: {0}")]
    SubproblemSolver(String),

    /// The subproblem is unbounded below
    #[error("unbounded subproblem")]
    UnboundedSubproblem,
}

/// Invalid configuration, reported at startup before any iteration.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    /// An option key is not known to the option registry
    #[error("unknown option '{0}'")]
    UnknownOption(String),

    /// An option value is not in the admissible set
    #[error("invalid value '{value}' for option '{option}'")]
    InvalidValue {
        /// Option key
        option: String,
        /// Offending value
        value: String,
    },

    /// A solver name was requested that this build does not provide
    #[error("solver '{0}' is not available in this build")]
    MissingSolver(String),

    /// The options file could not be read
    #[error("cannot read options file '{path}': {reason}")]
    OptionsFile {
        /// File path
        path: String,
        /// Underlying I/O error
        reason: String,
    },
}

/// Failure of a globalization mechanism to produce an acceptable iterate.
/// The driver maps these to the `MechanismFailure` terminal status.
#[derive(Error, Debug)]
pub enum MechanismError {
    /// The trust-region radius fell below its floor
    #[error("trust-region radius {radius:e} fell below the minimum {min_radius:e}")]
    TrustRegionTooSmall {
        /// Radius at failure
        radius: f64,
        /// Configured floor
        min_radius: f64,
    },

    /// The line search ran out of step lengths
    #[error("line search failed to find an acceptable step (final step length {step_length:e})")]
    LineSearchFailed {
        /// Step length at failure
        step_length: f64,
    },

    /// A numerical error escaped the mechanism's local recovery
    #[error(transparent)]
    Numerical(#[from] NumericalError),
}

/// Errors of the top-level solve entry point. Anything the driver can turn
/// into a terminal status does not appear here.
#[derive(Error, Debug)]
pub enum SolverError {
    /// Invalid configuration (fatal before the first iteration)
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The initial point could not be evaluated
    #[error("evaluation of the initial iterate failed: {0}")]
    InitialEvaluation(#[from] NumericalError),
}
