//! Solver options.
//!
//! A keyed mapping from option names to string values. The factories parse
//! values on demand; anything unparsable is a configuration error reported
//! before the first iteration.
//!
//! Sources, in increasing priority: built-in defaults, a preset, an options
//! file (`key value` per line, `#` comments), explicit `set` calls (the
//! command line).

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::error::ConfigurationError;

/// String-keyed option map.
#[derive(Debug, Clone)]
pub struct Options {
    values: HashMap<String, String>,
}

impl Default for Options {
    fn default() -> Self {
        let mut options = Self {
            values: HashMap::new(),
        };
        for (key, value) in DEFAULTS {
            options.values.insert((*key).to_string(), (*value).to_string());
        }
        options
    }
}

/// Built-in defaults (the `filtersqp` combination).
const DEFAULTS: &[(&str, &str)] = &[
    // main ingredients
    ("mechanism", "TR"),
    ("strategy", "filter"),
    ("constraint-relaxation", "feasibility-restoration"),
    ("subproblem", "QP"),
    // trust region
    ("TR_radius", "10"),
    ("TR_increase_factor", "2"),
    ("TR_decrease_factor", "2"),
    ("TR_min_radius", "1e-16"),
    ("TR_activity_tolerance", "1e-6"),
    // line search
    ("LS_backtracking_ratio", "0.5"),
    ("LS_min_step_length", "1e-6"),
    ("LS_max_iterations", "30"),
    // l1 relaxation
    ("l1_relaxation_initial_parameter", "1"),
    ("l1_relaxation_decrease_factor", "10"),
    ("l1_relaxation_epsilon1", "0.1"),
    ("l1_relaxation_epsilon2", "0.1"),
    ("l1_relaxation_penalty_threshold", "1e-10"),
    ("elastic_objective_coefficient", "1"),
    // globalization strategy
    ("armijo_decrease_fraction", "1e-8"),
    ("filter_beta", "0.999"),
    ("filter_gamma", "0.001"),
    ("filter_switching_fraction", "1e-4"),
    ("filter_capacity", "50"),
    ("nonmonotone_filter_memory", "3"),
    // subproblem / solvers
    ("QP_solver", "PDQP"),
    ("LP_solver", "PDQP"),
    ("hessian_model", "exact"),
    ("proximal_coefficient", "0.01"),
    ("use_proximal_term", "no"),
    // residuals and termination
    ("residual_norm", "INF"),
    ("tolerance", "1e-8"),
    ("small_step_tolerance", "1e-9"),
    ("max_iterations", "300"),
    // miscellaneous
    ("scale_functions", "no"),
    ("scaling_threshold", "100"),
    ("enforce_linear_constraints", "no"),
    ("print_solution", "no"),
    ("verbose", "no"),
];

impl Options {
    /// Apply a named preset on top of the current values.
    pub fn apply_preset(&mut self, preset: &str) -> Result<(), ConfigurationError> {
        let assignments: &[(&str, &str)] = match preset {
            // Byrd-Nocedal-Waltz steering: line search on the l1 penalty
            "byrd" => &[
                ("mechanism", "LS"),
                ("strategy", "penalty"),
                ("constraint-relaxation", "l1-relaxation"),
                ("subproblem", "QP"),
            ],
            // Fletcher-Leyffer filter SQP: trust region + restoration
            "filtersqp" => &[
                ("mechanism", "TR"),
                ("strategy", "filter"),
                ("constraint-relaxation", "feasibility-restoration"),
                ("subproblem", "QP"),
            ],
            // interior-point configuration (requires a barrier subproblem)
            "ipopt" => &[
                ("mechanism", "LS"),
                ("strategy", "nonmonotone-filter"),
                ("constraint-relaxation", "feasibility-restoration"),
                ("subproblem", "barrier"),
            ],
            _ => {
                return Err(ConfigurationError::InvalidValue {
                    option: "preset".to_string(),
                    value: preset.to_string(),
                })
            }
        };
        for (key, value) in assignments {
            self.set(key, value);
        }
        Ok(())
    }

    /// Read `key value` lines from an options file. `#` starts a comment.
    pub fn load_file(&mut self, path: &Path) -> Result<(), ConfigurationError> {
        let content = std::fs::read_to_string(path).map_err(|error| {
            ConfigurationError::OptionsFile {
                path: path.display().to_string(),
                reason: error.to_string(),
            }
        })?;
        for line in content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();
            let key = fields.next().unwrap();
            let value = fields.next().ok_or_else(|| ConfigurationError::OptionsFile {
                path: path.display().to_string(),
                reason: format!("line '{}' has no value", line),
            })?;
            self.set(key, value);
        }
        Ok(())
    }

    /// Set an option value.
    pub fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    /// Raw string value of an option.
    pub fn get(&self, key: &str) -> Result<&str, ConfigurationError> {
        self.values
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| ConfigurationError::UnknownOption(key.to_string()))
    }

    /// Floating-point value of an option.
    pub fn get_f64(&self, key: &str) -> Result<f64, ConfigurationError> {
        let value = self.get(key)?;
        value.parse().map_err(|_| ConfigurationError::InvalidValue {
            option: key.to_string(),
            value: value.to_string(),
        })
    }

    /// Integer value of an option.
    pub fn get_usize(&self, key: &str) -> Result<usize, ConfigurationError> {
        let value = self.get(key)?;
        value.parse().map_err(|_| ConfigurationError::InvalidValue {
            option: key.to_string(),
            value: value.to_string(),
        })
    }

    /// Boolean option with values `yes`/`no`.
    pub fn get_bool(&self, key: &str) -> Result<bool, ConfigurationError> {
        match self.get(key)? {
            "yes" => Ok(true),
            "no" => Ok(false),
            other => Err(ConfigurationError::InvalidValue {
                option: key.to_string(),
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.values.keys().collect();
        keys.sort();
        for key in keys {
            writeln!(f, "{} {}", key, self.values[key])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_typed_getters() {
        let options = Options::default();
        assert_eq!(options.get("mechanism").unwrap(), "TR");
        assert_eq!(options.get_f64("TR_radius").unwrap(), 10.0);
        assert_eq!(options.get_usize("max_iterations").unwrap(), 300);
        assert!(!options.get_bool("scale_functions").unwrap());
    }

    #[test]
    fn test_unknown_and_invalid() {
        let mut options = Options::default();
        assert!(options.get("no_such_option").is_err());

        options.set("TR_radius", "big");
        assert!(options.get_f64("TR_radius").is_err());
    }

    #[test]
    fn test_presets() {
        let mut options = Options::default();
        options.apply_preset("byrd").unwrap();
        assert_eq!(options.get("mechanism").unwrap(), "LS");
        assert_eq!(options.get("constraint-relaxation").unwrap(), "l1-relaxation");

        assert!(options.apply_preset("unknown").is_err());
    }

    #[test]
    fn test_options_file() {
        let dir = std::env::temp_dir();
        let path = dir.join("solver_core_options_test.txt");
        std::fs::write(&path, "# comment\nTR_radius 42 # inline\nverbose yes\n").unwrap();

        let mut options = Options::default();
        options.load_file(&path).unwrap();
        assert_eq!(options.get_f64("TR_radius").unwrap(), 42.0);
        assert!(options.get_bool("verbose").unwrap());

        std::fs::remove_file(&path).ok();
    }
}
