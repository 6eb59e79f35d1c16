//! Command-line front end for the solver-core SQP engine.

mod problems;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use solver_core::{solve, Options};

#[derive(Parser)]
#[command(name = "karush")]
#[command(about = "SQP solver for smooth nonconvex nonlinear programs")]
#[command(after_help = "\
Ingredients can be combined freely:
  --mechanism [LS|TR]
  --strategy [penalty|filter|nonmonotone-filter]
  --constraint-relaxation [feasibility-restoration|l1-relaxation]
  --subproblem [QP|LP|barrier]
  --preset [byrd|filtersqp|ipopt]
Use --list to see the built-in problems.")]
struct Cli {
    /// Name of a built-in problem (see --list)
    problem: Option<String>,

    /// Apply a named ingredient preset first
    #[arg(long)]
    preset: Option<String>,

    /// Globalization mechanism (LS or TR)
    #[arg(long)]
    mechanism: Option<String>,

    /// Globalization strategy
    #[arg(long)]
    strategy: Option<String>,

    /// Constraint-relaxation strategy
    #[arg(long = "constraint-relaxation")]
    constraint_relaxation: Option<String>,

    /// Subproblem kind
    #[arg(long)]
    subproblem: Option<String>,

    /// Options file ("key value" per line, # comments)
    #[arg(long)]
    options_file: Option<PathBuf>,

    /// Additional option overrides, as key=value
    #[arg(long = "option", value_name = "KEY=VALUE")]
    options: Vec<String>,

    /// Print the iteration table
    #[arg(long)]
    verbose: bool,

    /// Print the primal-dual solution
    #[arg(long)]
    print_solution: bool,

    /// List the built-in problems and exit
    #[arg(long)]
    list: bool,
}

fn build_options(cli: &Cli) -> Result<Options> {
    let mut options = Options::default();
    if let Some(preset) = &cli.preset {
        options.apply_preset(preset)?;
    }
    if let Some(path) = &cli.options_file {
        options.load_file(path)?;
    }
    // command line overrides the file
    if let Some(mechanism) = &cli.mechanism {
        options.set("mechanism", mechanism);
    }
    if let Some(strategy) = &cli.strategy {
        options.set("strategy", strategy);
    }
    if let Some(relaxation) = &cli.constraint_relaxation {
        options.set("constraint-relaxation", relaxation);
    }
    if let Some(subproblem) = &cli.subproblem {
        options.set("subproblem", subproblem);
    }
    for assignment in &cli.options {
        let (key, value) = assignment
            .split_once('=')
            .with_context(|| format!("option override '{}' is not key=value", assignment))?;
        options.set(key.trim(), value.trim());
    }
    if cli.verbose {
        options.set("verbose", "yes");
    }
    if cli.print_solution {
        options.set("print_solution", "yes");
    }
    Ok(options)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list {
        println!("Built-in problems:");
        for name in problems::problem_names() {
            println!("  {}", name);
        }
        return Ok(());
    }

    let Some(problem_name) = &cli.problem else {
        bail!("no problem given; use --list to see the built-in problems");
    };
    let problem = problems::create_problem(problem_name)
        .with_context(|| format!("unknown problem '{}'", problem_name))?;

    let options = build_options(&cli)?;
    let result = solve(problem.as_ref(), &options).context("solve failed")?;

    let print_solution = options.get_bool("print_solution").unwrap_or(false);
    result.print(print_solution);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_ingredient_flags() {
        let cli = Cli::parse_from([
            "karush",
            "--mechanism",
            "LS",
            "--constraint-relaxation",
            "l1-relaxation",
            "--option",
            "TR_radius=5",
            "hs71",
        ]);
        assert_eq!(cli.problem.as_deref(), Some("hs71"));
        let options = build_options(&cli).unwrap();
        assert_eq!(options.get("mechanism").unwrap(), "LS");
        assert_eq!(options.get("constraint-relaxation").unwrap(), "l1-relaxation");
        assert_eq!(options.get_f64("TR_radius").unwrap(), 5.0);
    }

    #[test]
    fn test_preset_then_flag_override() {
        let cli = Cli::parse_from(["karush", "--preset", "byrd", "--mechanism", "TR", "circle"]);
        let options = build_options(&cli).unwrap();
        // the preset set LS, the explicit flag wins
        assert_eq!(options.get("mechanism").unwrap(), "TR");
        assert_eq!(options.get("strategy").unwrap(), "penalty");
    }
}
