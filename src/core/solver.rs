use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::engine::run_simulation;
use super::error::SimulationError;
use super::types::{RetirementInputs, SimulationConfig};

// Common random numbers across candidates.
const DEFAULT_SOLVER_SEED: u64 = 0x5EED_F1AE;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GoalType {
    RequiredContribution,
    MaxIncome,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalSolveConfig {
    pub goal_type: GoalType,
    /// Success rate to reach, percent.
    pub target_success_rate: f64,
    pub search_min: f64,
    pub search_max: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
    pub simulations_per_iteration: u32,
    pub final_simulations: u32,
}

impl GoalSolveConfig {
    pub fn new(goal_type: GoalType, target_success_rate: f64) -> Self {
        let search_max = match goal_type {
            GoalType::RequiredContribution => 20_000.0,
            GoalType::MaxIncome => 500_000.0,
        };
        Self {
            goal_type,
            target_success_rate,
            search_min: 0.0,
            search_max,
            tolerance: 10.0,
            max_iterations: 32,
            simulations_per_iteration: 500,
            final_simulations: 2_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalSolveIteration {
    pub iteration: u32,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub candidate_value: f64,
    pub success_rate: f64,
    pub success_ci_half_width: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalSolveResult {
    pub goal_type: GoalType,
    pub target_success_rate: f64,
    pub search_min: f64,
    pub search_max: f64,
    pub solved_value: Option<f64>,
    pub achieved_success_rate: Option<f64>,
    pub achieved_success_ci_half_width: Option<f64>,
    pub iterations: Vec<GoalSolveIteration>,
    pub converged: bool,
    pub feasible: bool,
    pub message: String,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SolveError {
    #[error("invalid solver configuration: {0}")]
    InvalidConfig(&'static str),

    #[error(transparent)]
    Simulation(#[from] SimulationError),
}

#[derive(Debug, Clone, Copy)]
struct CandidateEval {
    success_rate: f64,
    success_ci_half_width: f64,
}

pub fn solve_goal(
    inputs: &RetirementInputs,
    simulation: &SimulationConfig,
    config: GoalSolveConfig,
) -> Result<GoalSolveResult, SolveError> {
    validate_config(config)?;
    inputs.validate().map_err(SimulationError::from)?;
    simulation.validate().map_err(SimulationError::from)?;

    let simulation = SimulationConfig {
        random_seed: Some(simulation.random_seed.unwrap_or(DEFAULT_SOLVER_SEED)),
        retain_runs: false,
        ..simulation.clone()
    };
    let target = config.target_success_rate;
    let meets = |eval: CandidateEval| eval.success_rate + 1e-12 >= target;

    let mut iterations = Vec::with_capacity(config.max_iterations as usize);
    let low_eval = evaluate_candidate(inputs, &simulation, config, config.search_min)?;
    let high_eval = evaluate_candidate(inputs, &simulation, config, config.search_max)?;

    // Success rises with contribution and falls with income, so each goal has
    // one bound that is "easy" to satisfy and one that is "hard".
    let (easy_bound, hard_bound, easy_eval, hard_eval, noun) = match config.goal_type {
        GoalType::RequiredContribution => (
            config.search_max,
            config.search_min,
            high_eval,
            low_eval,
            "contribution",
        ),
        GoalType::MaxIncome => (
            config.search_min,
            config.search_max,
            low_eval,
            high_eval,
            "income",
        ),
    };

    let mut solved_value = None;
    let mut converged = false;
    let feasible;
    let message;

    if meets(hard_eval) {
        solved_value = Some(hard_bound);
        converged = true;
        feasible = true;
        message = format!("Target already met at the {noun} search bound; widen bounds to refine.");
    } else if !meets(easy_eval) {
        feasible = false;
        message = format!("No feasible {noun} found within the search bounds.");
    } else {
        // `easy` always meets the target and `hard` never does.
        let mut easy = easy_bound;
        let mut hard = hard_bound;
        for it in 1..=config.max_iterations {
            let mid = (easy + hard) * 0.5;
            let eval = evaluate_candidate(inputs, &simulation, config, mid)?;
            iterations.push(record(it, easy.min(hard), easy.max(hard), mid, eval));

            if meets(eval) {
                easy = mid;
            } else {
                hard = mid;
            }

            if (easy - hard).abs() <= config.tolerance {
                converged = true;
                break;
            }
        }
        solved_value = Some(easy);
        feasible = true;
        message = if converged {
            format!("Solved {noun} within tolerance.")
        } else {
            "Reached max iterations before tolerance was met; returning best estimate.".to_string()
        };
    }

    let mut achieved_success_rate = None;
    let mut achieved_success_ci_half_width = None;
    if let Some(value) = solved_value {
        let final_eval = evaluate_candidate(
            inputs,
            &simulation,
            GoalSolveConfig {
                simulations_per_iteration: config.final_simulations,
                ..config
            },
            value,
        )?;
        achieved_success_rate = Some(final_eval.success_rate);
        achieved_success_ci_half_width = Some(final_eval.success_ci_half_width);
    }

    info!(
        goal = ?config.goal_type,
        feasible,
        converged,
        solved_value = solved_value.unwrap_or(f64::NAN),
        iterations = iterations.len(),
        "goal solve finished"
    );

    Ok(GoalSolveResult {
        goal_type: config.goal_type,
        target_success_rate: config.target_success_rate,
        search_min: config.search_min,
        search_max: config.search_max,
        solved_value,
        achieved_success_rate,
        achieved_success_ci_half_width,
        iterations,
        converged,
        feasible,
        message,
    })
}

fn record(iteration: u32, lo: f64, hi: f64, mid: f64, eval: CandidateEval) -> GoalSolveIteration {
    debug!(
        iteration,
        lower_bound = lo,
        upper_bound = hi,
        candidate = mid,
        success_rate = eval.success_rate,
        "goal solve iteration"
    );
    GoalSolveIteration {
        iteration,
        lower_bound: lo,
        upper_bound: hi,
        candidate_value: mid,
        success_rate: eval.success_rate,
        success_ci_half_width: eval.success_ci_half_width,
    }
}

fn evaluate_candidate(
    base_inputs: &RetirementInputs,
    simulation: &SimulationConfig,
    config: GoalSolveConfig,
    candidate_value: f64,
) -> Result<CandidateEval, SimulationError> {
    let mut inputs = base_inputs.clone();
    match config.goal_type {
        GoalType::RequiredContribution => inputs.monthly_contribution = candidate_value.max(0.0),
        GoalType::MaxIncome => inputs.desired_retirement_income = candidate_value.max(0.0),
    }

    let simulation = SimulationConfig {
        simulation_runs: config.simulations_per_iteration.max(1),
        ..simulation.clone()
    };
    let output = run_simulation(&inputs, &simulation)?;
    Ok(CandidateEval {
        success_rate: output.success_rate,
        success_ci_half_width: binomial_ci_half_width(
            output.success_rate,
            simulation.simulation_runs,
        ),
    })
}

/// 95% normal-approximation half-width, in percentage points.
fn binomial_ci_half_width(rate_pct: f64, n: u32) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let p = (rate_pct / 100.0).clamp(0.0, 1.0);
    1.96 * (p * (1.0 - p) / n as f64).sqrt() * 100.0
}

fn validate_config(config: GoalSolveConfig) -> Result<(), SolveError> {
    if !(0.0..=100.0).contains(&config.target_success_rate) {
        return Err(SolveError::InvalidConfig(
            "targetSuccessRate must be between 0 and 100",
        ));
    }
    if !config.search_min.is_finite() || !config.search_max.is_finite() {
        return Err(SolveError::InvalidConfig("search bounds must be finite"));
    }
    if config.search_min < 0.0 {
        return Err(SolveError::InvalidConfig("searchMin must be >= 0"));
    }
    if config.search_max <= config.search_min {
        return Err(SolveError::InvalidConfig(
            "searchMax must be greater than searchMin",
        ));
    }
    if !config.tolerance.is_finite() || config.tolerance <= 0.0 {
        return Err(SolveError::InvalidConfig("tolerance must be > 0"));
    }
    if config.max_iterations == 0 {
        return Err(SolveError::InvalidConfig("maxIterations must be > 0"));
    }
    if config.simulations_per_iteration == 0 {
        return Err(SolveError::InvalidConfig(
            "simulationsPerIteration must be > 0",
        ));
    }
    if config.final_simulations == 0 {
        return Err(SolveError::InvalidConfig("finalSimulations must be > 0"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    // No growth, no inflation, no volatility: every run is the same
    // arithmetic path, so the success rate is either 0 or 100.
    fn deterministic_inputs() -> RetirementInputs {
        RetirementInputs {
            current_age: 93,
            retirement_age: 94,
            current_savings: 0.0,
            monthly_contribution: 0.0,
            expected_return: 0.0,
            inflation_rate: 0.0,
            desired_retirement_income: 1_200.0,
        }
    }

    fn deterministic_simulation() -> SimulationConfig {
        SimulationConfig {
            simulation_runs: 1,
            market_volatility: 0.0,
            inflation_mean: 0.0,
            inflation_volatility: 0.0,
            random_seed: Some(7),
            start_year: Some(2026),
            ..SimulationConfig::default()
        }
    }

    fn deterministic_config(goal_type: GoalType, search_max: f64) -> GoalSolveConfig {
        GoalSolveConfig {
            goal_type,
            target_success_rate: 100.0,
            search_min: 0.0,
            search_max,
            tolerance: 0.5,
            max_iterations: 24,
            simulations_per_iteration: 1,
            final_simulations: 1,
        }
    }

    #[test]
    fn required_contribution_solver_finds_deterministic_solution() {
        // One year saving 12c, then one retired year drawing 1200:
        // survival needs 12c > 1200, so c just above 100.
        let config = deterministic_config(GoalType::RequiredContribution, 400.0);
        let result = solve_goal(&deterministic_inputs(), &deterministic_simulation(), config)
            .expect("solve");

        assert!(result.feasible);
        assert!(result.converged);
        assert_close(
            result.solved_value.expect("value expected"),
            100.0,
            config.tolerance + 0.5,
        );
        assert_close(result.achieved_success_rate.expect("rate"), 100.0, 1e-9);
    }

    #[test]
    fn max_income_solver_finds_deterministic_solution() {
        let mut inputs = deterministic_inputs();
        inputs.current_savings = 500.0;

        // 500 saved, then one retired year drawing the full income: survival
        // needs income < 500.
        let config = deterministic_config(GoalType::MaxIncome, 2_000.0);
        let result = solve_goal(&inputs, &deterministic_simulation(), config).expect("solve");

        assert!(result.feasible);
        assert_close(
            result.solved_value.expect("value expected"),
            500.0,
            config.tolerance + 0.5,
        );
    }

    #[test]
    fn required_contribution_solver_reports_infeasible_when_bounds_too_low() {
        let config = deterministic_config(GoalType::RequiredContribution, 50.0);
        let result = solve_goal(&deterministic_inputs(), &deterministic_simulation(), config)
            .expect("result");

        assert!(!result.feasible);
        assert!(result.solved_value.is_none());
        assert!(result.iterations.is_empty());
    }

    #[test]
    fn already_feasible_lower_bound_short_circuits() {
        let mut inputs = deterministic_inputs();
        inputs.current_savings = 10_000.0;
        let config = deterministic_config(GoalType::RequiredContribution, 400.0);
        let result = solve_goal(&inputs, &deterministic_simulation(), config).expect("result");

        assert_eq!(result.solved_value, Some(0.0));
        assert!(result.iterations.is_empty());
    }

    #[test]
    fn iterations_narrow_the_bracket() {
        let config = deterministic_config(GoalType::RequiredContribution, 400.0);
        let result = solve_goal(&deterministic_inputs(), &deterministic_simulation(), config)
            .expect("solve");

        for pair in result.iterations.windows(2) {
            let before = pair[0].upper_bound - pair[0].lower_bound;
            let after = pair[1].upper_bound - pair[1].lower_bound;
            assert!(after < before);
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = deterministic_config(GoalType::MaxIncome, 100.0);
        config.search_max = -1.0;
        let err = solve_goal(&deterministic_inputs(), &deterministic_simulation(), config)
            .expect_err("bad bounds");
        assert!(matches!(err, SolveError::InvalidConfig(_)));

        let mut config = deterministic_config(GoalType::MaxIncome, 100.0);
        config.target_success_rate = 120.0;
        assert!(solve_goal(&deterministic_inputs(), &deterministic_simulation(), config).is_err());
    }

    #[test]
    fn invalid_inputs_surface_as_simulation_errors() {
        let mut inputs = deterministic_inputs();
        inputs.retirement_age = inputs.current_age;
        let err = solve_goal(
            &inputs,
            &deterministic_simulation(),
            deterministic_config(GoalType::MaxIncome, 100.0),
        )
        .expect_err("invalid inputs");
        assert!(matches!(
            err,
            SolveError::Simulation(SimulationError::Invalid(_))
        ));
    }

    #[test]
    fn ci_half_width_is_zero_at_extremes() {
        assert_eq!(binomial_ci_half_width(100.0, 50), 0.0);
        assert_eq!(binomial_ci_half_width(0.0, 50), 0.0);
        assert!(binomial_ci_half_width(50.0, 100) > 9.0);
    }
}
