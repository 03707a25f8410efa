mod engine;
mod error;
mod projection;
mod random;
mod risk;
mod solver;
mod types;

pub use engine::{
    CancelToken, RunParameters, run_once, run_simulation, run_simulation_with_cancel,
};
pub use error::{SimulationError, ValidationError};
pub use projection::{compound_interest, real_rate_of_return, retirement_projection};
pub use random::{NormalSampler, derive_seed};
pub use risk::analyze;
pub use solver::{
    GoalSolveConfig, GoalSolveIteration, GoalSolveResult, GoalType, SolveError, solve_goal,
};
pub use types::{
    HORIZON_AGE, MonteCarloOutput, ProjectionYear, RetirementInputs, RiskAssessment, RiskFactor,
    SimulationConfig, SimulationRun, TerminalState, YearlyOutcome,
};

pub fn project(inputs: &RetirementInputs) -> Result<Vec<ProjectionYear>, ValidationError> {
    inputs.validate()?;
    Ok(retirement_projection(inputs, engine::current_calendar_year()))
}

pub fn simulate(
    inputs: &RetirementInputs,
    config: Option<&SimulationConfig>,
) -> Result<MonteCarloOutput, SimulationError> {
    match config {
        Some(config) => run_simulation(inputs, config),
        None => run_simulation(inputs, &SimulationConfig::default()),
    }
}

pub fn assess_risk(output: &MonteCarloOutput) -> RiskAssessment {
    analyze(&output.simulations, &output.failure_years)
}
