use std::net::SocketAddr;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::rejection::JsonRejection,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    GoalSolveConfig, GoalType, MonteCarloOutput, RetirementInputs, RiskAssessment,
    SimulationConfig, SimulationError, SolveError, project, run_simulation, solve_goal,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliGoalType {
    RequiredContribution,
    MaxIncome,
}

impl From<CliGoalType> for GoalType {
    fn from(value: CliGoalType) -> Self {
        match value {
            CliGoalType::RequiredContribution => GoalType::RequiredContribution,
            CliGoalType::MaxIncome => GoalType::MaxIncome,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "nestegg",
    about = "Monte Carlo retirement savings projector"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the JSON API over HTTP.
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Print the volatility-free accumulation path in today's money.
    Project(InputArgs),
    /// Run the Monte Carlo simulation and print its aggregates.
    Simulate {
        #[command(flatten)]
        inputs: InputArgs,
        #[command(flatten)]
        simulation: SimulationArgs,
        #[arg(long, help = "Include every yearly trajectory in the output")]
        include_runs: bool,
        #[arg(long, help = "Append a risk assessment of the depleted runs")]
        assess_risk: bool,
    },
    /// Search for the contribution or income that meets a target success rate.
    Solve {
        #[command(flatten)]
        inputs: InputArgs,
        #[command(flatten)]
        simulation: SimulationArgs,
        #[arg(long, value_enum)]
        goal: CliGoalType,
        #[arg(long, default_value_t = 90.0, help = "Target success rate, percent")]
        target_success_rate: f64,
        #[arg(long)]
        search_min: Option<f64>,
        #[arg(long)]
        search_max: Option<f64>,
        #[arg(long)]
        tolerance: Option<f64>,
    },
}

#[derive(Args, Debug, Clone)]
struct InputArgs {
    #[arg(long)]
    current_age: u32,
    #[arg(long)]
    retirement_age: u32,
    #[arg(long, default_value_t = 0.0)]
    current_savings: f64,
    #[arg(long, default_value_t = 0.0)]
    monthly_contribution: f64,
    #[arg(long, default_value_t = 7.0, help = "Annual nominal return, percent")]
    expected_return: f64,
    #[arg(long, default_value_t = 2.5, help = "Annual inflation, percent")]
    inflation_rate: f64,
    #[arg(long, help = "Annual income needed in retirement")]
    desired_retirement_income: f64,
}

impl From<InputArgs> for RetirementInputs {
    fn from(args: InputArgs) -> Self {
        Self {
            current_age: args.current_age,
            retirement_age: args.retirement_age,
            current_savings: args.current_savings,
            monthly_contribution: args.monthly_contribution,
            expected_return: args.expected_return,
            inflation_rate: args.inflation_rate,
            desired_retirement_income: args.desired_retirement_income,
        }
    }
}

#[derive(Args, Debug, Clone)]
struct SimulationArgs {
    #[arg(long, default_value_t = 1_000)]
    simulation_runs: u32,
    #[arg(long, default_value_t = 15.0, help = "Annual return volatility, percent")]
    market_volatility: f64,
    #[arg(long, default_value_t = 2.5)]
    inflation_mean: f64,
    #[arg(long, default_value_t = 1.0)]
    inflation_volatility: f64,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, default_value_t = 0, help = "Worker threads; 0 uses all cores")]
    worker_threads: usize,
}

impl SimulationArgs {
    fn into_config(self, retain_runs: bool) -> SimulationConfig {
        SimulationConfig {
            simulation_runs: self.simulation_runs,
            market_volatility: self.market_volatility,
            inflation_mean: self.inflation_mean,
            inflation_volatility: self.inflation_volatility,
            random_seed: self.seed,
            retain_runs,
            worker_threads: self.worker_threads,
            start_year: None,
        }
    }
}

/// Simulation settings a caller may override; omitted fields keep defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulationOverrides {
    simulation_runs: Option<u32>,
    market_volatility: Option<f64>,
    inflation_mean: Option<f64>,
    inflation_volatility: Option<f64>,
    random_seed: Option<u64>,
    start_year: Option<i32>,
}

impl SimulationOverrides {
    fn into_config(self, retain_runs: bool) -> SimulationConfig {
        let defaults = SimulationConfig::default();
        SimulationConfig {
            simulation_runs: self.simulation_runs.unwrap_or(defaults.simulation_runs),
            market_volatility: self.market_volatility.unwrap_or(defaults.market_volatility),
            inflation_mean: self.inflation_mean.unwrap_or(defaults.inflation_mean),
            inflation_volatility: self
                .inflation_volatility
                .unwrap_or(defaults.inflation_volatility),
            random_seed: self.random_seed,
            retain_runs,
            worker_threads: defaults.worker_threads,
            start_year: self.start_year,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimulatePayload {
    #[serde(flatten)]
    inputs: RetirementInputs,
    #[serde(flatten)]
    simulation: SimulationOverrides,
    #[serde(default)]
    include_runs: bool,
    #[serde(default)]
    assess_risk: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SolvePayload {
    #[serde(flatten)]
    inputs: RetirementInputs,
    #[serde(flatten)]
    simulation: SimulationOverrides,
    goal_type: GoalType,
    target_success_rate: Option<f64>,
    search_min: Option<f64>,
    search_max: Option<f64>,
    tolerance: Option<f64>,
    max_iterations: Option<u32>,
    simulations_per_iteration: Option<u32>,
    final_simulations: Option<u32>,
}

impl SolvePayload {
    fn goal_config(&self) -> GoalSolveConfig {
        let defaults =
            GoalSolveConfig::new(self.goal_type, self.target_success_rate.unwrap_or(90.0));
        GoalSolveConfig {
            search_min: self.search_min.unwrap_or(defaults.search_min),
            search_max: self.search_max.unwrap_or(defaults.search_max),
            tolerance: self.tolerance.unwrap_or(defaults.tolerance),
            max_iterations: self.max_iterations.unwrap_or(defaults.max_iterations),
            simulations_per_iteration: self
                .simulations_per_iteration
                .unwrap_or(defaults.simulations_per_iteration),
            final_simulations: self.final_simulations.unwrap_or(defaults.final_simulations),
            ..defaults
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    #[serde(flatten)]
    output: MonteCarloOutput,
    #[serde(skip_serializing_if = "Option::is_none")]
    risk_assessment: Option<RiskAssessment>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_simulate_response(
    mut output: MonteCarloOutput,
    include_runs: bool,
    with_risk: bool,
) -> SimulateResponse {
    let risk_assessment = with_risk.then(|| crate::core::assess_risk(&output));
    if !include_runs {
        output.simulations.clear();
    }
    SimulateResponse {
        output,
        risk_assessment,
    }
}

/// Executes one CLI invocation.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve { port } => run_http_server(port)
            .await
            .with_context(|| format!("HTTP server on port {port} failed")),
        Command::Project(args) => {
            let rows = project(&args.into())?;
            print_json(&rows)
        }
        Command::Simulate {
            inputs,
            simulation,
            include_runs,
            assess_risk,
        } => {
            let inputs: RetirementInputs = inputs.into();
            let config = simulation.into_config(include_runs || assess_risk);
            let output = tokio::task::spawn_blocking(move || run_simulation(&inputs, &config))
                .await
                .context("simulation worker panicked")??;
            print_json(&build_simulate_response(output, include_runs, assess_risk))
        }
        Command::Solve {
            inputs,
            simulation,
            goal,
            target_success_rate,
            search_min,
            search_max,
            tolerance,
        } => {
            let inputs: RetirementInputs = inputs.into();
            let simulation = simulation.into_config(false);
            let defaults = GoalSolveConfig::new(goal.into(), target_success_rate);
            let config = GoalSolveConfig {
                search_min: search_min.unwrap_or(defaults.search_min),
                search_max: search_max.unwrap_or(defaults.search_max),
                tolerance: tolerance.unwrap_or(defaults.tolerance),
                ..defaults
            };
            let result =
                tokio::task::spawn_blocking(move || solve_goal(&inputs, &simulation, config))
                    .await
                    .context("solver worker panicked")??;
            print_json(&result)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn router() -> Router {
    Router::new()
        .route("/api/project", post(project_handler))
        .route("/api/simulate", post(simulate_handler))
        .route("/api/solve", post(solve_handler))
        .fallback(not_found_handler)
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "retirement projection API listening");

    axum::serve(listener, router()).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn project_handler(payload: Result<Json<RetirementInputs>, JsonRejection>) -> Response {
    let inputs = match payload {
        Ok(Json(inputs)) => inputs,
        Err(rejection) => return rejection_response(rejection),
    };

    match project(&inputs) {
        Ok(rows) => json_response(StatusCode::OK, rows),
        Err(err) => {
            warn!(error = %err, "rejected projection request");
            error_response(StatusCode::BAD_REQUEST, &err.to_string())
        }
    }
}

async fn simulate_handler(payload: Result<Json<SimulatePayload>, JsonRejection>) -> Response {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => return rejection_response(rejection),
    };

    let include_runs = payload.include_runs;
    let with_risk = payload.assess_risk;
    let inputs = payload.inputs;
    let config = payload.simulation.into_config(include_runs || with_risk);

    match tokio::task::spawn_blocking(move || run_simulation(&inputs, &config)).await {
        Ok(Ok(output)) => json_response(
            StatusCode::OK,
            build_simulate_response(output, include_runs, with_risk),
        ),
        Ok(Err(err)) => simulation_error_response(err),
        Err(err) => {
            warn!(error = %err, "simulation worker failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Simulation worker failed")
        }
    }
}

async fn solve_handler(payload: Result<Json<SolvePayload>, JsonRejection>) -> Response {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => return rejection_response(rejection),
    };

    let config = payload.goal_config();
    let inputs = payload.inputs;
    let simulation = payload.simulation.into_config(false);

    match tokio::task::spawn_blocking(move || solve_goal(&inputs, &simulation, config)).await {
        Ok(Ok(result)) => json_response(StatusCode::OK, result),
        Ok(Err(SolveError::Simulation(err))) => simulation_error_response(err),
        Ok(Err(err)) => {
            warn!(error = %err, "rejected solve request");
            error_response(StatusCode::BAD_REQUEST, &err.to_string())
        }
        Err(err) => {
            warn!(error = %err, "solver worker failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Solver worker failed")
        }
    }
}

fn simulation_error_response(err: SimulationError) -> Response {
    let status = match err {
        SimulationError::Invalid(_) => StatusCode::BAD_REQUEST,
        SimulationError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        SimulationError::ThreadPool { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(error = %err, %status, "simulation request failed");
    error_response(status, &err.to_string())
}

fn rejection_response(rejection: JsonRejection) -> Response {
    warn!(error = %rejection, "rejected malformed request body");
    error_response(rejection.status(), &rejection.body_text())
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}
