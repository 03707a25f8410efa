use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::Datelike;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::error::SimulationError;
use super::random::{NormalSampler, derive_seed, entropy_seed};
use super::types::{
    MonteCarloOutput, RetirementInputs, SimulationConfig, SimulationRun, YearlyOutcome,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunParameters {
    pub current_age: u32,
    pub start_year: i32,
    pub initial_balance: f64,
    pub retirement_years: u32,
    pub projection_years: u32,
    pub monthly_contribution: f64,
    pub monthly_withdrawal: f64,
    pub expected_return_pct: f64,
    pub volatility_pct: f64,
    pub inflation_mean_pct: f64,
    pub inflation_vol_pct: f64,
}

impl RunParameters {
    pub fn new(inputs: &RetirementInputs, config: &SimulationConfig, start_year: i32) -> Self {
        Self {
            current_age: inputs.current_age,
            start_year,
            initial_balance: inputs.current_savings,
            retirement_years: inputs.retirement_years(),
            projection_years: inputs.projection_years(),
            monthly_contribution: inputs.monthly_contribution,
            monthly_withdrawal: inputs.monthly_withdrawal(),
            expected_return_pct: inputs.expected_return,
            volatility_pct: config.market_volatility,
            inflation_mean_pct: config.inflation_mean,
            inflation_vol_pct: config.inflation_volatility,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

struct RunState {
    balance: f64,
    year: u32,
    depleted: bool,
    outcomes: Vec<YearlyOutcome>,
}

impl RunState {
    fn new(params: &RunParameters) -> Self {
        Self {
            balance: params.initial_balance,
            year: 0,
            depleted: false,
            outcomes: Vec::with_capacity(params.projection_years as usize),
        }
    }

    fn finished(&self, params: &RunParameters) -> bool {
        self.depleted || self.year >= params.projection_years
    }

    fn advance_year<R: rand::Rng>(
        &mut self,
        params: &RunParameters,
        sampler: &mut NormalSampler<R>,
    ) {
        let is_retired = self.year >= params.retirement_years;
        let return_mean = params.expected_return_pct / 100.0 / 12.0;
        let return_sd = params.volatility_pct / 100.0 / 12_f64.sqrt();
        let inflation_mean = params.inflation_mean_pct / 1200.0;
        let inflation_sd = params.inflation_vol_pct / 1200.0;

        let mut contribution_total = 0.0;
        let mut withdrawal_total = 0.0;

        for month in 0..12 {
            let monthly_return = sampler.sample(return_mean, return_sd);
            let monthly_inflation = sampler.sample(inflation_mean, inflation_sd);
            let elapsed_months = (self.year * 12 + month) as i32;
            let inflation_factor = (1.0 + monthly_inflation).powi(elapsed_months);

            let contribution = if is_retired {
                0.0
            } else {
                params.monthly_contribution * inflation_factor
            };
            let withdrawal = if is_retired {
                params.monthly_withdrawal * inflation_factor
            } else {
                0.0
            };

            self.balance *= 1.0 + monthly_return;
            self.balance += contribution;
            self.balance -= withdrawal;
            contribution_total += contribution;
            withdrawal_total += withdrawal;

            if self.balance <= 0.0 {
                self.balance = 0.0;
                self.depleted = true;
                break;
            }
        }

        self.outcomes.push(YearlyOutcome {
            year: params.start_year + self.year as i32,
            age: params.current_age + self.year,
            portfolio_value: self.balance,
            contribution: contribution_total,
            withdrawal: withdrawal_total,
        });
        self.year += 1;
    }

    fn into_run(self) -> SimulationRun {
        SimulationRun {
            years: self.outcomes,
        }
    }
}

pub fn run_once<R: rand::Rng>(
    params: &RunParameters,
    sampler: &mut NormalSampler<R>,
) -> SimulationRun {
    let mut state = RunState::new(params);
    while !state.finished(params) {
        state.advance_year(params, sampler);
    }
    state.into_run()
}

fn run_once_cancellable(
    params: &RunParameters,
    sampler: &mut NormalSampler,
    cancel: &CancelToken,
) -> Result<SimulationRun, SimulationError> {
    let mut state = RunState::new(params);
    while !state.finished(params) {
        if cancel.is_cancelled() {
            return Err(SimulationError::Cancelled);
        }
        state.advance_year(params, sampler);
    }
    Ok(state.into_run())
}

#[derive(Debug)]
struct RunSummary {
    terminal_value: f64,
    failure_year: Option<u32>,
    run: Option<SimulationRun>,
}

pub fn run_simulation(
    inputs: &RetirementInputs,
    config: &SimulationConfig,
) -> Result<MonteCarloOutput, SimulationError> {
    run_simulation_with_cancel(inputs, config, &CancelToken::new())
}

pub fn run_simulation_with_cancel(
    inputs: &RetirementInputs,
    config: &SimulationConfig,
    cancel: &CancelToken,
) -> Result<MonteCarloOutput, SimulationError> {
    inputs.validate()?;
    config.validate()?;

    let start_year = config.start_year.unwrap_or_else(current_calendar_year);
    let params = RunParameters::new(inputs, config, start_year);
    let base_seed = config.random_seed.unwrap_or_else(entropy_seed);
    let retain_runs = config.retain_runs;
    let started = Instant::now();

    info!(
        runs = config.simulation_runs,
        projection_years = params.projection_years,
        retirement_years = params.retirement_years,
        worker_threads = config.worker_threads,
        seeded = config.random_seed.is_some(),
        "starting monte carlo simulation"
    );

    let summaries = with_worker_pool(config.worker_threads, || {
        (0..config.simulation_runs)
            .into_par_iter()
            .map(|run_id| {
                let mut sampler = NormalSampler::from_seed(derive_seed(base_seed, run_id));
                let run = run_once_cancellable(&params, &mut sampler, cancel)?;
                let failure_year = if run.is_depleted() {
                    run.failure_year()
                } else {
                    None
                };
                if let Some(year) = failure_year {
                    debug!(run_id, failure_year = year, "run depleted");
                }
                Ok(RunSummary {
                    terminal_value: run.terminal_value(),
                    failure_year,
                    run: retain_runs.then_some(run),
                })
            })
            .collect::<Result<Vec<_>, SimulationError>>()
    })?;

    let summaries = match summaries {
        Ok(summaries) => summaries,
        Err(err) => {
            warn!(error = %err, "monte carlo simulation aborted");
            return Err(err);
        }
    };

    let output = aggregate(summaries);
    info!(
        success_rate = output.success_rate,
        median = output.median,
        failures = output.failure_years.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "monte carlo simulation complete"
    );
    Ok(output)
}

fn with_worker_pool<T, F>(threads: usize, op: F) -> Result<T, SimulationError>
where
    T: Send,
    F: FnOnce() -> T + Send,
{
    if threads == 0 {
        return Ok(op());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| SimulationError::ThreadPool {
            message: e.to_string(),
        })?;
    Ok(pool.install(op))
}

fn aggregate(summaries: Vec<RunSummary>) -> MonteCarloOutput {
    let runs = summaries.len();
    let survived = summaries.iter().filter(|s| s.terminal_value > 0.0).count();

    let mut terminal_values = Vec::with_capacity(runs);
    let mut failure_years = Vec::new();
    let mut simulations = Vec::new();
    for summary in summaries {
        terminal_values.push(summary.terminal_value);
        if let Some(year) = summary.failure_year {
            failure_years.push(year);
        }
        if let Some(run) = summary.run {
            simulations.push(run);
        }
    }
    terminal_values.sort_by(|a, b| a.total_cmp(b));

    MonteCarloOutput {
        success_rate: 100.0 * survived as f64 / runs as f64,
        median: nearest_rank(&terminal_values, 50.0),
        percentile95: nearest_rank(&terminal_values, 95.0),
        percentile5: nearest_rank(&terminal_values, 5.0),
        simulations,
        failure_years,
    }
}

pub(crate) fn nearest_rank_index(len: usize, p: f64) -> usize {
    if len == 0 {
        return 0;
    }
    let rank = (p / 100.0 * len as f64).ceil() as i64 - 1;
    rank.clamp(0, len as i64 - 1) as usize
}

pub(crate) fn nearest_rank(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    sorted[nearest_rank_index(sorted.len(), p)]
}

pub(crate) fn current_calendar_year() -> i32 {
    chrono::Local::now().year()
}
