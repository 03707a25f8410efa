use super::engine::nearest_rank_index;
use super::types::{RiskAssessment, RiskFactor, SimulationRun};

/// Average first-withdrawal rate, percent, above which withdrawals are flagged.
const SUSTAINABLE_WITHDRAWAL_RATE_PCT: f64 = 4.0;
// Mean std dev of year-over-year changes.
const VOLATILITY_SENSITIVITY_THRESHOLD: f64 = 0.5;

// Without retained runs only the timing statistics are available.
pub fn analyze(simulations: &[SimulationRun], failure_years: &[u32]) -> RiskAssessment {
    if failure_years.is_empty() {
        return RiskAssessment {
            median_failure_year: None,
            earliest_failure: None,
            risk_factors: vec![RiskFactor::NoFailuresObserved],
        };
    }

    let mut sorted = failure_years.to_vec();
    sorted.sort_unstable();
    let median = sorted[nearest_rank_index(sorted.len(), 50.0)];
    let earliest = sorted[0];

    let mut risk_factors = Vec::new();
    if has_early_depletion(&sorted) {
        risk_factors.push(RiskFactor::EarlyDepletion);
    }

    let depleted: Vec<&SimulationRun> = simulations.iter().filter(|r| r.is_depleted()).collect();

    let withdrawal_rates: Vec<f64> = depleted
        .iter()
        .filter_map(|run| initial_withdrawal_rate(run))
        .collect();
    if mean(&withdrawal_rates).is_some_and(|avg| avg > SUSTAINABLE_WITHDRAWAL_RATE_PCT) {
        risk_factors.push(RiskFactor::UnsustainableWithdrawalRate);
    }

    let swings: Vec<f64> = depleted
        .iter()
        .filter_map(|run| year_over_year_volatility(run))
        .collect();
    if mean(&swings).is_some_and(|avg| avg > VOLATILITY_SENSITIVITY_THRESHOLD) {
        risk_factors.push(RiskFactor::VolatilitySensitivity);
    }

    RiskAssessment {
        median_failure_year: Some(median),
        earliest_failure: Some(earliest),
        risk_factors,
    }
}

// Any failure at or below the 25th-percentile failure year. The earliest
// failure always qualifies, so this fires whenever failures exist.
fn has_early_depletion(sorted_failure_years: &[u32]) -> bool {
    let p25 = sorted_failure_years[nearest_rank_index(sorted_failure_years.len(), 25.0)];
    sorted_failure_years.iter().any(|&year| year <= p25)
}

/// First non-zero annual withdrawal as a percentage of the run's first
/// recorded balance.
fn initial_withdrawal_rate(run: &SimulationRun) -> Option<f64> {
    let initial_balance = run.years.first()?.portfolio_value;
    if initial_balance <= 0.0 {
        return None;
    }
    let first_withdrawal = run.years.iter().find(|y| y.withdrawal > 0.0)?.withdrawal;
    Some(first_withdrawal / initial_balance * 100.0)
}

fn year_over_year_volatility(run: &SimulationRun) -> Option<f64> {
    let changes: Vec<f64> = run
        .years
        .windows(2)
        .filter(|pair| pair[0].portfolio_value > 0.0)
        .map(|pair| (pair[1].portfolio_value - pair[0].portfolio_value) / pair[0].portfolio_value)
        .collect();

    let avg = mean(&changes)?;
    let variance = changes.iter().map(|c| (c - avg).powi(2)).sum::<f64>() / changes.len() as f64;
    Some(variance.sqrt())
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}
