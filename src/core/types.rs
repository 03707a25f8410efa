use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

use super::error::ValidationError;

pub const HORIZON_AGE: u32 = 95;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetirementInputs {
    pub current_age: u32,
    pub retirement_age: u32,
    pub current_savings: f64,
    pub monthly_contribution: f64,
    /// Annual nominal return, percent.
    pub expected_return: f64,
    /// Annual inflation, percent.
    pub inflation_rate: f64,
    /// Annual income drawn in retirement, withdrawn in twelve equal parts.
    pub desired_retirement_income: f64,
}

impl RetirementInputs {
    pub fn retirement_years(&self) -> u32 {
        self.retirement_age.saturating_sub(self.current_age)
    }

    pub fn projection_years(&self) -> u32 {
        HORIZON_AGE.saturating_sub(self.current_age)
    }

    pub fn monthly_withdrawal(&self) -> f64 {
        self.desired_retirement_income / 12.0
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("currentSavings", self.current_savings),
            ("monthlyContribution", self.monthly_contribution),
            ("expectedReturn", self.expected_return),
            ("inflationRate", self.inflation_rate),
            ("desiredRetirementIncome", self.desired_retirement_income),
        ] {
            if !value.is_finite() {
                return Err(ValidationError::NonFinite { field });
            }
        }

        if self.retirement_age <= self.current_age {
            return Err(ValidationError::RetirementNotAfterCurrent {
                current_age: self.current_age,
                retirement_age: self.retirement_age,
            });
        }

        if self.current_age >= HORIZON_AGE {
            return Err(ValidationError::HorizonExhausted {
                current_age: self.current_age,
                horizon_age: HORIZON_AGE,
            });
        }

        if self.retirement_age > HORIZON_AGE {
            return Err(ValidationError::RetirementBeyondHorizon {
                retirement_age: self.retirement_age,
                horizon_age: HORIZON_AGE,
            });
        }

        for (field, value) in [
            ("currentSavings", self.current_savings),
            ("monthlyContribution", self.monthly_contribution),
            ("desiredRetirementIncome", self.desired_retirement_income),
        ] {
            if value < 0.0 {
                return Err(ValidationError::NegativeAmount { field, value });
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulationConfig {
    pub simulation_runs: u32,
    /// Annual standard deviation of returns, percent.
    pub market_volatility: f64,
    pub inflation_mean: f64,
    pub inflation_volatility: f64,
    pub random_seed: Option<u64>,
    pub retain_runs: bool,
    pub worker_threads: usize,
    pub start_year: Option<i32>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            simulation_runs: 1_000,
            market_volatility: 15.0,
            inflation_mean: 2.5,
            inflation_volatility: 1.0,
            random_seed: None,
            retain_runs: true,
            worker_threads: 0,
            start_year: None,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.simulation_runs == 0 {
            return Err(ValidationError::NoSimulationRuns);
        }

        for (field, value) in [
            ("marketVolatility", self.market_volatility),
            ("inflationMean", self.inflation_mean),
            ("inflationVolatility", self.inflation_volatility),
        ] {
            if !value.is_finite() {
                return Err(ValidationError::NonFinite { field });
            }
        }

        for (field, value) in [
            ("marketVolatility", self.market_volatility),
            ("inflationVolatility", self.inflation_volatility),
        ] {
            if value < 0.0 {
                return Err(ValidationError::NegativeVolatility { field, value });
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearlyOutcome {
    pub year: i32,
    pub age: u32,
    pub portfolio_value: f64,
    pub contribution: f64,
    pub withdrawal: f64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalState {
    Survived,
    Depleted,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimulationRun {
    pub years: Vec<YearlyOutcome>,
}

impl SimulationRun {
    pub fn len(&self) -> usize {
        self.years.len()
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }

    pub fn terminal_value(&self) -> f64 {
        self.years.last().map_or(0.0, |y| y.portfolio_value)
    }

    pub fn terminal_state(&self) -> TerminalState {
        if self.terminal_value() > 0.0 {
            TerminalState::Survived
        } else {
            TerminalState::Depleted
        }
    }

    pub fn is_depleted(&self) -> bool {
        self.terminal_state() == TerminalState::Depleted
    }

    pub fn failure_year(&self) -> Option<u32> {
        self.years
            .iter()
            .position(|y| y.portfolio_value <= 0.0)
            .map(|idx| idx as u32)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonteCarloOutput {
    pub success_rate: f64,
    pub median: f64,
    pub percentile95: f64,
    pub percentile5: f64,
    pub simulations: Vec<SimulationRun>,
    pub failure_years: Vec<u32>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RiskFactor {
    NoFailuresObserved,
    EarlyDepletion,
    UnsustainableWithdrawalRate,
    VolatilitySensitivity,
}

impl fmt::Display for RiskFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NoFailuresObserved => "No failures observed",
            Self::EarlyDepletion => "High risk of early depletion",
            Self::UnsustainableWithdrawalRate => "Withdrawal rate may be unsustainable",
            Self::VolatilitySensitivity => "High sensitivity to market volatility",
        };
        f.write_str(text)
    }
}

impl Serialize for RiskFactor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub median_failure_year: Option<u32>,
    pub earliest_failure: Option<u32>,
    pub risk_factors: Vec<RiskFactor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionYear {
    pub year: i32,
    pub age: u32,
    pub starting_balance: f64,
    pub contributions: f64,
    pub interest_earned: f64,
    pub ending_balance: f64,
}
