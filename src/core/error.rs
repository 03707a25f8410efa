use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("retirement age ({retirement_age}) must be greater than current age ({current_age})")]
    RetirementNotAfterCurrent { current_age: u32, retirement_age: u32 },

    #[error("current age ({current_age}) leaves no projection years before age {horizon_age}")]
    HorizonExhausted { current_age: u32, horizon_age: u32 },

    #[error("retirement age ({retirement_age}) must not exceed the horizon age ({horizon_age})")]
    RetirementBeyondHorizon { retirement_age: u32, horizon_age: u32 },

    #[error("{field} must be >= 0, got {value}")]
    NegativeAmount { field: &'static str, value: f64 },

    #[error("{field} volatility must be >= 0, got {value}")]
    NegativeVolatility { field: &'static str, value: f64 },

    #[error("{field} must be a finite number")]
    NonFinite { field: &'static str },

    #[error("simulationRuns must be > 0")]
    NoSimulationRuns,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimulationError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("simulation cancelled before all runs completed")]
    Cancelled,

    #[error("failed to build worker pool: {message}")]
    ThreadPool { message: String },
}
