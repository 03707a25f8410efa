use super::types::{HORIZON_AGE, ProjectionYear, RetirementInputs};

pub fn compound_interest(
    principal: f64,
    monthly_contribution: f64,
    annual_rate_pct: f64,
    years: u32,
) -> f64 {
    let monthly_rate = annual_rate_pct / 100.0 / 12.0;
    let mut balance = principal;
    for _ in 0..years * 12 {
        balance += monthly_contribution;
        balance *= 1.0 + monthly_rate;
    }
    balance
}

/// Fisher-adjusted return, percent.
pub fn real_rate_of_return(nominal_pct: f64, inflation_pct: f64) -> f64 {
    ((1.0 + nominal_pct / 100.0) / (1.0 + inflation_pct / 100.0) - 1.0) * 100.0
}

pub fn retirement_projection(inputs: &RetirementInputs, start_year: i32) -> Vec<ProjectionYear> {
    let real_return = real_rate_of_return(inputs.expected_return, inputs.inflation_rate);
    let yearly_contributions = inputs.monthly_contribution * 12.0;

    let mut balance = inputs.current_savings;
    let last_age = inputs.retirement_age.min(HORIZON_AGE);
    let mut rows = Vec::with_capacity(last_age.saturating_sub(inputs.current_age) as usize + 1);
    for (offset, age) in (inputs.current_age..=last_age).enumerate() {
        let starting_balance = balance;
        balance = compound_interest(balance, inputs.monthly_contribution, real_return, 1);
        rows.push(ProjectionYear {
            year: start_year + offset as i32,
            age,
            starting_balance,
            contributions: yearly_contributions,
            interest_earned: balance - starting_balance - yearly_contributions,
            ending_balance: balance,
        });
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_inputs() -> RetirementInputs {
        RetirementInputs {
            current_age: 30,
            retirement_age: 65,
            current_savings: 50_000.0,
            monthly_contribution: 1_000.0,
            expected_return: 7.0,
            inflation_rate: 2.0,
            desired_retirement_income: 80_000.0,
        }
    }

    #[test]
    fn compound_interest_with_zero_years_returns_principal() {
        assert_approx(compound_interest(1_234.5, 100.0, 12.0, 0), 1_234.5);
    }

    #[test]
    fn compound_interest_with_zero_rate_sums_contributions() {
        assert_approx(compound_interest(1_000.0, 50.0, 0.0, 2), 2_200.0);
    }

    #[test]
    fn compound_interest_adds_contribution_before_growth() {
        // 12% a year is exactly 1% a month.
        // Month 1: (0 + 100) * 1.01 = 101; month 2: (101 + 100) * 1.01 = 203.01.
        let mut expected = 0.0;
        for _ in 0..12 {
            expected = (expected + 100.0) * 1.01;
        }
        assert_approx(compound_interest(0.0, 100.0, 12.0, 1), expected);
        assert!(expected > 1_268.0 && expected < 1_282.0);
    }

    #[test]
    fn real_return_removes_inflation() {
        assert_approx(real_rate_of_return(7.0, 2.0), (1.07 / 1.02 - 1.0) * 100.0);
        assert_approx(real_rate_of_return(3.0, 3.0), 0.0);
        assert!(real_rate_of_return(2.0, 5.0) < 0.0);
    }

    #[test]
    fn projection_covers_current_through_retirement_age() {
        let inputs = sample_inputs();
        let rows = retirement_projection(&inputs, 2026);

        assert_eq!(rows.len(), 36);
        assert_eq!(rows[0].age, 30);
        assert_eq!(rows[0].year, 2026);
        assert_eq!(rows[35].age, 65);
        assert_eq!(rows[35].year, 2061);
        assert_approx(rows[0].starting_balance, 50_000.0);
    }

    #[test]
    fn projection_stops_at_horizon_for_unvalidated_ages() {
        let mut inputs = sample_inputs();
        inputs.retirement_age = 400_000_000;
        let rows = retirement_projection(&inputs, 2026);
        assert_eq!(rows.len(), (HORIZON_AGE - inputs.current_age + 1) as usize);
        assert_eq!(rows.last().map(|r| r.age), Some(HORIZON_AGE));
    }

    #[test]
    fn projection_rows_chain_and_reconcile() {
        let inputs = sample_inputs();
        let rows = retirement_projection(&inputs, 2026);

        for pair in rows.windows(2) {
            assert_approx(pair[1].starting_balance, pair[0].ending_balance);
        }
        for row in &rows {
            assert_approx(row.contributions, 12_000.0);
            assert_approx(
                row.ending_balance,
                row.starting_balance + row.contributions + row.interest_earned,
            );
            assert!(row.interest_earned > 0.0);
        }
    }

    #[test]
    fn projection_matches_single_year_compounding_at_real_rate() {
        let inputs = sample_inputs();
        let rows = retirement_projection(&inputs, 2026);
        let real = real_rate_of_return(7.0, 2.0);
        let first = compound_interest(50_000.0, 1_000.0, real, 1);
        assert_approx(rows[0].ending_balance, first);
        assert_approx(
            rows[1].ending_balance,
            compound_interest(first, 1_000.0, real, 1),
        );
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(32))]

        #[test]
        fn prop_projection_is_bit_identical_across_calls(
            current_age in 18u32..80,
            span in 1u32..15,
            savings in 0u32..2_000_000,
            contribution in 0u32..10_000,
            return_bp in -500i32..1500,
            inflation_bp in 0i32..800
        ) {
            let inputs = RetirementInputs {
                current_age,
                retirement_age: current_age + span,
                current_savings: savings as f64,
                monthly_contribution: contribution as f64,
                expected_return: return_bp as f64 / 100.0,
                inflation_rate: inflation_bp as f64 / 100.0,
                desired_retirement_income: 0.0,
            };

            let a = retirement_projection(&inputs, 2030);
            let b = retirement_projection(&inputs, 2030);
            prop_assert_eq!(a.len(), (span + 1) as usize);
            for (left, right) in a.iter().zip(b.iter()) {
                prop_assert_eq!(left.ending_balance.to_bits(), right.ending_balance.to_bits());
                prop_assert_eq!(left.interest_earned.to_bits(), right.interest_earned.to_bits());
            }
        }

        #[test]
        fn prop_more_contribution_never_lowers_projection(
            savings in 0u32..500_000,
            contribution in 0u32..5_000,
            extra in 1u32..2_000,
            return_bp in 0i32..1200
        ) {
            let rate = return_bp as f64 / 100.0;
            let base = compound_interest(savings as f64, contribution as f64, rate, 10);
            let more = compound_interest(savings as f64, (contribution + extra) as f64, rate, 10);
            prop_assert!(more > base);
        }
    }
}
