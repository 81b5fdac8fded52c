//! Fixed-rate mortgage summary for a prospective purchase.

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

pub const MAX_TERM_YEARS: u32 = 100;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MortgageInput {
    pub house_price: f64,
    pub down_payment: f64,
    /// Annual rate in percent, e.g. `3.2`.
    pub interest_rate: f64,
    /// Years.
    pub loan_term: u32,
    #[serde(default)]
    pub notary_fees: f64,
    #[serde(default)]
    pub registration_tax: f64,
    #[serde(default)]
    pub agency_fees: f64,
    #[serde(default)]
    pub other_costs: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MortgageSummary {
    pub loan_amount: f64,
    pub monthly_payment: f64,
    pub total_payment: f64,
    pub total_interest: f64,
    pub total_costs: f64,
    pub total_investment: f64,
    pub total_house_cost: f64,
}

/// Level payment for `principal` over `months` at `monthly_rate`.
pub fn monthly_payment(principal: f64, monthly_rate: f64, months: u32) -> f64 {
    let n = f64::from(months);
    if monthly_rate == 0.0 {
        return principal / n;
    }
    let growth = (1.0 + monthly_rate).powf(n);
    principal * (monthly_rate * growth) / (growth - 1.0)
}

pub fn calculate(input: &MortgageInput) -> Result<MortgageSummary, AppError> {
    let amounts = [
        ("housePrice", input.house_price),
        ("downPayment", input.down_payment),
        ("interestRate", input.interest_rate),
        ("notaryFees", input.notary_fees),
        ("registrationTax", input.registration_tax),
        ("agencyFees", input.agency_fees),
        ("otherCosts", input.other_costs),
    ];
    for (field, value) in amounts {
        if !value.is_finite() || value < 0.0 {
            return Err(AppError::validation(format!(
                "{field} must be a non-negative number"
            )));
        }
    }
    if input.loan_term == 0 || input.loan_term > MAX_TERM_YEARS {
        return Err(AppError::validation(format!(
            "loanTerm must be between 1 and {MAX_TERM_YEARS} years"
        )));
    }
    if input.down_payment > input.house_price {
        return Err(AppError::validation(
            "downPayment cannot exceed housePrice",
        ));
    }

    let loan_amount = input.house_price - input.down_payment;
    let months = input.loan_term * 12;
    let monthly = monthly_payment(loan_amount, input.interest_rate / 100.0 / 12.0, months);
    let total_payment = monthly * f64::from(months);
    let total_interest = total_payment - loan_amount;
    let total_costs =
        input.notary_fees + input.registration_tax + input.agency_fees + input.other_costs;

    Ok(MortgageSummary {
        loan_amount,
        monthly_payment: monthly,
        total_payment,
        total_interest,
        total_costs,
        total_investment: input.down_payment + total_costs,
        total_house_cost: input.house_price + total_costs + total_interest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn input(price: f64, down: f64, rate: f64, years: u32) -> MortgageInput {
        MortgageInput {
            house_price: price,
            down_payment: down,
            interest_rate: rate,
            loan_term: years,
            notary_fees: 2000.0,
            registration_tax: 2500.0,
            agency_fees: 5000.0,
            other_costs: 3000.0,
        }
    }

    #[test]
    fn reference_scenario_is_stable() {
        let first = calculate(&input(200_000.0, 0.0, 3.2, 25)).expect("summary");
        assert!((first.monthly_payment - 969.358).abs() < 0.001, "{}", first.monthly_payment);
        for _ in 0..10 {
            let again = calculate(&input(200_000.0, 0.0, 3.2, 25)).expect("summary");
            assert_eq!(again.monthly_payment.to_bits(), first.monthly_payment.to_bits());
        }
    }

    #[test]
    fn totals_add_up() {
        let s = calculate(&input(250_000.0, 50_000.0, 3.2, 25)).expect("summary");
        assert_eq!(s.loan_amount, 200_000.0);
        assert_eq!(s.total_costs, 12_500.0);
        assert_eq!(s.total_investment, 62_500.0);
        assert!((s.total_payment - s.monthly_payment * 300.0).abs() < 1e-6);
        assert!((s.total_interest - (s.total_payment - 200_000.0)).abs() < 1e-6);
        assert!((s.total_house_cost - (250_000.0 + 12_500.0 + s.total_interest)).abs() < 1e-6);
    }

    #[test]
    fn zero_rate_splits_evenly() {
        let s = calculate(&input(120_000.0, 0.0, 0.0, 10)).expect("summary");
        assert_eq!(s.monthly_payment, 1000.0);
        assert_eq!(s.total_interest, 0.0);
    }

    #[rstest]
    #[case(input(200_000.0, 0.0, 3.2, 0))]
    #[case(input(200_000.0, 0.0, 3.2, MAX_TERM_YEARS + 1))]
    #[case(input(200_000.0, 250_000.0, 3.2, 25))]
    #[case(input(-1.0, 0.0, 3.2, 25))]
    #[case(input(200_000.0, 0.0, f64::NAN, 25))]
    fn invalid_inputs_are_rejected(#[case] bad: MortgageInput) {
        assert!(matches!(calculate(&bad), Err(AppError::Validation(_))));
    }
}
