use rust_decimal::Decimal;
use serde::Serialize;

use crate::utils::fits_money_column;

const SAVINGS_HORIZON_MONTHS: i32 = 12;

#[derive(Debug, Clone, Copy)]
pub struct Purchase {
    pub price: Decimal,
    pub loan_term: i32,
    pub down_payment: Decimal,
}

#[derive(Debug, Clone, Copy)]
pub struct Budget {
    pub income: Decimal,
    pub expenses: Decimal,
    pub savings: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SavingsGoal {
    pub amount_per_month: Decimal,
    pub duration: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Assessment {
    pub monthly_payment: Decimal,
    pub affordable: bool,
    pub savings_goal: SavingsGoal,
}

impl Purchase {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.price.is_sign_negative() {
            return Err("price must not be negative");
        }
        if self.down_payment.is_sign_negative() {
            return Err("down_payment must not be negative");
        }
        if !fits_money_column(self.price) {
            return Err("price is out of range");
        }
        if self.down_payment > self.price {
            return Err("down_payment must not exceed price");
        }
        if self.loan_term < 0 {
            return Err("loan_term must not be negative");
        }
        Ok(())
    }

    /// Amount financed, i.e. what remains after the down payment.
    pub fn financed(&self) -> Decimal {
        self.price - self.down_payment
    }
}

/// A purchase is affordable when the monthly instalment fits in the
/// monthly surplus (`income - expenses`). A loan term of zero is treated
/// as a single payment. Only the reported instalment is rounded.
pub fn assess(purchase: &Purchase, budget: &Budget) -> Assessment {
    let months = Decimal::from(purchase.loan_term.max(1));
    let monthly_payment = purchase.financed() / months;
    let surplus = budget.income - budget.expenses;

    let shortfall = purchase.financed() - budget.savings;
    let savings_goal = SavingsGoal {
        amount_per_month: (shortfall / Decimal::from(SAVINGS_HORIZON_MONTHS))
            .max(Decimal::ZERO)
            .round_dp(2),
        duration: if budget.savings < purchase.financed() {
            SAVINGS_HORIZON_MONTHS
        } else {
            0
        },
    };

    Assessment {
        monthly_payment: monthly_payment.round_dp(2),
        affordable: monthly_payment <= surplus,
        savings_goal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(v: &str) -> Decimal {
        v.parse().unwrap()
    }

    fn budget(income: &str, expenses: &str, savings: &str) -> Budget {
        Budget {
            income: dec(income),
            expenses: dec(expenses),
            savings: dec(savings),
        }
    }

    #[test]
    fn test_car_purchase_within_budget() {
        let purchase = Purchase {
            price: dec("30000.0"),
            loan_term: 60,
            down_payment: dec("5000.0"),
        };
        let result = assess(&purchase, &budget("5000.0", "3000.0", "10000.0"));

        assert_eq!(result.monthly_payment, dec("416.67"));
        assert!(result.affordable);
        assert_eq!(result.savings_goal.amount_per_month, dec("1250.0"));
        assert_eq!(result.savings_goal.duration, 12);
    }

    #[test]
    fn test_unaffordable_when_payment_exceeds_surplus() {
        let purchase = Purchase {
            price: dec("12000.0"),
            loan_term: 12,
            down_payment: Decimal::ZERO,
        };
        let result = assess(&purchase, &budget("3000.0", "2500.0", "0.0"));

        assert_eq!(result.monthly_payment, dec("1000.0"));
        assert!(!result.affordable);
    }

    #[test]
    fn test_savings_cover_purchase() {
        let purchase = Purchase {
            price: dec("2000.0"),
            loan_term: 0,
            down_payment: dec("500.0"),
        };
        let result = assess(&purchase, &budget("4000.0", "1000.0", "5000.0"));

        // zero-month term is paid in one instalment
        assert_eq!(result.monthly_payment, dec("1500.0"));
        assert!(result.affordable);
        assert_eq!(result.savings_goal.amount_per_month, Decimal::ZERO);
        assert_eq!(result.savings_goal.duration, 0);
    }

    #[test]
    fn test_fractional_cent_over_surplus_is_unaffordable() {
        let purchase = Purchase {
            price: dec("1000.004"),
            loan_term: 1,
            down_payment: Decimal::ZERO,
        };
        let result = assess(&purchase, &budget("3000.00", "2000.00", "0"));

        assert_eq!(result.monthly_payment, dec("1000.00"));
        assert!(!result.affordable);

        let exact = Purchase { price: dec("1000.00"), ..purchase };
        assert!(assess(&exact, &budget("3000.00", "2000.00", "0")).affordable);
    }

    #[test]
    fn test_validation() {
        let ok = Purchase {
            price: dec("100.0"),
            loan_term: 1,
            down_payment: dec("10.0"),
        };
        assert!(ok.validate().is_ok());

        assert!(Purchase { price: dec("-1.0"), ..ok }.validate().is_err());
        assert!(Purchase { down_payment: dec("200.0"), ..ok }.validate().is_err());
        assert!(Purchase { loan_term: -3, ..ok }.validate().is_err());
        assert_eq!(
            Purchase { price: dec("1000000000000"), ..ok }.validate(),
            Err("price is out of range")
        );
        assert!(Purchase { price: dec("999999999999.99"), ..ok }.validate().is_ok());
    }
}
