//! Basket (fund) roll-up of member valuations.

use crate::core::valuation::{FairPrice, premium_discount};

/// A basket member ready for aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberValuation {
    pub ticker: String,
    pub share: f64,
    pub current_price: Option<f64>,
    pub fair_price: FairPrice,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasketValuation {
    pub current_value: f64,
    pub fair_value: f64,
    pub premium_discount: Option<f64>,
    pub valued_count: usize,
    pub total_count: usize,
}

/// Sums `share * price` over members. Shares are linear weights and are not
/// normalized. Unvaluable members add to the current value (when priced) and to
/// `total_count`, but not to the fair value.
pub fn aggregate(members: &[MemberValuation]) -> BasketValuation {
    let mut current_value = 0.0;
    let mut fair_value = 0.0;
    let mut valued_count = 0;

    for member in members {
        if let Some(price) = member.current_price {
            current_value += member.share * price;
        }
        if let FairPrice::Value(fair) = member.fair_price {
            fair_value += member.share * fair;
            valued_count += 1;
        }
    }

    BasketValuation {
        current_value,
        fair_value,
        premium_discount: premium_discount(fair_value, current_value),
        valued_count,
        total_count: members.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(ticker: &str, share: f64, current: Option<f64>, fair: FairPrice) -> MemberValuation {
        MemberValuation {
            ticker: ticker.to_string(),
            share,
            current_price: current,
            fair_price: fair,
        }
    }

    #[test]
    fn test_two_member_basket() {
        let members = vec![
            member("A", 0.5, Some(100.0), FairPrice::Value(110.0)),
            member("B", 0.5, Some(200.0), FairPrice::Value(190.0)),
        ];
        let basket = aggregate(&members);
        assert_eq!(basket.current_value, 150.0);
        assert_eq!(basket.fair_value, 150.0);
        assert_eq!(basket.premium_discount, Some(0.0));
        assert_eq!(basket.valued_count, 2);
        assert_eq!(basket.total_count, 2);
    }

    #[test]
    fn test_unvaluable_member_excluded_from_fair_value() {
        let members = vec![
            member("A", 2.0, Some(10.0), FairPrice::Value(12.0)),
            member("B", 1.0, Some(30.0), FairPrice::Unvaluable),
            member("C", 1.0, None, FairPrice::Unvaluable),
        ];
        let basket = aggregate(&members);
        assert_eq!(basket.current_value, 50.0);
        assert_eq!(basket.fair_value, 24.0);
        assert_eq!(basket.valued_count, 1);
        assert_eq!(basket.total_count, 3);
        assert!((basket.premium_discount.unwrap() - (24.0 / 50.0 - 1.0) * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_shares_are_not_normalized() {
        let members = vec![
            member("A", 3.0, Some(10.0), FairPrice::Value(10.0)),
            member("B", 1.0, Some(10.0), FairPrice::Value(20.0)),
        ];
        let basket = aggregate(&members);
        assert_eq!(basket.current_value, 40.0);
        assert_eq!(basket.fair_value, 50.0);
    }

    #[test]
    fn test_empty_basket_has_undefined_premium() {
        let basket = aggregate(&[]);
        assert_eq!(basket.current_value, 0.0);
        assert!(basket.premium_discount.is_none());
        assert_eq!(basket.total_count, 0);
    }
}
