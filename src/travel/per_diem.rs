//! GSA meals & incidental expenses (M&IE) rules.
//!
//! Provided meals are deducted at the GSA breakdown for the day's M&IE tier,
//! and the first and last day of travel are paid at 75%.

use serde::{Deserialize, Serialize};

/// Share of the daily rate paid on the first and last travel day
pub const FIRST_LAST_DAY_FACTOR: f64 = 0.75;

/// Reimbursement per mile for personal vehicle use
pub const MILEAGE_RATE: f64 = 0.70;

/// Meal breakdown of one M&IE tier
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MealBreakdown {
    pub rate: u32,
    pub breakfast: f64,
    pub lunch: f64,
    pub dinner: f64,
    pub incidentals: f64,
}

pub const MIE_TIERS: [MealBreakdown; 5] = [
    MealBreakdown { rate: 68, breakfast: 16.0, lunch: 19.0, dinner: 28.0, incidentals: 5.0 },
    MealBreakdown { rate: 74, breakfast: 18.0, lunch: 20.0, dinner: 31.0, incidentals: 5.0 },
    MealBreakdown { rate: 80, breakfast: 20.0, lunch: 22.0, dinner: 33.0, incidentals: 5.0 },
    MealBreakdown { rate: 86, breakfast: 22.0, lunch: 23.0, dinner: 36.0, incidentals: 5.0 },
    MealBreakdown { rate: 92, breakfast: 23.0, lunch: 26.0, dinner: 38.0, incidentals: 5.0 },
];

/// Breakdown for a daily rate, if it is one of the GSA tiers
pub fn breakdown_for(rate: f64) -> Option<&'static MealBreakdown> {
    MIE_TIERS.iter().find(|t| (t.rate as f64 - rate).abs() < 0.005)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealsProvided {
    pub breakfast: bool,
    pub lunch: bool,
    pub dinner: bool,
}

impl MealsProvided {
    /// `B`, `L`, `D` for each provided meal, `-` for none
    pub fn letters(&self) -> String {
        let mut s = String::new();
        if self.breakfast {
            s.push('B');
        }
        if self.lunch {
            s.push('L');
        }
        if self.dinner {
            s.push('D');
        }
        if s.is_empty() {
            s.push('-');
        }
        s
    }
}

/// Amount deducted from `rate` for the provided meals. Rates outside the
/// GSA tiers carry no deduction.
pub fn meal_deduction(rate: f64, meals: MealsProvided) -> f64 {
    let Some(tier) = breakdown_for(rate) else {
        return 0.0;
    };
    let mut deduction = 0.0;
    if meals.breakfast {
        deduction += tier.breakfast;
    }
    if meals.lunch {
        deduction += tier.lunch;
    }
    if meals.dinner {
        deduction += tier.dinner;
    }
    deduction
}

/// Per diem for one day.
///
/// ```
/// use gutap::travel::per_diem::{MealsProvided, per_diem};
///
/// let meals = MealsProvided { breakfast: true, lunch: true, dinner: false };
/// assert_eq!(per_diem(80.0, meals, false), 38.0);
/// assert_eq!(per_diem(80.0, meals, true), 28.5);
/// ```
pub fn per_diem(rate: f64, meals: MealsProvided, first_or_last_day: bool) -> f64 {
    if rate <= 0.0 {
        return 0.0;
    }
    let base = (rate - meal_deduction(rate, meals)).max(0.0);
    let amount = if first_or_last_day {
        base * FIRST_LAST_DAY_FACTOR
    } else {
        base
    };
    round_cents(amount)
}

pub fn mileage_amount(miles: f64) -> f64 {
    round_cents(miles * MILEAGE_RATE)
}

pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
