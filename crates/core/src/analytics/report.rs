use serde::{Deserialize, Serialize};

/// Monthly CO2 savings goal, grams.
pub const MONTHLY_GOAL_G: f64 = 1000.0;
/// Yearly CO2 absorption of one tree, grams.
const TREE_YEAR_G: f64 = 21_770.0;
/// CO2 per km driven by an average car, grams.
const CAR_KM_G: f64 = 120.0;
/// CO2 per phone charge, grams.
const PHONE_CHARGE_G: f64 = 8.4;

/// Aggregated analytics over a date range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodSummary {
    pub total_page_views: i64,
    pub total_data_kb: f64,
    pub total_carbon_g: f64,
    pub total_savings_g: f64,
    pub avg_carbon_intensity: f64,
}

impl PeriodSummary {
    /// Fold daily rows into one summary. The average is weighted by page views.
    pub fn combine<'a>(days: impl IntoIterator<Item = &'a PeriodSummary>) -> Self {
        let mut total = Self::default();
        let mut weighted_intensity = 0.0;
        for day in days {
            total.total_page_views += day.total_page_views;
            total.total_data_kb += day.total_data_kb;
            total.total_carbon_g += day.total_carbon_g;
            total.total_savings_g += day.total_savings_g;
            weighted_intensity += day.avg_carbon_intensity * day.total_page_views as f64;
        }
        if total.total_page_views > 0 {
            total.avg_carbon_intensity = weighted_intensity / total.total_page_views as f64;
        }
        total
    }
}

/// Overall reading of a week-over-week change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Assessment {
    /// Footprint down, savings up.
    Improving,
    /// Footprint up along with traffic.
    TrafficDriven,
    SavingsUp,
    NeedsAttention,
}

impl Assessment {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Improving => {
                "Carbon footprint decreased while carbon savings increased; optimizations are effective."
            }
            Self::TrafficDriven => {
                "Carbon footprint increased along with page views. Consider more aggressive optimization during peak traffic."
            }
            Self::SavingsUp => "Carbon savings improved; optimization strategies are becoming more effective.",
            Self::NeedsAttention => {
                "Carbon footprint and savings need attention. Review optimization settings and enable more eco features."
            }
        }
    }
}

/// Current week minus previous week.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeekComparison {
    pub carbon_change_g: f64,
    pub savings_change_g: f64,
    pub views_change: i64,
}

impl WeekComparison {
    pub fn between(current: &PeriodSummary, previous: &PeriodSummary) -> Self {
        Self {
            carbon_change_g: current.total_carbon_g - previous.total_carbon_g,
            savings_change_g: current.total_savings_g - previous.total_savings_g,
            views_change: current.total_page_views - previous.total_page_views,
        }
    }

    pub fn assessment(&self) -> Assessment {
        if self.carbon_change_g < 0.0 && self.savings_change_g > 0.0 {
            Assessment::Improving
        } else if self.carbon_change_g > 0.0 && self.views_change > 0 {
            Assessment::TrafficDriven
        } else if self.savings_change_g > 0.0 {
            Assessment::SavingsUp
        } else {
            Assessment::NeedsAttention
        }
    }
}

/// Progress towards the monthly savings goal, with everyday equivalents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GoalProgress {
    pub saved_g: f64,
    pub goal_g: f64,
    /// 0–100.
    pub percent: f64,
    pub tree_years: f64,
    pub car_km: f64,
    pub phone_charges: f64,
}

impl GoalProgress {
    pub fn new(saved_g: f64, goal_g: f64) -> Self {
        let percent = if goal_g > 0.0 { (saved_g / goal_g * 100.0).clamp(0.0, 100.0) } else { 0.0 };
        Self {
            saved_g,
            goal_g,
            percent,
            tree_years: saved_g / TREE_YEAR_G,
            car_km: saved_g / CAR_KM_G,
            phone_charges: saved_g / PHONE_CHARGE_G,
        }
    }

    pub fn monthly(saved_g: f64) -> Self {
        Self::new(saved_g, MONTHLY_GOAL_G)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(views: i64, carbon: f64, savings: f64) -> PeriodSummary {
        PeriodSummary {
            total_page_views: views,
            total_carbon_g: carbon,
            total_savings_g: savings,
            ..Default::default()
        }
    }

    #[test]
    fn combine_weights_intensity_by_views() {
        let days = [
            PeriodSummary { total_page_views: 1, avg_carbon_intensity: 100.0, total_carbon_g: 1.0, ..Default::default() },
            PeriodSummary { total_page_views: 3, avg_carbon_intensity: 300.0, total_carbon_g: 2.0, ..Default::default() },
        ];
        let total = PeriodSummary::combine(&days);
        assert_eq!(total.total_page_views, 4);
        assert_eq!(total.total_carbon_g, 3.0);
        assert_eq!(total.avg_carbon_intensity, 250.0);
    }

    #[test]
    fn combine_empty() {
        assert_eq!(PeriodSummary::combine(&[]), PeriodSummary::default());
    }

    #[test]
    fn assessments() {
        let prev = summary(100, 10.0, 5.0);
        assert_eq!(WeekComparison::between(&summary(100, 8.0, 6.0), &prev).assessment(), Assessment::Improving);
        assert_eq!(WeekComparison::between(&summary(150, 12.0, 4.0), &prev).assessment(), Assessment::TrafficDriven);
        assert_eq!(WeekComparison::between(&summary(90, 12.0, 6.0), &prev).assessment(), Assessment::SavingsUp);
        assert_eq!(WeekComparison::between(&summary(90, 12.0, 4.0), &prev).assessment(), Assessment::NeedsAttention);
    }

    #[test]
    fn goal_progress_is_capped() {
        let p = GoalProgress::monthly(250.0);
        assert_eq!(p.percent, 25.0);
        assert_eq!(p.car_km, 250.0 / 120.0);
        assert_eq!(GoalProgress::monthly(5000.0).percent, 100.0);
        assert_eq!(GoalProgress::new(10.0, 0.0).percent, 0.0);
    }
}
