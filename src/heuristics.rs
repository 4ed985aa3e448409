// src/heuristics.rs
//
// Move-score heuristic and the day-optimizer ranking. Pure functions: the
// routes feed them rows and serialize what comes back.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Move,
    Consider,
    Keep,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MoveDecision {
    pub score: i32,
    pub recommendation: Recommendation,
    pub incentive: &'static str,
}

fn clamp(lo: i64, hi: i64, v: i64) -> i64 {
    v.max(lo).min(hi)
}

/// Whole days between now and the appointment start, floored, never negative.
/// Computed in UTC; `start_time` is stored as a UTC instant and the score
/// only needs day-granularity lead time.
pub fn days_until(start_time: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (start_time - now).num_days().max(0)
}

/// 0-100 desirability of displacing the current appointment for a
/// higher-value procedure.
///
/// revenue_diff   = candidate_value - current_value
/// revenue_score  = clamp(0, 80, floor(revenue_diff / 10))
/// ltv_penalty    = clamp(0, 40, floor(patient_ltv / 50))
/// timing_bonus   = clamp(0, 20, max(0, days) * 2)
/// score          = clamp(0, 100, revenue_score - ltv_penalty + timing_bonus + 30)
pub fn score_move(
    current_value: f64,
    candidate_value: f64,
    patient_ltv: f64,
    days_until_appointment: i64,
) -> MoveDecision {
    let revenue_diff = candidate_value - current_value;
    let revenue_score = clamp(0, 80, (revenue_diff / 10.0).floor() as i64);
    let ltv_penalty = clamp(0, 40, (patient_ltv / 50.0).floor() as i64);
    let timing_bonus = clamp(0, 20, days_until_appointment.max(0) * 2);
    let score = clamp(0, 100, revenue_score - ltv_penalty + timing_bonus + 30) as i32;

    let (recommendation, incentive) = if score > 85 {
        (Recommendation::Move, "5% discount")
    } else if score > 70 {
        (Recommendation::Move, "10% discount")
    } else if score >= 50 {
        (Recommendation::Consider, "15% discount or priority slot")
    } else {
        (Recommendation::Keep, "No incentive needed")
    };

    MoveDecision {
        score,
        recommendation,
        incentive,
    }
}

/* -------------------------
   Day optimizer
--------------------------*/

/// A catalog procedure that might displace an existing booking. Values beyond
/// 1.5x the booked value count as materially higher.
const MATERIAL_VALUE_RATIO: f64 = 1.5;

#[derive(Debug, Clone)]
pub struct CandidateProcedure {
    pub code: String,
    pub name: String,
    pub base_value: f64,
}

/// The slice of a booked appointment the optimizer needs.
#[derive(Debug, Clone)]
pub struct BookedSnapshot {
    pub appointment_id: Uuid,
    pub estimated_value: f64,
    pub patient_ltv: f64,
    pub start_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MoveSuggestion {
    pub source_appointment_id: Uuid,
    pub target_slot: String,
    pub move_score: i32,
    pub incentive_needed: String,
    pub potential_revenue_gain: f64,
}

/// Scan a day's booked appointments against the procedure catalog and rank
/// displacement suggestions. O(appointments x procedures); callers needing
/// scale should pre-filter the catalog by category.
pub fn suggest_moves(
    appointments: &[BookedSnapshot],
    catalog: &[CandidateProcedure],
    now: DateTime<Utc>,
) -> Vec<MoveSuggestion> {
    let mut suggestions = Vec::new();

    for appt in appointments {
        let days = days_until(appt.start_time, now);
        for proc in catalog {
            if proc.base_value <= appt.estimated_value * MATERIAL_VALUE_RATIO {
                continue;
            }
            let decision = score_move(
                appt.estimated_value,
                proc.base_value,
                appt.patient_ltv,
                days,
            );
            if decision.recommendation != Recommendation::Move || decision.score <= 70 {
                continue;
            }
            suggestions.push(MoveSuggestion {
                source_appointment_id: appt.appointment_id,
                target_slot: format!("{} ({})", proc.name, proc.code),
                move_score: decision.score,
                incentive_needed: decision.incentive.to_string(),
                potential_revenue_gain: proc.base_value - appt.estimated_value,
            });
        }
    }

    suggestions.sort_by(|a, b| {
        b.move_score
            .cmp(&a.move_score)
            .then(b.potential_revenue_gain.total_cmp(&a.potential_revenue_gain))
            .then(a.source_appointment_id.cmp(&b.source_appointment_id))
    });
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn high_value_candidate_maxes_out() {
        // diff 1050 -> revenue_score caps at 80; 80 + 30 = 110, clamped 100.
        let d = score_move(150.0, 1200.0, 0.0, 0);
        assert_eq!(d.score, 100);
        assert_eq!(d.recommendation, Recommendation::Move);
        assert_eq!(d.incentive, "5% discount");
    }

    #[test]
    fn downgrade_against_loyal_patient_keeps() {
        // diff -1050 -> revenue_score 0; ltv 500 -> penalty 10; 0 - 10 + 30 = 20.
        let d = score_move(1200.0, 150.0, 500.0, 0);
        assert_eq!(d.score, 20);
        assert_eq!(d.recommendation, Recommendation::Keep);
        assert_eq!(d.incentive, "No incentive needed");
    }

    #[test]
    fn identical_inputs_are_deterministic() {
        let a = score_move(300.0, 950.0, 240.0, 5);
        let b = score_move(300.0, 950.0, 240.0, 5);
        assert_eq!(a, b);
    }

    #[test]
    fn threshold_boundaries() {
        // Pin scores exactly on the table edges via the revenue term
        // (ltv 0, days 0 -> score = clamp(0,80,diff/10) + 30).
        let exactly_85 = score_move(0.0, 550.0, 0.0, 0);
        assert_eq!(exactly_85.score, 85);
        assert_eq!(exactly_85.incentive, "10% discount");

        let over_85 = score_move(0.0, 560.0, 0.0, 0);
        assert_eq!(over_85.score, 86);
        assert_eq!(over_85.incentive, "5% discount");

        let exactly_70 = score_move(0.0, 400.0, 0.0, 0);
        assert_eq!(exactly_70.score, 70);
        assert_eq!(exactly_70.recommendation, Recommendation::Consider);

        let just_over_70 = score_move(0.0, 410.0, 0.0, 0);
        assert_eq!(just_over_70.score, 71);
        assert_eq!(just_over_70.recommendation, Recommendation::Move);

        let exactly_50 = score_move(0.0, 200.0, 0.0, 0);
        assert_eq!(exactly_50.score, 50);
        assert_eq!(exactly_50.recommendation, Recommendation::Consider);

        let under_50 = score_move(0.0, 190.0, 0.0, 0);
        assert_eq!(under_50.score, 49);
        assert_eq!(under_50.recommendation, Recommendation::Keep);
    }

    #[test]
    fn timing_bonus_caps_at_twenty() {
        let near = score_move(100.0, 100.0, 0.0, 0); // 0 + 0 + 30
        let week_out = score_move(100.0, 100.0, 0.0, 7); // bonus 14
        let month_out = score_move(100.0, 100.0, 0.0, 30); // bonus capped 20
        assert_eq!(near.score, 30);
        assert_eq!(week_out.score, 44);
        assert_eq!(month_out.score, 50);
    }

    #[test]
    fn ltv_penalty_caps_at_forty() {
        let d = score_move(0.0, 800.0, 10_000.0, 0);
        // revenue 80, penalty capped 40: 80 - 40 + 30 = 70.
        assert_eq!(d.score, 70);
    }

    #[test]
    fn negative_days_treated_as_zero() {
        let d = score_move(100.0, 100.0, 0.0, -3);
        assert_eq!(d.score, 30);
    }

    #[test]
    fn days_until_floors_and_clamps() {
        let now = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        let in_36h = Utc.with_ymd_and_hms(2025, 1, 17, 0, 0, 0).unwrap();
        let yesterday = Utc.with_ymd_and_hms(2025, 1, 14, 12, 0, 0).unwrap();
        assert_eq!(days_until(in_36h, now), 1);
        assert_eq!(days_until(yesterday, now), 0);
        assert_eq!(days_until(now, now), 0);
    }

    fn snapshot(value: f64, ltv: f64) -> BookedSnapshot {
        BookedSnapshot {
            appointment_id: Uuid::new_v4(),
            estimated_value: value,
            patient_ltv: ltv,
            start_time: Utc.with_ymd_and_hms(2025, 1, 22, 10, 0, 0).unwrap(),
        }
    }

    #[test]
    fn optimizer_ignores_marginally_better_procedures() {
        let now = Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0).unwrap();
        let appt = snapshot(150.0, 100.0);
        // 200 is only 1.33x the booked value: below the material threshold.
        let catalog = vec![CandidateProcedure {
            code: "D1206".into(),
            name: "Fluoride".into(),
            base_value: 200.0,
        }];
        assert!(suggest_moves(&[appt], &catalog, now).is_empty());
    }

    #[test]
    fn optimizer_suggests_material_upgrades_only() {
        let now = Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0).unwrap();
        let appt = snapshot(150.0, 100.0);
        let catalog = vec![
            CandidateProcedure {
                code: "D1206".into(),
                name: "Fluoride".into(),
                base_value: 200.0,
            },
            CandidateProcedure {
                code: "D2710".into(),
                name: "Crown".into(),
                base_value: 1200.0,
            },
        ];
        let suggestions = suggest_moves(&[appt.clone()], &catalog, now);
        assert_eq!(suggestions.len(), 1);
        let s = &suggestions[0];
        assert_eq!(s.source_appointment_id, appt.appointment_id);
        assert_eq!(s.target_slot, "Crown (D2710)");
        assert!(s.move_score > 70);
        assert_eq!(s.potential_revenue_gain, 1050.0);
    }

    #[test]
    fn optimizer_ranks_by_score_descending() {
        let now = Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0).unwrap();
        let cheap = snapshot(100.0, 0.0);
        let sticky = snapshot(100.0, 2000.0); // heavy ltv penalty
        let catalog = vec![CandidateProcedure {
            code: "D2710".into(),
            name: "Crown".into(),
            base_value: 1200.0,
        }];
        let suggestions = suggest_moves(&[sticky.clone(), cheap.clone()], &catalog, now);
        // Sticky patient scores 80 - 40 + 14 + 30 = 84, still a MOVE, but
        // ranks below the unattached patient's 100.
        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[0].source_appointment_id, cheap.appointment_id);
        assert!(suggestions[0].move_score > suggestions[1].move_score);
    }
}
