//! Condition evaluation against a weather snapshot.
//!
//! Pure functions: equal inputs yield equal outputs, nothing here touches
//! a store or a clock.

use vane_core::{
    Condition, ConditionLogic, ConditionOperator, LogicalOperator, WeatherSnapshot,
};

/// Tolerance for the `equals` operator. `|v − value| == 0.1` is NOT a match.
const EQUALS_EPSILON: f64 = 0.1;

/// Default half-width for `between` when the condition omits `range`.
const DEFAULT_BETWEEN_RANGE: f64 = 5.0;

/// Evaluate one condition. A parameter the snapshot does not report is
/// never met.
pub fn evaluate_condition(condition: &Condition, weather: &WeatherSnapshot) -> bool {
    let Some(v) = condition.parameter.value_in(weather) else {
        return false;
    };
    match condition.operator {
        ConditionOperator::GreaterThan => v > condition.value,
        ConditionOperator::LessThan => v < condition.value,
        ConditionOperator::Equals => (v - condition.value).abs() < EQUALS_EPSILON,
        ConditionOperator::Between => {
            let range = condition.range.unwrap_or(DEFAULT_BETWEEN_RANGE);
            (condition.value - range..=condition.value + range).contains(&v)
        }
    }
}

/// Legacy flat list: conjunction of all conditions. An empty list is not met.
pub fn evaluate_flat(conditions: &[Condition], weather: &WeatherSnapshot) -> bool {
    if conditions.is_empty() {
        return false;
    }
    conditions.iter().all(|c| evaluate_condition(c, weather))
}

/// Nested logic: each group reduces via its operator, groups combine via
/// the global operator. An empty groups list is not met.
pub fn evaluate_logic(logic: &ConditionLogic, weather: &WeatherSnapshot) -> bool {
    if logic.groups.is_empty() {
        return false;
    }
    let group_result = |group: &vane_core::ConditionGroup| match group.operator {
        LogicalOperator::And => group.conditions.iter().all(|c| evaluate_condition(c, weather)),
        LogicalOperator::Or => group.conditions.iter().any(|c| evaluate_condition(c, weather)),
    };
    match logic.global_operator {
        LogicalOperator::And => logic.groups.iter().all(group_result),
        LogicalOperator::Or => logic.groups.iter().any(group_result),
    }
}

/// Number of leaf conditions a rule would evaluate, for metrics.
pub fn condition_count(conditions: &[Condition], logic: Option<&ConditionLogic>) -> u32 {
    match logic {
        Some(l) => l.groups.iter().map(|g| g.conditions.len() as u32).sum(),
        None => conditions.len() as u32,
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use vane_core::{ConditionGroup, WeatherParameter};

    fn snapshot(temp: f64, humidity: f64) -> WeatherSnapshot {
        WeatherSnapshot {
            temperature: Some(temp),
            humidity: Some(humidity),
            ..WeatherSnapshot::empty()
        }
    }

    fn cond(parameter: WeatherParameter, operator: ConditionOperator, value: f64) -> Condition {
        Condition {
            parameter,
            operator,
            value,
            unit: String::new(),
            range: None,
        }
    }

    #[test]
    fn greater_than_is_strict() {
        let c = cond(WeatherParameter::Temperature, ConditionOperator::GreaterThan, 30.0);
        assert!(evaluate_condition(&c, &snapshot(30.1, 0.0)));
        assert!(!evaluate_condition(&c, &snapshot(30.0, 0.0)));
    }

    #[test]
    fn less_than_is_strict() {
        let c = cond(WeatherParameter::Temperature, ConditionOperator::LessThan, 5.0);
        assert!(evaluate_condition(&c, &snapshot(4.9, 0.0)));
        assert!(!evaluate_condition(&c, &snapshot(5.0, 0.0)));
    }

    #[test]
    fn equals_epsilon_boundary_is_exclusive() {
        let c = cond(WeatherParameter::Temperature, ConditionOperator::Equals, 20.0);
        assert!(evaluate_condition(&c, &snapshot(20.05, 0.0)));
        // Exactly 0.1 away is not a match.
        assert!(!evaluate_condition(&c, &snapshot(20.1, 0.0)));
        assert!(!evaluate_condition(&c, &snapshot(19.9, 0.0)));
    }

    #[test]
    fn between_uses_explicit_range_inclusively() {
        let mut c = cond(WeatherParameter::Humidity, ConditionOperator::Between, 50.0);
        c.range = Some(10.0);
        assert!(evaluate_condition(&c, &snapshot(0.0, 60.0)));
        assert!(evaluate_condition(&c, &snapshot(0.0, 40.0)));
        assert!(!evaluate_condition(&c, &snapshot(0.0, 60.5)));
    }

    #[test]
    fn between_defaults_to_range_five() {
        let c = cond(WeatherParameter::Humidity, ConditionOperator::Between, 50.0);
        assert!(evaluate_condition(&c, &snapshot(0.0, 55.0)));
        assert!(!evaluate_condition(&c, &snapshot(0.0, 55.1)));
    }

    #[test]
    fn between_with_zero_range_is_point_equality() {
        let mut c = cond(WeatherParameter::Humidity, ConditionOperator::Between, 50.0);
        c.range = Some(0.0);
        assert!(evaluate_condition(&c, &snapshot(0.0, 50.0)));
        assert!(!evaluate_condition(&c, &snapshot(0.0, 50.01)));
    }

    #[test]
    fn missing_parameter_is_never_met() {
        let c = cond(WeatherParameter::Visibility, ConditionOperator::LessThan, 100.0);
        assert!(!evaluate_condition(&c, &snapshot(20.0, 50.0)));
    }

    #[test]
    fn flat_list_is_conjunction() {
        let conds = vec![
            cond(WeatherParameter::Temperature, ConditionOperator::GreaterThan, 30.0),
            cond(WeatherParameter::Humidity, ConditionOperator::LessThan, 70.0),
        ];
        assert!(evaluate_flat(&conds, &snapshot(31.0, 60.0)));
        assert!(!evaluate_flat(&conds, &snapshot(31.0, 80.0)));
    }

    #[test]
    fn empty_flat_list_is_not_met() {
        assert!(!evaluate_flat(&[], &snapshot(31.0, 60.0)));
    }

    #[test]
    fn or_group_any_condition_passes() {
        let logic = ConditionLogic {
            groups: vec![ConditionGroup {
                operator: LogicalOperator::Or,
                conditions: vec![
                    cond(WeatherParameter::Temperature, ConditionOperator::GreaterThan, 35.0),
                    cond(WeatherParameter::Humidity, ConditionOperator::LessThan, 70.0),
                ],
            }],
            global_operator: LogicalOperator::And,
            time_frame: None,
        };
        assert!(evaluate_logic(&logic, &snapshot(20.0, 60.0)));
        assert!(!evaluate_logic(&logic, &snapshot(20.0, 80.0)));
    }

    #[test]
    fn global_operator_combines_groups() {
        let hot = ConditionGroup {
            operator: LogicalOperator::And,
            conditions: vec![cond(
                WeatherParameter::Temperature,
                ConditionOperator::GreaterThan,
                30.0,
            )],
        };
        let humid = ConditionGroup {
            operator: LogicalOperator::And,
            conditions: vec![cond(
                WeatherParameter::Humidity,
                ConditionOperator::GreaterThan,
                80.0,
            )],
        };

        let and_logic = ConditionLogic {
            groups: vec![hot.clone(), humid.clone()],
            global_operator: LogicalOperator::And,
            time_frame: None,
        };
        let or_logic = ConditionLogic {
            groups: vec![hot, humid],
            global_operator: LogicalOperator::Or,
            time_frame: None,
        };

        let hot_dry = snapshot(31.0, 40.0);
        assert!(!evaluate_logic(&and_logic, &hot_dry));
        assert!(evaluate_logic(&or_logic, &hot_dry));
    }

    #[test]
    fn empty_groups_are_not_met() {
        let logic = ConditionLogic {
            groups: vec![],
            global_operator: LogicalOperator::Or,
            time_frame: None,
        };
        assert!(!evaluate_logic(&logic, &snapshot(31.0, 40.0)));
    }

    #[test]
    fn evaluation_is_pure() {
        let c = cond(WeatherParameter::Temperature, ConditionOperator::GreaterThan, 30.0);
        let snap = snapshot(31.0, 40.0);
        let first = evaluate_condition(&c, &snap);
        for _ in 0..10 {
            assert_eq!(evaluate_condition(&c, &snap), first);
        }
    }

    #[test]
    fn condition_count_prefers_logic() {
        let flat = vec![cond(WeatherParameter::Temperature, ConditionOperator::Equals, 0.0)];
        let logic = ConditionLogic {
            groups: vec![
                ConditionGroup {
                    operator: LogicalOperator::And,
                    conditions: vec![
                        cond(WeatherParameter::Temperature, ConditionOperator::Equals, 0.0),
                        cond(WeatherParameter::Humidity, ConditionOperator::Equals, 0.0),
                    ],
                },
                ConditionGroup {
                    operator: LogicalOperator::Or,
                    conditions: vec![cond(
                        WeatherParameter::WindSpeed,
                        ConditionOperator::Equals,
                        0.0,
                    )],
                },
            ],
            global_operator: LogicalOperator::And,
            time_frame: None,
        };
        assert_eq!(condition_count(&flat, None), 1);
        assert_eq!(condition_count(&flat, Some(&logic)), 3);
    }
}
