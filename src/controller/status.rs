//! # Conditions
//!
//! Upsert of status conditions. A condition's `lastTransitionTime` only moves
//! when its status flips, so repeating a pass leaves the status unchanged.

use crate::crd::Condition;

pub const READY_CONDITION: &str = "Ready";

/// Insert or update the condition of type `condition_type`
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    condition_type: &str,
    status: bool,
    reason: &str,
    message: impl Into<String>,
) {
    let status = if status { "True" } else { "False" };
    let message = message.into();

    match conditions.iter_mut().find(|c| c.r#type == condition_type) {
        Some(existing) => {
            if existing.status != status {
                existing.status = status.to_string();
                existing.last_transition_time = Some(chrono::Utc::now().to_rfc3339());
            }
            existing.reason = Some(reason.to_string());
            existing.message = Some(message);
        }
        None => conditions.push(Condition {
            r#type: condition_type.to_string(),
            status: status.to_string(),
            last_transition_time: Some(chrono::Utc::now().to_rfc3339()),
            reason: Some(reason.to_string()),
            message: Some(message),
        }),
    }
}

pub fn find_condition<'a>(conditions: &'a [Condition], condition_type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == condition_type)
}
