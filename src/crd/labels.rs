//! Well-known label carried by every object the controller creates.

use crate::constants::{MANAGED_BY_LABEL_KEY, MANAGED_BY_LABEL_VALUE};
use std::collections::BTreeMap;

/// Labels marking an object as managed by this controller
pub fn managed_by_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(
        MANAGED_BY_LABEL_KEY.to_string(),
        MANAGED_BY_LABEL_VALUE.to_string(),
    )])
}

/// Label selector matching objects managed by this controller
pub fn managed_by_selector() -> String {
    format!("{MANAGED_BY_LABEL_KEY}={MANAGED_BY_LABEL_VALUE}")
}
