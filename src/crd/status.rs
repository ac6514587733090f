//! # Resource Status
//!
//! Status types for tracking each resource's state machine and conditions.
//!
//! The `state` field is persisted as a plain string so that unknown or cleared
//! values can be observed and normalized back to the initial state.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A resource's state-machine state
pub trait ResourceState: Copy + Eq + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// State an empty or unknown `state` field normalizes to
    const INITIAL: Self;
    /// Terminal failure state
    const FAILURE: Self;

    fn as_str(self) -> &'static str;

    fn parse(value: &str) -> Option<Self>;

    /// No further work happens in this state until an external actor resets it
    fn is_terminal(self) -> bool;

    /// The resource is fully converged
    fn is_ready(self) -> bool;
}

/// Access to the state and conditions persisted in a resource's status
pub trait StatefulResource: Send + Sync {
    type State: ResourceState;

    /// Raw persisted `state` value
    fn raw_state(&self) -> Option<&str>;

    /// Mutable state and condition fields, creating an empty status if needed
    fn status_fields(&mut self) -> (&mut Option<String>, &mut Vec<Condition>);

    /// Parsed state; `None` for empty or unknown values
    fn observed_state(&self) -> Option<Self::State> {
        self.raw_state().and_then(Self::State::parse)
    }

    fn set_state(&mut self, state: Self::State) {
        *self.status_fields().0 = Some(state.as_str().to_string());
    }
}

macro_rules! resource_state {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($variant:ident => $text:literal),+ $(,)?
        }
        initial = $initial:ident,
        failure = $failure:ident,
        ready = $ready:ident,
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl ResourceState for $name {
            const INITIAL: Self = Self::$initial;
            const FAILURE: Self = Self::$failure;

            fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            fn parse(value: &str) -> Option<Self> {
                match value {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }

            fn is_terminal(self) -> bool {
                matches!(self, Self::$ready | Self::$failure)
            }

            fn is_ready(self) -> bool {
                self == Self::$ready
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

resource_state! {
    /// Application lifecycle: Provisioning -> Waiting -> Running, Error on failure
    ApplicationState {
        Provisioning => "Provisioning",
        Waiting => "Waiting",
        Running => "Running",
        Error => "Error",
    }
    initial = Provisioning,
    failure = Error,
    ready = Running,
}

resource_state! {
    /// Release lifecycle: Deploying -> Deployed, Failed on failure
    ReleaseState {
        Deploying => "Deploying",
        Deployed => "Deployed",
        Failed => "Failed",
    }
    initial = Deploying,
    failure = Failed,
    ready = Deployed,
}

resource_state! {
    /// Portal lifecycle: Provisioning -> Waiting -> Running, Error on failure
    PortalState {
        Provisioning => "Provisioning",
        Waiting => "Waiting",
        Running => "Running",
        Error => "Error",
    }
    initial = Provisioning,
    failure = Error,
    ready = Running,
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last transition time (RFC3339)
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default)]
    pub message: Option<String>,
}

/// Reference to a child object recorded in a parent's status
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChildReference {
    #[serde(default)]
    pub api_version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub uid: String,
}

/// Status of the Application resource
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationStatus {
    /// Current state: Provisioning, Waiting, Running, Error
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Child Releases, one per stage, in stage order
    #[serde(default)]
    pub releases: Vec<ChildReference>,
}

/// Status of the Release resource
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseStatus {
    /// Current state: Deploying, Deployed, Failed
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Status of the Portal resource
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PortalStatus {
    /// Current state: Provisioning, Waiting, Running, Error
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}
