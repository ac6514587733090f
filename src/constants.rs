//! # Constants
//!
//! Default values and well-known names shared across the controller.

/// Label carried by every object this controller creates
pub const MANAGED_BY_LABEL_KEY: &str = "tacokumo.github.io/managed-by";

/// Value of [`MANAGED_BY_LABEL_KEY`] on objects this controller creates
pub const MANAGED_BY_LABEL_VALUE: &str = "portal-controller";

/// Field manager / controller name reported to the API server
pub const CONTROLLER_NAME: &str = "portal-controller";

/// Stage substituted when an AppConfig declares none
pub const DEFAULT_STAGE_NAME: &str = "production";

/// Path of the application configuration inside the repository when unset
pub const DEFAULT_APPCONFIG_PATH: &str = "appconfig.yaml";

/// Branch used by Applications whose template names neither branch nor commit
pub const DEFAULT_APPCONFIG_BRANCH: &str = "main";

/// Directory holding the template bundles
pub const DEFAULT_BUNDLE_DIR: &str = "bundles";

/// Bundle rendered for each Release
pub const DEFAULT_APPLICATION_BUNDLE: &str = "application";

/// Bundle rendered for each Portal
pub const DEFAULT_PORTAL_BUNDLE: &str = "portal";

/// Requeue delay after a state transition (seconds)
pub const DEFAULT_TRANSITION_REQUEUE_SECS: u64 = 2;

/// Requeue delay while waiting on children, pods or namespaces (seconds)
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Lower bound of the error backoff (seconds)
pub const DEFAULT_ERROR_BACKOFF_MIN_SECS: u64 = 5;

/// Upper bound of the error backoff (seconds)
pub const DEFAULT_ERROR_BACKOFF_MAX_SECS: u64 = 300;

/// HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Resource limits applied when an AppConfig has no machine configuration
pub const DEFAULT_CPU_LIMIT: &str = "100m";
pub const DEFAULT_MEMORY_LIMIT: &str = "128Mi";

/// Memory utilization target of the generated HorizontalPodAutoscaler
pub const DEFAULT_TARGET_MEMORY_UTILIZATION: u32 = 50;

/// How long to wait for the HTTP server to bind at startup (seconds)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// How often to check whether the HTTP server is ready at startup (milliseconds)
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;
