//! # Value Trees
//!
//! Typed values for the shipped bundles. Reconcilers build these structs and
//! hand them to the renderer through [`to_value_tree`], the single point where
//! typed values become the untyped tree templates consume.

use crate::appconfig::AppConfig;
use crate::constants::{DEFAULT_CPU_LIMIT, DEFAULT_MEMORY_LIMIT, DEFAULT_TARGET_MEMORY_UTILIZATION};
use serde::Serialize;
use serde_json::Value;

/// Values for the `application` bundle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationValues {
    pub main: MainValues,
}

/// The user's application container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MainValues {
    pub application_name: String,
    pub image: String,
    pub replica_count: u32,
    pub service: ServiceValues,
    pub hpa: HpaValues,
    pub resources: ResourceValues,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_secret_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceValues {
    pub enabled: bool,
    #[serde(rename = "type")]
    pub service_type: String,
    pub ports: Vec<ServicePortValues>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePortValues {
    pub name: String,
    pub port: u16,
    pub target_port: u16,
    pub protocol: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HpaValues {
    pub min_replicas: u32,
    pub max_replicas: u32,
    pub target_memory_utilization_percentage: u32,
}

impl Default for HpaValues {
    fn default() -> Self {
        Self {
            min_replicas: 1,
            max_replicas: 1,
            target_memory_utilization_percentage: DEFAULT_TARGET_MEMORY_UTILIZATION,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResourceValues {
    pub limits: ResourceLimits,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceLimits {
    pub cpu: String,
    pub memory: String,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpu: DEFAULT_CPU_LIMIT.to_string(),
            memory: DEFAULT_MEMORY_LIMIT.to_string(),
        }
    }
}

impl ApplicationValues {
    /// Values for deploying `config` under the stable name `application_name`
    pub fn from_app_config(
        application_name: &str,
        config: &AppConfig,
        env_secret_name: Option<&str>,
    ) -> Self {
        let hpa = config
            .service
            .scale
            .map_or_else(HpaValues::default, |scale| {
                // The API server rejects an autoscaler whose max is below its min
                let min_replicas = scale.min.max(1);
                HpaValues {
                    min_replicas,
                    max_replicas: scale.max.max(min_replicas),
                    ..HpaValues::default()
                }
            });

        // Only HTTP listeners are exposed; the port mirrors the container port
        let ports: Vec<ServicePortValues> = config
            .service
            .http
            .iter()
            .map(|http| ServicePortValues {
                name: format!("http-{}", http.target_port),
                port: http.target_port,
                target_port: http.target_port,
                protocol: "TCP".to_string(),
            })
            .collect();
        let service = ServiceValues {
            enabled: !ports.is_empty(),
            service_type: "ClusterIP".to_string(),
            ports,
        };

        let limits = config
            .service
            .machine_config
            .as_ref()
            .map_or_else(ResourceLimits::default, |machine| ResourceLimits {
                cpu: machine.cpu.clone(),
                memory: machine.memory.clone(),
            });

        Self {
            main: MainValues {
                application_name: application_name.to_string(),
                image: config.build.image.clone(),
                replica_count: hpa.min_replicas.max(1),
                service,
                hpa,
                resources: ResourceValues { limits },
                env_secret_name: env_secret_name
                    .filter(|name| !name.is_empty())
                    .map(str::to_string),
            },
        }
    }
}

/// Values for the `portal` bundle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalValues {
    pub namespace: String,
    pub name_prefix: String,
}

impl PortalValues {
    pub fn for_portal(name: &str) -> Self {
        Self {
            namespace: name.to_string(),
            name_prefix: name.to_string(),
        }
    }
}

/// Convert typed values into the template value tree
pub fn to_value_tree<T: Serialize>(values: &T) -> Result<Value, serde_json::Error> {
    serde_json::to_value(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appconfig::{HttpServiceConfig, MachineConfig, ScaleConfig};
    use serde_json::json;

    #[test]
    fn test_defaults_without_scale_or_machine_config() {
        let mut config = AppConfig::default();
        config.build.image = "app:1".to_string();
        let values = ApplicationValues::from_app_config("demo-production", &config, None);

        assert_eq!(values.main.application_name, "demo-production");
        assert_eq!(values.main.hpa.min_replicas, 1);
        assert_eq!(values.main.hpa.max_replicas, 1);
        assert_eq!(values.main.resources.limits.cpu, "100m");
        assert_eq!(values.main.resources.limits.memory, "128Mi");
        assert!(!values.main.service.enabled);
        assert!(values.main.service.ports.is_empty());
    }

    #[test]
    fn test_http_ports_scale_and_limits() {
        let mut config = AppConfig::default();
        config.service.http = vec![
            HttpServiceConfig { target_port: 8080 },
            HttpServiceConfig { target_port: 9090 },
        ];
        config.service.scale = Some(ScaleConfig { min: 2, max: 5 });
        config.service.machine_config = Some(MachineConfig {
            cpu: "500m".to_string(),
            memory: "1Gi".to_string(),
        });
        let values = ApplicationValues::from_app_config("demo", &config, Some("demo-env"));

        assert!(values.main.service.enabled);
        assert_eq!(values.main.service.ports[1].name, "http-9090");
        assert_eq!(values.main.service.ports[1].port, 9090);
        assert_eq!(values.main.replica_count, 2);
        assert_eq!(values.main.hpa.max_replicas, 5);
        assert_eq!(values.main.resources.limits.memory, "1Gi");
        assert_eq!(values.main.env_secret_name.as_deref(), Some("demo-env"));
    }

    #[test]
    fn test_inverted_scale_bounds_are_clamped() {
        let mut config = AppConfig::default();
        config.service.scale = Some(ScaleConfig { min: 4, max: 2 });
        let values = ApplicationValues::from_app_config("demo", &config, None);
        assert_eq!(values.main.hpa.min_replicas, 4);
        assert_eq!(values.main.hpa.max_replicas, 4);
        assert_eq!(values.main.replica_count, 4);

        config.service.scale = Some(ScaleConfig { min: 0, max: 0 });
        let values = ApplicationValues::from_app_config("demo", &config, None);
        assert_eq!(values.main.hpa.min_replicas, 1);
        assert_eq!(values.main.hpa.max_replicas, 1);
    }

    #[test]
    fn test_value_tree_uses_template_keys() {
        let tree = to_value_tree(&ApplicationValues::from_app_config(
            "demo",
            &AppConfig::default(),
            None,
        ))
        .unwrap();
        assert_eq!(tree["main"]["applicationName"], "demo");
        assert_eq!(tree["main"]["service"]["type"], "ClusterIP");
        assert_eq!(tree["main"]["hpa"]["targetMemoryUtilizationPercentage"], 50);
        assert!(tree["main"].get("envSecretName").is_none());

        let portal = to_value_tree(&PortalValues::for_portal("tenant")).unwrap();
        assert_eq!(portal, json!({ "namespace": "tenant", "namePrefix": "tenant" }));
    }
}
