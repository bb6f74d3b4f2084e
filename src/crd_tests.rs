// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `crd.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use kube::CustomResourceExt;
    use serde_json::json;

    #[test]
    fn test_crd_identity() {
        let crd = VerrazzanoManagedCluster::crd();
        assert_eq!(crd.spec.group, "clusters.verrazzano.io");
        assert_eq!(crd.spec.names.kind, "VerrazzanoManagedCluster");
        assert_eq!(crd.spec.scope, "Namespaced");
        assert_eq!(crd.spec.names.short_names, Some(vec!["vmc".to_string()]));
        assert_eq!(crd.spec.versions[0].name, "v1alpha1");
    }

    #[test]
    fn test_from_capi_phase() {
        assert_eq!(ClusterState::from_capi_phase("Provisioned"), ClusterState::Provisioned);
        assert_eq!(ClusterState::from_capi_phase("Failed"), ClusterState::Failed);
        assert_eq!(ClusterState::from_capi_phase("Active"), ClusterState::Unknown);
        assert_eq!(ClusterState::from_capi_phase(""), ClusterState::Unknown);
    }

    #[test]
    fn test_status_wire_names() {
        let status = VerrazzanoManagedClusterStatus {
            rancher_registration: RancherRegistration {
                status: Some(RancherRegistrationStatus::RegistrationCompleted),
                cluster_id: "c-abc12".to_string(),
                ..Default::default()
            },
            argocd_registration: Some(ArgoCDRegistration {
                status: ArgoCDRegistrationStatus::Completed,
                message: "Successfully registered managed cluster in ArgoCD".to_string(),
                timestamp: None,
            }),
            api_url: "https://api.m1".to_string(),
            ..Default::default()
        };

        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["rancherRegistration"]["clusterID"], "c-abc12");
        assert_eq!(value["rancherRegistration"]["status"], "RegistrationCompleted");
        assert_eq!(value["argoCDRegistration"]["status"], "Completed");
        assert_eq!(value["apiUrl"], "https://api.m1");
        assert!(value.get("prometheusHost").is_none());
    }

    #[test]
    fn test_status_reads_agent_written_fields() {
        let status: VerrazzanoManagedClusterStatus = serde_json::from_value(json!({
            "lastAgentConnectTime": "2025-01-01T00:00:00Z",
            "prometheusHost": "prometheus.m1.example.com",
            "kubernetes": {"version": "v1.31.1"}
        }))
        .unwrap();

        assert_eq!(status.last_agent_connect_time.as_deref(), Some("2025-01-01T00:00:00Z"));
        assert_eq!(status.prometheus_host, "prometheus.m1.example.com");
        assert_eq!(status.kubernetes.version, "v1.31.1");
        assert!(!status.imported);
        assert!(status.conditions.is_empty());
    }

    #[test]
    fn test_condition_type_display() {
        assert_eq!(ConditionType::ManagedCARetrieved.to_string(), "ManagedCARetrieved");
        assert_eq!(ConditionType::Ready.to_string(), "Ready");
    }
}
