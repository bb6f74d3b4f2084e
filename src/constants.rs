// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the Verrazzano cluster operator.
//!
//! This module contains the well-known names, namespaces, and timing constants used
//! throughout the codebase. Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group for the `VerrazzanoManagedCluster` CRD
pub const API_GROUP: &str = "clusters.verrazzano.io";

/// API version for the `VerrazzanoManagedCluster` CRD
pub const API_VERSION: &str = "v1alpha1";

/// Kind name for the `VerrazzanoManagedCluster` resource
pub const KIND_VMC: &str = "VerrazzanoManagedCluster";

/// Finalizer that gates VMC deletion cleanup
pub const VMC_FINALIZER: &str = "managedcluster.verrazzano.io";

// ============================================================================
// Namespaces
// ============================================================================

/// Namespace holding VMCs and their generated secrets on the admin cluster
pub const MULTICLUSTER_NAMESPACE: &str = "verrazzano-mc";

/// Verrazzano system namespace (admin and managed clusters)
pub const VERRAZZANO_SYSTEM_NAMESPACE: &str = "verrazzano-system";

/// Namespace of the monitoring stack (Prometheus, Thanos)
pub const VERRAZZANO_MONITORING_NAMESPACE: &str = "verrazzano-monitoring";

/// Namespace of the operator-managed OpenSearch
pub const VERRAZZANO_LOGGING_NAMESPACE: &str = "verrazzano-logging";

/// Namespace Rancher is installed in
pub const CATTLE_SYSTEM_NAMESPACE: &str = "cattle-system";

/// Namespace Argo CD is installed in
pub const ARGOCD_NAMESPACE: &str = "argocd";

/// Namespace Keycloak is installed in
pub const KEYCLOAK_NAMESPACE: &str = "keycloak";

// ============================================================================
// Labels and annotations
// ============================================================================

/// Label set on VMCs that were created from a Rancher-originated cluster
pub const CREATED_BY_LABEL: &str = "verrazzano.io/created-by";

/// Value of [`CREATED_BY_LABEL`] for VMCs created by Verrazzano itself
pub const CREATED_BY_VERRAZZANO: &str = "verrazzano";

/// Annotation linking a token secret to its service account
pub const SERVICE_ACCOUNT_NAME_ANNOTATION: &str = "kubernetes.io/service-account.name";

/// Secret type for long-lived service account tokens
pub const SERVICE_ACCOUNT_TOKEN_SECRET_TYPE: &str = "kubernetes.io/service-account-token";

/// Label marking an Argo CD cluster secret
pub const ARGOCD_SECRET_TYPE_LABEL: &str = "argocd.argoproj.io/secret-type";

// ============================================================================
// Admin cluster secrets and config
// ============================================================================

/// ClusterRole bound to each managed cluster service account
pub const MANAGED_CLUSTER_CLUSTER_ROLE: &str = "verrazzano-managed-cluster";

/// ConfigMap holding the admin cluster API server URL
pub const ADMIN_CLUSTER_CONFIGMAP: &str = "verrazzano-admin-cluster";

/// Key in [`ADMIN_CLUSTER_CONFIGMAP`] with the API server URL
pub const ADMIN_CLUSTER_SERVER_KEY: &str = "server";

/// Verrazzano ingress TLS secret
pub const VERRAZZANO_TLS_SECRET: &str = "verrazzano-tls";

/// Secret created on workload clusters that use a self-signed CA
pub const VERRAZZANO_TLS_CA_SECRET: &str = "verrazzano-tls-ca";

/// Private CA bundle secret in cattle-system
pub const PRIVATE_CA_BUNDLE_SECRET: &str = "tls-ca";

/// Key holding the private CA bundle
pub const PRIVATE_CA_BUNDLE_KEY: &str = "cacerts.pem";

/// Standard CA key in TLS secrets
pub const CA_CRT_KEY: &str = "ca.crt";

/// Key in the managed cluster CA secret
pub const CA_SECRET_KEY: &str = "cacrt";

/// Internal OpenSearch credentials secret
pub const ES_INTERNAL_SECRET: &str = "verrazzano-es-internal";

/// Default Fluentd OpenSearch URL when the VMI OpenSearch is used
pub const DEFAULT_OPENSEARCH_URL: &str = "http://verrazzano-authproxy-opensearch:8775";

/// Default OpenSearch URL when the OpenSearch operator is used
pub const DEFAULT_OPERATOR_OPENSEARCH_URL: &str = "http://opensearch.verrazzano-logging:9200";

/// Secret name meaning "no external OpenSearch secret configured"
pub const DEFAULT_OPENSEARCH_SECRET: &str = "verrazzano";

/// Ingress of the VMI OpenSearch
pub const VMI_OPENSEARCH_INGRESS: &str = "vmi-system-os-ingest";

/// Ingress of the operator-managed OpenSearch
pub const OPERATOR_OPENSEARCH_INGRESS: &str = "opensearch";

/// Keycloak ingress name (in [`KEYCLOAK_NAMESPACE`])
pub const KEYCLOAK_INGRESS: &str = "keycloak";

/// Secret holding the Keycloak admin password
pub const KEYCLOAK_ADMIN_SECRET: &str = "keycloak-http";

/// Keycloak admin user
pub const KEYCLOAK_ADMIN_USER: &str = "keycloakadmin";

/// Keycloak realm that owns managed cluster clients
pub const KEYCLOAK_REALM: &str = "verrazzano-system";

/// Secret holding the optional Jaeger OpenSearch credentials
pub const JAEGER_OPENSEARCH_SECRET: &str = "verrazzano-jaeger-secret";

// ============================================================================
// Managed cluster secret names and keys
// ============================================================================

/// Key in the agent secret with the admin cluster kubeconfig
pub const KUBECONFIG_KEY: &str = "admin-kubeconfig";

/// Key in a service account token secret
pub const TOKEN_KEY: &str = "token";

/// Key in the manifest secret with the YAML documents
pub const YAML_KEY: &str = "yaml";

/// Suffix of the kubeconfig Secret ClusterAPI writes for each workload cluster
pub const CAPI_KUBECONFIG_SECRET_SUFFIX: &str = "-kubeconfig";

/// Key in the ClusterAPI kubeconfig Secret
pub const CAPI_KUBECONFIG_KEY: &str = "value";

/// Agent secret name on the managed cluster
pub const MCAGENT_SECRET: &str = "verrazzano-cluster-agent";

/// Registration secret name on the managed cluster
pub const MCREGISTRATION_SECRET: &str = "verrazzano-cluster-registration";

/// Registration secret keys
pub const MANAGED_CLUSTER_NAME_KEY: &str = "managed-cluster-name";
pub const KEYCLOAK_URL_KEY: &str = "keycloak-url";
pub const ADMIN_CA_BUNDLE_KEY: &str = "ca-bundle";
pub const ES_URL_KEY: &str = "es-url";
pub const ES_CA_BUNDLE_KEY: &str = "es-ca-bundle";
pub const USERNAME_KEY: &str = "username";
pub const PASSWORD_KEY: &str = "password";
pub const JAEGER_OS_URL_KEY: &str = "jaeger-os-url";
pub const JAEGER_OS_CA_KEY: &str = "jaeger-os-ca-bundle";
pub const JAEGER_OS_USERNAME_KEY: &str = "jaeger-os-username";
pub const JAEGER_OS_PASSWORD_KEY: &str = "jaeger-os-password";

// ============================================================================
// Rancher
// ============================================================================

/// Rancher ingress name in [`CATTLE_SYSTEM_NAMESPACE`]
pub const RANCHER_INGRESS: &str = "rancher";

/// In-cluster ingress controller service that fronts the Rancher ingress
pub const RANCHER_INGRESS_SERVICE_HOST: &str =
    "ingress-controller-ingress-nginx-controller.ingress-nginx";

/// HTTPS port of [`RANCHER_INGRESS_SERVICE_HOST`]
pub const RANCHER_INGRESS_SERVICE_PORT: u16 = 443;

/// Rancher ingress TLS secret
pub const RANCHER_TLS_SECRET: &str = "tls-rancher-ingress";

/// Additional CA secret for Rancher
pub const RANCHER_ADDITIONAL_CA_SECRET: &str = "tls-ca-additional";

/// Key in [`RANCHER_ADDITIONAL_CA_SECRET`]
pub const RANCHER_ADDITIONAL_CA_KEY: &str = "ca-additional.pem";

/// Rancher admin secret
pub const RANCHER_ADMIN_SECRET: &str = "rancher-admin-secret";

/// Rancher admin user name
pub const RANCHER_ADMIN_USERNAME: &str = "admin";

/// Secret holding the Verrazzano cluster user password
pub const VERRAZZANO_CLUSTER_USER_SECRET: &str = "verrazzano-cluster-registrar";

/// Rancher user used for cluster registration
pub const VERRAZZANO_CLUSTER_USERNAME: &str = "vz-cluster-reg";

/// Rancher role template granted to the cluster user
pub const VERRAZZANO_CLUSTER_ROLE_TEMPLATE: &str = "verrazzano-cluster-registrar";

/// Secret holding the Argo CD registration user password
pub const ARGOCD_CLUSTER_USER_SECRET: &str = "argocd-registration";

/// Rancher user used for Argo CD registration
pub const ARGOCD_CLUSTER_USERNAME: &str = "vz-argoCD-reg";

/// Rancher role template granted to the Argo CD user
pub const ARGOCD_ROLE_TEMPLATE: &str = "cluster-owner";

/// Password key used by all credential secrets
pub const PASSWORD_SECRET_KEY: &str = "password";

// ============================================================================
// Argo CD
// ============================================================================

/// In-cluster Argo CD API server
pub const ARGOCD_SERVER_URL: &str = "https://argocd-server.argocd.svc";

/// Argo CD initial admin secret
pub const ARGOCD_ADMIN_SECRET: &str = "argocd-initial-admin-secret";

/// Argo CD admin user
pub const ARGOCD_ADMIN_USERNAME: &str = "admin";

/// Argo CD server ingress name (in [`ARGOCD_NAMESPACE`])
pub const ARGOCD_INGRESS: &str = "argocd-server";

// ============================================================================
// Metrics federation
// ============================================================================

/// ConfigMap listing Thanos store endpoints
pub const THANOS_ENDPOINTS_CONFIGMAP: &str = "verrazzano-thanos-endpoints";

/// Key in [`THANOS_ENDPOINTS_CONFIGMAP`]
pub const THANOS_SERVICE_DISCOVERY_KEY: &str = "servicediscovery.yml";

/// Label carried by each Thanos endpoint entry
pub const THANOS_CLUSTER_LABEL: &str = "verrazzano_cluster";

/// Port used for Thanos gRPC store endpoints
pub const THANOS_GRPC_PORT: u16 = 443;

/// Secret holding additional Prometheus scrape jobs
pub const PROMETHEUS_SCRAPE_CONFIGS_SECRET: &str = "additional-scrape-configs";

/// Key in [`PROMETHEUS_SCRAPE_CONFIGS_SECRET`]
pub const PROMETHEUS_SCRAPE_CONFIGS_KEY: &str = "jobs";

/// Secret holding managed cluster CA certs for scraping
pub const PROMETHEUS_MANAGED_CA_SECRET: &str = "managed-cluster-ca-certs";

/// Secret holding the internal Prometheus password
pub const PROMETHEUS_INTERNAL_SECRET: &str = "verrazzano-prom-internal";

/// User the admin Prometheus authenticates to managed clusters as
pub const PROMETHEUS_INTERNAL_USERNAME: &str = "verrazzano-prom-internal";

/// Directory the managed cluster CA certs are mounted at in Prometheus
pub const PROMETHEUS_CA_MOUNT_PATH: &str = "/etc/prometheus/managed-certs";

// ============================================================================
// Reconciliation timing
// ============================================================================

/// Requeue interval after a successful reconcile (3 minutes)
pub const RECONCILE_REQUEUE_INTERVAL_SECS: u64 = 180;

/// Lower bound of the jittered requeue after an error
pub const ERROR_REQUEUE_MIN_SECS: u64 = 2;

/// Upper bound of the jittered requeue after an error
pub const ERROR_REQUEUE_MAX_SECS: u64 = 3;

/// Interval at which the managed cluster agent reports a heartbeat
pub const VMC_AGENT_POLLING_INTERVAL_SECS: i64 = 60;

/// Number of missed heartbeats before a cluster is considered inactive
pub const MAX_TIMES_VMC_AGENT_POLLING: i64 = 3;

// ============================================================================
// HTTP
// ============================================================================

/// TLS handshake / connect timeout for outbound HTTP clients
pub const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Longest wait for any single read, which bounds the wait for response headers
pub const HTTP_READ_TIMEOUT_SECS: u64 = 10;

/// Overall request timeout for outbound HTTP clients
pub const HTTP_CLIENT_TIMEOUT_SECS: u64 = 30;

/// Default metrics listen address
pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:8080";
