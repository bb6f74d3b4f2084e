// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `service_account.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::store::FakeStore;
    use crate::test_support::{persisted_vmc, vmc};
    use k8s_openapi::api::core::v1::ObjectReference;
    use std::collections::BTreeMap;

    const NS: &str = "verrazzano-mc";

    #[tokio::test]
    async fn test_sync_service_account_creates_account_and_token() {
        let store = FakeStore::new();
        let mut vmc = persisted_vmc(&store, &vmc("managed1"));

        sync_service_account(&store, &mut vmc).await.unwrap();

        let sa: ServiceAccount = store
            .peek_typed(NS, "verrazzano-cluster-managed1")
            .unwrap();
        let owner = &sa.metadata.owner_references.unwrap()[0];
        assert_eq!(owner.kind, "VerrazzanoManagedCluster");
        assert_eq!(owner.controller, Some(true));

        let token: Secret = store
            .peek_typed(NS, "verrazzano-cluster-managed1-token")
            .unwrap();
        assert_eq!(token.type_.as_deref(), Some(SERVICE_ACCOUNT_TOKEN_SECRET_TYPE));
        assert_eq!(
            token.metadata.annotations.unwrap()[SERVICE_ACCOUNT_NAME_ANNOTATION],
            "verrazzano-cluster-managed1"
        );
        assert_eq!(
            token.metadata.owner_references.unwrap()[0].kind,
            "ServiceAccount"
        );

        assert_eq!(
            vmc.spec.service_account.as_deref(),
            Some("verrazzano-cluster-managed1")
        );
        let stored: VerrazzanoManagedCluster = store.peek_typed(NS, "managed1").unwrap();
        assert_eq!(stored.spec.service_account, vmc.spec.service_account);
        assert_eq!(stored.metadata.resource_version, vmc.metadata.resource_version);
    }

    #[tokio::test]
    async fn test_sync_service_account_skips_token_when_secrets_listed() {
        let store = FakeStore::new();
        let mut vmc = persisted_vmc(&store, &vmc("managed1"));
        let mut sa = ServiceAccount::default();
        sa.metadata.name = Some("verrazzano-cluster-managed1".to_string());
        sa.metadata.namespace = Some(NS.to_string());
        sa.secrets = Some(vec![ObjectReference {
            name: Some("existing-token".to_string()),
            ..Default::default()
        }]);
        store.insert(&sa).unwrap();

        sync_service_account(&store, &mut vmc).await.unwrap();

        assert!(store
            .peek_typed::<Secret>(NS, "verrazzano-cluster-managed1-token")
            .is_none());
    }

    #[tokio::test]
    async fn test_sync_service_account_requires_persisted_vmc() {
        let store = FakeStore::new();
        let mut unsaved = vmc("managed1");
        let err = sync_service_account(&store, &mut unsaved).await.unwrap_err();
        assert!(err.to_string().contains("owner has no uid"));
    }

    #[tokio::test]
    async fn test_sync_managed_role_binding() {
        let store = FakeStore::new();
        let mut source = vmc("managed1");
        source.metadata.labels = Some(BTreeMap::from([("team".to_string(), "a".to_string())]));
        source.spec.service_account = Some("verrazzano-cluster-managed1".to_string());
        let vmc = persisted_vmc(&store, &source);

        let result = sync_managed_role_binding(&store, &vmc).await.unwrap();
        assert_eq!(result, OperationResult::Created);

        let binding: RoleBinding = store
            .peek_typed(NS, "verrazzano-cluster-managed1")
            .unwrap();
        assert_eq!(binding.role_ref.kind, "ClusterRole");
        assert_eq!(binding.role_ref.name, MANAGED_CLUSTER_CLUSTER_ROLE);
        let subject = &binding.subjects.unwrap()[0];
        assert_eq!(subject.kind, "ServiceAccount");
        assert_eq!(subject.name, "verrazzano-cluster-managed1");
        assert_eq!(subject.namespace.as_deref(), Some(MULTICLUSTER_NAMESPACE));
        assert_eq!(binding.metadata.labels.unwrap()["team"], "a");

        let again = sync_managed_role_binding(&store, &vmc).await.unwrap();
        assert_eq!(again, OperationResult::None);
    }
}
