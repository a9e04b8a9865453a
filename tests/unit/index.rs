//! Unit tests for the pool-to-bindings reverse index

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use policy_operator::controller::collect_binding_refs;
use policy_operator::controller::index::describe_refs;
use policy_operator::crd::FailurePolicy;

use crate::common::{AdmissionPolicyBuilder, ClusterAdmissionPolicyBuilder};

mod filtering_tests {
    use super::*;

    #[test]
    fn test_collects_only_bindings_on_the_pool() {
        let items = vec![
            AdmissionPolicyBuilder::new("p1", "team-a")
                .with_policy_server("pool-a")
                .build(),
            AdmissionPolicyBuilder::new("p2", "team-a")
                .with_policy_server("pool-b")
                .build(),
            AdmissionPolicyBuilder::new("p3", "team-b")
                .with_policy_server("pool-a")
                .build(),
        ];

        let refs = collect_binding_refs(&items, "pool-a");
        let ids: Vec<_> = refs.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["admissionpolicies/team-a/p1", "admissionpolicies/team-b/p3"]
        );
    }

    #[test]
    fn test_unassigned_bindings_never_match_a_pool() {
        let items = vec![AdmissionPolicyBuilder::new("p1", "team-a").build()];
        assert!(collect_binding_refs(&items, "pool-a").is_empty());
    }

    #[test]
    fn test_empty_list_yields_empty_index() {
        let items: Vec<policy_operator::crd::AdmissionPolicy> = Vec::new();
        assert!(collect_binding_refs(&items, "pool-a").is_empty());
    }

    #[test]
    fn test_terminating_bindings_still_count() {
        // A binding that is being deleted still blocks pool teardown until
        // its cleanup has run, so it must stay in the index.
        let mut terminating = AdmissionPolicyBuilder::new("p1", "team-a")
            .with_policy_server("pool-a")
            .build();
        terminating.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));

        let refs = collect_binding_refs(&[terminating], "pool-a");
        assert_eq!(refs.len(), 1);
    }

    #[test]
    fn test_cluster_scoped_ids_have_no_namespace() {
        let items = vec![
            ClusterAdmissionPolicyBuilder::new("c1")
                .with_policy_server("pool-a")
                .build(),
        ];
        let refs = collect_binding_refs(&items, "pool-a");
        assert_eq!(refs[0].id, "clusteradmissionpolicies/c1");
    }
}

mod projection_content_tests {
    use super::*;

    #[test]
    fn test_refs_carry_module_settings_and_flags() {
        let items = vec![
            AdmissionPolicyBuilder::new("p1", "team-a")
                .with_policy_server("pool-a")
                .with_module("registry://ghcr.io/example/verify-sig:v2.1.0")
                .with_settings(serde_json::json!({"keys": ["k1"]}))
                .with_mutating(true)
                .with_failure_policy(FailurePolicy::Ignore)
                .build(),
        ];

        let refs = collect_binding_refs(&items, "pool-a");
        assert_eq!(refs[0].module, "registry://ghcr.io/example/verify-sig:v2.1.0");
        assert_eq!(refs[0].settings.as_ref().unwrap()["keys"][0], "k1");
        assert!(refs[0].mutating);
        assert_eq!(refs[0].failure_policy, FailurePolicy::Ignore);
    }

    #[test]
    fn test_describe_refs_joins_ids() {
        let items = vec![
            AdmissionPolicyBuilder::new("p1", "team-a")
                .with_policy_server("pool-a")
                .build(),
            AdmissionPolicyBuilder::new("p2", "team-a")
                .with_policy_server("pool-a")
                .build(),
        ];
        let refs = collect_binding_refs(&items, "pool-a");
        assert_eq!(
            describe_refs(&refs),
            "admissionpolicies/team-a/p1, admissionpolicies/team-a/p2"
        );
    }

    #[test]
    fn test_describe_empty_refs() {
        assert_eq!(describe_refs(&[]), "");
    }
}
