mod support;

use metric_service::{
    models::{
        DataType, ExternalAttribute, MetricAttrSum, MetricInfo, MetricInm, MetricKind,
        MetricRecord, MetricSs,
    },
    repository::{MetricRepository, RepoError},
};
use pretty_assertions::assert_eq;
use support::{harness::with_store_harness, vcenter_store};

fn inm(name: &str, coefficient: f64) -> MetricRecord {
    MetricRecord::InstanceNumber(MetricInm {
        id: String::new(),
        name: name.into(),
        coefficient,
        default: false,
    })
}

fn ss(name: &str, reference_value: i32) -> MetricRecord {
    MetricRecord::Static(MetricSs {
        id: String::new(),
        name: name.into(),
        reference_value,
        default: true,
    })
}

fn cores_sum(name: &str) -> MetricRecord {
    MetricRecord::AttributeSum(MetricAttrSum {
        id: String::new(),
        name: name.into(),
        eq_type: "server".into(),
        attribute_name: "cores_per_processor".into(),
        reference_value: 2.5,
        attribute: Some(ExternalAttribute {
            id: "a1".into(),
            name: "cores_per_processor".into(),
            data_type: DataType::Int,
            primary_key: false,
            displayed: true,
            searchable: true,
            parent_identifier: false,
            mapped_to: "cpu_cores".into(),
        }),
        default: false,
    })
}

#[tokio::test]
async fn empty_scope_reads_as_no_data() {
    with_store_harness(|harness| async move {
        let store = &harness.store;
        let scope = harness.scope.as_str();

        assert!(matches!(
            store.list_metrics(scope).await,
            Err(RepoError::NoData)
        ));
        assert!(matches!(
            store.equipment_types(scope).await,
            Err(RepoError::NoData)
        ));
        assert!(matches!(
            store
                .get_metric(scope, MetricKind::InstanceNumber, "inm.custom")
                .await,
            Err(RepoError::NoData)
        ));
        assert!(matches!(
            store.update_metric(scope, &inm("inm.custom", 2.0)).await,
            Err(RepoError::NoData)
        ));
    })
    .await;
}

#[tokio::test]
async fn stored_config_reads_back_unchanged() {
    with_store_harness(|harness| async move {
        let store = &harness.store;
        let scope = harness.scope.as_str();

        let created = store
            .create_metric(scope, cores_sum("attr.sum.cores"))
            .await
            .unwrap();
        assert!(!created.id().is_empty());

        let read = store
            .get_metric(scope, MetricKind::AttributeSum, "attr.sum.cores")
            .await
            .unwrap();
        assert_eq!(read, created);

        let defaults = store.create_metric(scope, ss("ss.default", 4)).await.unwrap();
        assert!(defaults.is_default());

        assert_eq!(
            store.list_metrics(scope).await.unwrap(),
            vec![
                MetricInfo {
                    name: "attr.sum.cores".into(),
                    kind: MetricKind::AttributeSum,
                },
                MetricInfo {
                    name: "ss.default".into(),
                    kind: MetricKind::Static,
                },
            ]
        );
    })
    .await;
}

#[tokio::test]
async fn lookup_is_scoped_by_kind() {
    with_store_harness(|harness| async move {
        let store = &harness.store;
        let scope = harness.scope.as_str();

        store.create_metric(scope, inm("shared", 1.0)).await.unwrap();

        assert!(matches!(
            store.get_metric(scope, MetricKind::Static, "shared").await,
            Err(RepoError::NoData)
        ));
    })
    .await;
}

#[tokio::test]
async fn unique_index_reports_duplicates_across_kinds() {
    with_store_harness(|harness| async move {
        let store = &harness.store;
        let scope = harness.scope.as_str();

        store.create_metric(scope, inm("Ops", 1.0)).await.unwrap();

        let err = store
            .create_metric(scope, ss("  ops ", 2))
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::Duplicate(name) if name == "ops"));

        // The same name in another scope is a different metric.
        let other = harness.sibling_scope();
        store.create_metric(&other, inm("Ops", 1.0)).await.unwrap();
    })
    .await;
}

#[tokio::test]
async fn padded_names_are_stored_trimmed_and_found() {
    with_store_harness(|harness| async move {
        let store = &harness.store;
        let scope = harness.scope.as_str();

        let created = store.create_metric(scope, inm("Ops ", 1.0)).await.unwrap();
        assert_eq!(created.name(), "Ops");

        let read = store
            .get_metric(scope, MetricKind::InstanceNumber, " OPS")
            .await
            .unwrap();
        assert_eq!(read, created);

        let mut changed = inm("ops ", 6.0);
        changed.set_id(created.id());
        store.update_metric(scope, &changed).await.unwrap();

        match store
            .get_metric(scope, MetricKind::InstanceNumber, "Ops")
            .await
            .unwrap()
        {
            MetricRecord::InstanceNumber(metric) => assert_eq!(metric.coefficient, 6.0),
            other => panic!("unexpected record {other:?}"),
        }
    })
    .await;
}

#[tokio::test]
async fn equipment_types_decode_parentage_and_typing() {
    with_store_harness(|harness| async move {
        let scope = harness.scope.as_str();
        harness
            .seed_equipment_types(scope, &vcenter_store())
            .await
            .unwrap();

        let mut types = harness.store.equipment_types(scope).await.unwrap();
        types.sort_by(|lhs, rhs| lhs.id.cmp(&rhs.id));
        assert_eq!(types, vcenter_store());

        assert!(matches!(
            harness.store.equipment_types(&harness.sibling_scope()).await,
            Err(RepoError::NoData)
        ));
    })
    .await;
}
