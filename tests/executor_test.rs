//! End-to-end evaluation of dataspec graphs

mod common;

use common::*;
use dataspec::constants::PRIVATE_QUERY;
use dataspec::dataspec::{Arg, DataSpec, DataSpecKind, Source};
use dataspec::external_op::Executor;
use dataspec::protection::ProtectionCodec;
use dataspec::tabular::Tabular;
use dataspec::{DataSpecError, DpParameters, ExecutionConfig};
use serde_json::json;

#[tokio::test]
async fn test_source_evaluates_to_its_data() {
    init_test_logging();
    let executor = Executor::default();
    let protected = executor.evaluate_dataset(&protected_people()).await.unwrap();
    assert_eq!(protected.data, Tabular::Frame(people()));
    assert_eq!(protected.protection, Some(people_protection()));

    let public = executor.to_table(&public_people()).await.unwrap();
    assert_eq!(public, people());
}

#[tokio::test]
async fn test_pep_result_is_merged_in_protected_format() {
    let registry = registry();
    let head = dataset(&registry, "pandas.pd_head", vec![Arg::from(&protected_people()), json!(2).into()]);

    let table = Executor::default().to_table(&head).await.unwrap();
    assert!(ProtectionCodec::is_protected_format(&table));
    assert_eq!(table.num_rows(), 2);

    let (data, protection) = ProtectionCodec::extract(&table).unwrap();
    assert_eq!(data, Tabular::Frame(people().head(2)));
    let protection = protection.expect("head keeps protection");
    assert_eq!(
        protection.user_id(),
        &[Some("u1".to_string()), Some("u2".to_string())]
    );
}

#[tokio::test]
async fn test_protection_follows_filtered_rows() {
    let registry = registry();
    let filtered = dataset(
        &registry,
        "pandas.pd_getitem",
        vec![Arg::from(&protected_people()), Arg::from(&public_mask([false, true, true]))],
    );

    let result = Executor::default().evaluate_dataset(&filtered).await.unwrap();
    assert_eq!(result.data.index(), &[1, 2]);
    let protection = result.protection.expect("filter is PEP");
    assert_eq!(protection.index(), &[1, 2]);
    assert_eq!(
        protection.user_id(),
        &[Some("u2".to_string()), Some("u3".to_string())]
    );
}

#[tokio::test]
async fn test_protected_format_table_is_unpacked_at_the_source() {
    let registry = registry();
    let merged = ProtectionCodec::merge(&Tabular::Frame(people()), Some(&people_protection())).unwrap();
    let source = DataSpec::source(Source::dataset(merged).unwrap());
    assert!(source.is_pep());

    let ages = dataset(&registry, "pandas.pd_getitem", vec![Arg::from(&source), json!("age").into()]);
    let result = Executor::default().evaluate_dataset(&ages).await.unwrap();
    let series = result.data.as_series().expect("single column key gives a series");
    assert_eq!(series.values, vec![json!(31), json!(45), json!(27)]);
    assert_eq!(result.protection, Some(people_protection()));
}

#[tokio::test]
async fn test_misaligned_inputs_evaluate_unprotected() {
    let registry = registry();
    let ages_a = dataset(&registry, "pandas.pd_getitem", vec![Arg::from(&protected_people()), json!("age").into()]);
    let ages_b = dataset(&registry, "pandas.pd_getitem", vec![Arg::from(&protected_people()), json!("age").into()]);
    let added = dataset(&registry, "pandas.pd_add", vec![Arg::from(&ages_a), Arg::from(&ages_b)]);

    let result = Executor::default().evaluate_dataset(&added).await.unwrap();
    assert!(result.protection.is_none());
    let series = result.data.as_series().unwrap();
    assert_eq!(series.values, vec![json!(62), json!(90), json!(54)]);
}

#[tokio::test]
async fn test_plain_scalar_value() {
    let registry = registry();
    let shape = scalar(&registry, "pandas.pd_shape", vec![Arg::from(&protected_people())]);
    let sum = scalar(
        &registry,
        "pandas.pd_sum",
        vec![Arg::from(&dataset(
            &registry,
            "pandas.pd_getitem",
            vec![Arg::from(&public_people()), json!("age").into()],
        ))],
    );

    let executor = Executor::default();
    assert_eq!(executor.value(&shape).await.unwrap(), json!([3, 3]));
    assert_eq!(executor.value(&sum).await.unwrap(), json!(103));
}

#[tokio::test]
async fn test_dp_shape_attaches_private_query() {
    let registry = registry();
    let shape = scalar(&registry, "pandas.pd_shape", vec![Arg::from(&protected_people())]);
    let dp = shape
        .dp_variant(DpParameters::new(2.0, 0.0).with_seed(42))
        .unwrap()
        .unwrap();

    let value = Executor::default().value(&dp).await.unwrap();
    assert_eq!(value[1], json!(3));
    assert!(value[0].as_u64().is_some());

    let property = dp.property(PRIVATE_QUERY).expect("private query attached");
    let queries: serde_json::Value = serde_json::from_str(&property).unwrap();
    assert_eq!(queries.as_array().unwrap().len(), 1);
    assert_eq!(queries[0]["kind"], json!("laplace"));
    assert_eq!(queries[0]["epsilon"], json!(2.0));

    let again = Executor::default().value(&dp).await.unwrap();
    assert_eq!(value, again);
}

#[tokio::test]
async fn test_dp_shape_with_zero_epsilon_fails_budget_validation() {
    let registry = registry();
    let shape = scalar(&registry, "pandas.pd_shape", vec![Arg::from(&protected_people())]);
    let dp = shape.dp_variant(DpParameters::new(0.0, 0.0)).unwrap().unwrap();

    let err = Executor::default().value(&dp).await.unwrap_err();
    assert!(matches!(err, DataSpecError::InvalidBudget { .. }));
    assert!(dp.property(PRIVATE_QUERY).is_none());
}

#[tokio::test]
async fn test_private_query_is_attached_once() {
    let registry = registry();
    let shape = scalar(&registry, "pandas.pd_shape", vec![Arg::from(&protected_people())]);
    let dp = shape.dp_variant(DpParameters::new(1.0, 0.0)).unwrap().unwrap();
    assert!(dp.attach_property_once(PRIVATE_QUERY, "[]".to_string()).unwrap());

    Executor::default().value(&dp).await.unwrap();
    assert_eq!(dp.property(PRIVATE_QUERY).as_deref(), Some("[]"));
    assert!(!dp.attach_property_once(PRIVATE_QUERY, "[{}]".to_string()).unwrap());
}

#[tokio::test]
async fn test_dp_without_protection_is_missing_protection() {
    let registry = registry();
    let shape = scalar(&registry, "pandas.pd_shape", vec![Arg::from(&public_people())]);
    let dp = shape.dp_variant(DpParameters::new(1.0, 0.0)).unwrap().unwrap();

    let err = Executor::default().value(&dp).await.unwrap_err();
    assert!(matches!(err, DataSpecError::MissingProtection { .. }));
}

#[tokio::test]
async fn test_dp_with_distinct_protections_is_inconsistent() {
    let registry = registry();
    let a = protected_people();
    let b = DataSpec::source(
        Source::protected(people(), dataspec::ProtectionTable::for_users(["v1", "v2", "v3"])).unwrap(),
    );
    let pair = scalar(&registry, "test.pair_count", vec![Arg::from(&a), Arg::from(&b)]);
    let dp = pair.dp_variant(DpParameters::new(1.0, 0.0)).unwrap().unwrap();

    let err = Executor::default().value(&dp).await.unwrap_err();
    assert_eq!(
        err,
        DataSpecError::InconsistentProtection {
            dataspec: dp.uuid().to_string(),
            distinct: 2
        }
    );
}

#[tokio::test]
async fn test_unsupported_result_type() {
    let registry = registry();
    let constant = dataset(&registry, "test.constant", vec![json!(1).into()]);
    let err = Executor::default().to_table(&constant).await.unwrap_err();
    assert!(matches!(err, DataSpecError::UnsupportedResultType { .. }));
}

#[tokio::test]
async fn test_unknown_operator_is_rejected_at_creation() {
    let registry = registry();
    let err = DataSpec::apply(
        &registry,
        DataSpecKind::Dataset,
        "pandas.pd_pivot",
        vec![Arg::from(&public_people())],
        Vec::new(),
    )
    .unwrap_err();
    assert_eq!(err, DataSpecError::unknown_operator("pandas.pd_pivot"));
}

#[tokio::test]
async fn test_function_argument_errors_name_the_transform() {
    let registry = registry();
    let missing = dataset(
        &registry,
        "pandas.pd_getitem",
        vec![Arg::from(&public_people()), json!("salary").into()],
    );
    match Executor::default().evaluate_dataset(&missing).await.unwrap_err() {
        DataSpecError::Argument { transform_id, message } => {
            assert_eq!(transform_id, "pandas.pd_getitem");
            assert!(message.contains("salary"));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_each_dataspec_evaluated_once() {
    let registry = registry();
    let df = protected_people();
    let age = dataset(&registry, "pandas.pd_getitem", vec![Arg::from(&df), json!("age").into()]);
    let doubled = dataset(&registry, "pandas.pd_add", vec![Arg::from(&age), Arg::from(&age)]);

    let executor = Executor::default();
    let result = executor.evaluate_dataset(&doubled).await.unwrap();
    assert_eq!(executor.evaluated_count(), 3);
    assert_eq!(result.protection, Some(people_protection()));
    assert_eq!(
        result.data.as_series().unwrap().values,
        vec![json!(62), json!(90), json!(54)]
    );
}

#[tokio::test]
async fn test_schema_marks_pep_datasets() {
    let registry = registry();
    let selected = dataset(
        &registry,
        "pandas.pd_getitem",
        vec![Arg::from(&protected_people()), json!(["age", "city"]).into()],
    );
    let executor = Executor::new(ExecutionConfig::default());

    let schema = executor.schema(&selected).await.unwrap();
    assert!(schema.protected);
    assert_eq!(schema.field_names(), vec!["age", "city"]);

    let public_schema = executor.schema(&public_people()).await.unwrap();
    assert!(!public_schema.protected);
    assert_eq!(public_schema.field_names(), vec!["id", "age", "city"]);
}

#[tokio::test]
async fn test_schema_of_dp_dataspec_uses_plain_equivalent() {
    let registry = registry();
    let shape = scalar(&registry, "pandas.pd_shape", vec![Arg::from(&protected_people())]);
    let dp = shape.dp_variant(DpParameters::new(1.0, 0.0)).unwrap().unwrap();

    let synthetic = dp.synthetic().unwrap();
    assert_eq!(synthetic.transform().unwrap().id, "pandas.pd_shape");
    assert!(synthetic.transform().unwrap().dp.is_none());
    assert_eq!(Executor::default().value(&synthetic).await.unwrap(), json!([1, 3]));
}
