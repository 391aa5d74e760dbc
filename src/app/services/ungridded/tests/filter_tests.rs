//! Tests for metadata predicate filtering

use super::*;
use crate::Error;
use crate::app::models::MetaValue;
use crate::app::services::ungridded::{FilterSpec, MetaFilter, Predicate};
use crate::config::OutlierConfig;

#[test]
fn test_scenario_latitude_range() {
    let data = create_test_container();
    let filtered = data
        .filter_by_meta(&MetaFilter::new().with("latitude", Predicate::range(0.0, 15.0)))
        .unwrap();

    assert_eq!(filtered.unique_station_names(), vec!["A".to_string()]);
    assert_eq!(filtered.shape().0, 3);
    assert!(filtered.check_index().is_ok());
    assert!(filtered.is_filtered());
    assert!(!data.is_filtered());
}

#[test]
fn test_range_bounds_are_closed() {
    let data = create_test_container();
    let filtered = data
        .filter_by_meta(&MetaFilter::new().with("latitude", Predicate::range(10.0, 10.0)))
        .unwrap();
    assert_eq!(filtered.num_meta_blocks(), 1);
}

#[test]
fn test_negation_includes_missing_values() {
    let data = create_test_container();
    let filter = MetaFilter::new()
        .with("latitude", Predicate::range(0.0, 15.0))
        .negate("latitude");

    let filtered = data.filter_by_meta(&filter).unwrap();
    assert_eq!(filtered.unique_station_names(), vec!["B".to_string()]);
}

#[test]
fn test_output_is_renumbered_contiguously() {
    let data = create_two_var_container();
    let filtered = data
        .filter_by_meta(&MetaFilter::new().with("station_name", Predicate::pattern("Mace*")))
        .unwrap();

    assert_eq!(filtered.metadata().keys().copied().collect::<Vec<_>>(), vec![0]);
    let mut rows: Vec<usize> = filtered.meta_idx()[&0]
        .values()
        .flatten()
        .copied()
        .collect();
    rows.sort_unstable();
    assert_eq!(rows, vec![0, 1, 2, 3]);
    assert_eq!(filtered.var_idx(), data.var_idx());
}

#[test]
fn test_list_and_exact_predicates() {
    let data = create_two_var_container();

    let by_list = data
        .filter_by_meta(
            &MetaFilter::new().with("station_name", Predicate::one_of(["Leipzig", "Nowhere"])),
        )
        .unwrap();
    assert_eq!(by_list.num_meta_blocks(), 1);

    let by_exact = data
        .filter_by_meta(&MetaFilter::new().with("altitude", Predicate::exact(50.0)))
        .unwrap();
    assert_eq!(by_exact.num_meta_blocks(), 2);
}

#[test]
fn test_and_semantics() {
    let data = create_two_var_container();
    let filter = MetaFilter::new()
        .with("data_id", Predicate::pattern("Aeronet*"))
        .with("longitude", Predicate::range(-20.0, 0.0));

    let filtered = data.filter_by_meta(&filter).unwrap();
    assert_eq!(filtered.unique_station_names(), vec!["Mace_Head".to_string()]);
}

#[test]
fn test_extra_attribute_filter() {
    let records = vec![
        create_station_a().with_extra("PI", "Doe"),
        create_station_b().with_extra("PI", "Roe"),
    ];
    let data = UngriddedData::from_station_data(&records, &test_ingestion_config()).unwrap();

    let filtered = data
        .filter_by_meta(&MetaFilter::new().with("PI", Predicate::pattern("R*")))
        .unwrap();
    assert_eq!(filtered.unique_station_names(), vec!["B".to_string()]);
}

#[test]
fn test_variables_key() {
    let mut data = create_test_container();
    data.append_station_records(
        &[create_two_var_station("Leipzig", 51.35, 12.43)],
        &test_ingestion_config(),
    )
    .unwrap();

    let filtered = data
        .filter_by_meta(&MetaFilter::new().with("variables", Predicate::pattern("ang4487aer")))
        .unwrap();
    assert_eq!(filtered.unique_station_names(), vec!["Leipzig".to_string()]);
}

#[test]
fn test_unknown_key_fails() {
    let data = create_test_container();
    let result = data.filter_by_meta(&MetaFilter::new().with("PI", Predicate::pattern("Doe")));
    assert!(matches!(result, Err(Error::InvalidFilterKey { .. })));
}

#[test]
fn test_malformed_range_fails() {
    let data = create_test_container();
    let result =
        data.filter_by_meta(&MetaFilter::new().with("latitude", Predicate::range(15.0, 0.0)));
    assert!(matches!(result, Err(Error::InvalidFilter { .. })));

    let result = data.filter_by_meta(
        &MetaFilter::new().with("latitude", Predicate::range(f64::NAN, 1.0)),
    );
    assert!(matches!(result, Err(Error::InvalidFilter { .. })));
}

#[test]
fn test_filter_is_idempotent() {
    let data = create_two_var_container();
    let filter = MetaFilter::new().with("latitude", Predicate::range(52.0, 60.0));

    let once = data.filter_by_meta(&filter).unwrap();
    let twice = once.filter_by_meta(&filter).unwrap();
    assert!(once.same_content(&twice));
    assert_eq!(twice.filter_history().len(), 2);
}

#[test]
fn test_predicate_parse() {
    assert_eq!(Predicate::parse("[0, 15]"), Predicate::range(0.0, 15.0));
    assert_eq!(Predicate::parse("Leip*"), Predicate::pattern("Leip*"));
    assert_eq!(
        Predicate::parse("Leipzig,Mace_Head"),
        Predicate::one_of(["Leipzig", "Mace_Head"])
    );
    assert_eq!(Predicate::parse("42"), Predicate::Exact(MetaValue::Int(42)));
    assert_eq!(Predicate::parse("2.5"), Predicate::Exact(MetaValue::Float(2.5)));
    assert_eq!(Predicate::parse("[AB]*"), Predicate::pattern("[AB]*"));
}

#[test]
fn test_parse_args_with_negation() {
    let filter =
        MetaFilter::parse_args(&["latitude=[0,15]", "country!=Chad"]).unwrap();
    assert_eq!(filter.conditions().len(), 2);
    assert_eq!(filter.describe(), "latitude=[0,15] country!=Chad");

    assert!(MetaFilter::parse_args(&["no_equals_sign"]).is_err());
}

#[test]
fn test_extract_dataset_and_altitude() {
    let mut data = create_test_container();
    data.append_station_records(
        &create_multi_instrument_records(),
        &test_ingestion_config(),
    )
    .unwrap();

    let ebas = data.extract_dataset("EBASMC").unwrap();
    assert_eq!(ebas.num_meta_blocks(), 2);
    assert_eq!(ebas.contains_datasets(), vec!["EBASMC".to_string()]);

    let high = data.filter_altitude(1000.0, 5000.0).unwrap();
    assert_eq!(high.unique_station_names(), vec!["Zugspitze".to_string()]);
}

#[test]
fn test_clear_meta_no_data() {
    let record = StationRecord::new("net", "Empty")
        .with_variable("od550aer", VariableSeries::with_time(vec![], vec![]));
    let mut data = create_test_container();
    data.append_station_records(&[record], &test_ingestion_config())
        .unwrap();
    assert_eq!(data.num_meta_blocks(), 3);

    let cleared = data.clear_meta_no_data().unwrap();
    assert_eq!(cleared.num_meta_blocks(), 2);

    let removed = data.clear_meta_no_data_in_place().unwrap();
    assert_eq!(removed, 1);
    assert!(data.same_content(&cleared));
}

#[test]
fn test_apply_filters_pipeline() {
    let record = create_two_var_station("Leipzig", 51.35, 12.43)
        .with_variable("od550aer", VariableSeries::new(vec![0.25, 25.0]));
    let mut data = UngriddedData::from_station_data(&[record], &test_ingestion_config()).unwrap();
    data.append_station_records(&[create_station_a()], &test_ingestion_config())
        .unwrap();

    let spec = FilterSpec {
        remove_outliers: true,
        region: Some("EUROPE".to_string()),
        ..Default::default()
    };
    let filtered = data.apply_filters(&spec, &OutlierConfig::default()).unwrap();

    assert_eq!(filtered.unique_station_names(), vec!["Leipzig".to_string()]);
    assert_eq!(filtered.num_obs_var_valid("od550aer").unwrap(), 1);
    assert_eq!(filtered.filter_history().len(), 3);
}
