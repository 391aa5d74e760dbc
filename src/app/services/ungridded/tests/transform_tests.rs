//! Tests for variable extraction, outlier removal and flag masking

use super::*;
use crate::Error;
use crate::config::OutlierConfig;
use crate::constants::columns;

#[test]
fn test_scenario_extract_var_renumbers() {
    let data = create_two_var_container();
    assert_eq!(data.var_idx()["od550aer"], 1);

    let extracted = data.extract_var("od550aer").unwrap();
    assert_eq!(extracted.contains_vars(), vec!["od550aer".to_string()]);
    assert_eq!(extracted.var_idx()["od550aer"], 0);
    assert_eq!(extracted.shape().0, 4);
    assert!(extracted
        .metadata()
        .values()
        .all(|m| !m.var_info.contains_key("ang4487aer")));
    assert!(extracted
        .data()
        .column(columns::VAR_IDX)
        .iter()
        .all(|v| *v == 0.0));
    assert!(extracted.check_index().is_ok());
}

#[test]
fn test_extract_vars_order_and_idempotence() {
    let data = create_two_var_container();
    let extracted = data.extract_vars(&["od550aer", "ang4487aer"]).unwrap();
    assert_eq!(extracted.var_idx()["od550aer"], 0);
    assert_eq!(extracted.var_idx()["ang4487aer"], 1);

    let again = extracted.extract_vars(&["od550aer", "ang4487aer"]).unwrap();
    assert!(extracted.same_content(&again));
}

#[test]
fn test_extract_drops_blocks_without_rows() {
    let mut data = create_test_container();
    data.append_station_records(
        &[create_two_var_station("Leipzig", 51.35, 12.43)],
        &test_ingestion_config(),
    )
    .unwrap();

    let extracted = data.extract_var("ang4487aer").unwrap();
    assert_eq!(extracted.num_meta_blocks(), 1);
    assert_eq!(extracted.unique_station_names(), vec!["Leipzig".to_string()]);
}

#[test]
fn test_extract_unknown_variable() {
    let data = create_test_container();
    assert!(matches!(
        data.extract_var("concpm10"),
        Err(Error::VariableNotAvailable { .. })
    ));
}

#[test]
fn test_remove_outliers_leaves_source_untouched() {
    let data = create_test_container();
    let cleaned = data.remove_outliers("od550aer", 0.0, 0.15, false).unwrap();

    assert_eq!(cleaned.num_obs_var_valid("od550aer").unwrap(), 1);
    assert_eq!(data.num_obs_var_valid("od550aer").unwrap(), 3);
    assert!(cleaned.trash_values("od550aer").unwrap().is_empty());
}

#[test]
fn test_trash_discipline() {
    let mut data = create_test_container();

    let removed = data
        .remove_outliers_in_place("od550aer", 0.0, 0.25, true)
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(data.trash_values("od550aer").unwrap(), vec![0.3]);

    let second = data.remove_outliers_in_place("od550aer", 0.0, 0.15, true);
    assert!(matches!(second, Err(Error::TrashNotEmpty { .. })));
    assert_eq!(data.num_obs_var_valid("od550aer").unwrap(), 2);

    data.empty_trash();
    let removed = data
        .remove_outliers_in_place("od550aer", 0.0, 0.15, true)
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(data.trash_values("od550aer").unwrap(), vec![0.2]);
}

#[test]
fn test_remove_outliers_configured_range() {
    let record = StationRecord::new("net", "S")
        .with_dtime(vec![day(1), day(2)])
        .with_variable("od550aer", VariableSeries::new(vec![0.3, 12.0]));
    let data = UngriddedData::from_station_data(&[record], &test_ingestion_config()).unwrap();

    let cleaned = data
        .remove_outliers_configured("od550aer", &OutlierConfig::default(), false)
        .unwrap();
    assert_eq!(cleaned.all_datapoints_var("od550aer").unwrap()[0], 0.3);
    assert!(cleaned.all_datapoints_var("od550aer").unwrap()[1].is_nan());

    let mut no_ranges = OutlierConfig::default();
    no_ranges.ranges.clear();
    assert!(data
        .remove_outliers_configured("od550aer", &no_ranges, false)
        .is_err());
}

#[test]
fn test_remove_outliers_rejects_inverted_range() {
    let data = create_test_container();
    assert!(matches!(
        data.remove_outliers("od550aer", 1.0, 0.0, false),
        Err(Error::InvalidFilter { .. })
    ));
}

#[test]
fn test_set_flags_nan() {
    let record = StationRecord::new("net", "Flagged")
        .with_dtime(vec![day(1), day(2), day(3)])
        .with_variable(
            "concpm10",
            VariableSeries::new(vec![10.0, 20.0, 30.0]).flags(vec![false, true, false]),
        );
    let data = UngriddedData::from_station_data(&[record], &test_ingestion_config()).unwrap();

    let masked = data.set_flags_nan().unwrap();
    assert_eq!(masked.num_obs_var_valid("concpm10").unwrap(), 2);
    assert_eq!(data.num_obs_var_valid("concpm10").unwrap(), 3);

    let mut in_place = data.clone();
    assert_eq!(in_place.set_flags_nan_in_place().unwrap(), 1);
    assert!(in_place.same_content(&masked));
}

#[test]
fn test_set_flags_nan_requires_flags() {
    let data = create_test_container();
    assert!(matches!(data.set_flags_nan(), Err(Error::NoFlagData)));
}
