//! Tests for merging containers and coalescing metadata blocks

use super::*;
use crate::app::models::MetaValue;
use crate::app::services::ungridded::{MetaFilter, Predicate, QueryOptions};
use crate::constants::columns;

#[test]
fn test_merge_offsets_meta_indices() {
    let a = create_test_container();
    let b = create_two_var_container();
    let merged = a.merge(&b).unwrap();

    assert_eq!(merged.num_meta_blocks(), 4);
    assert_eq!(merged.shape().0, a.shape().0 + b.shape().0);
    assert_eq!(merged.metadata()[&2].station_name, "Leipzig");
    assert!(merged.check_index().is_ok());

    // od550aer keeps the receiver's index, ang4487aer (0 in b) is renumbered
    assert_eq!(merged.var_idx()["od550aer"], 0);
    assert_eq!(merged.var_idx()["ang4487aer"], 1);
}

#[test]
fn test_merge_preserves_values_per_station() {
    let a = create_test_container();
    let b = create_two_var_container();
    let merged = a.merge(&b).unwrap();
    let opts = QueryOptions::default();

    for station in ["Leipzig", "Mace_Head"] {
        let before = b.to_station_data(station, &[], &opts).unwrap();
        let after = merged.to_station_data(station, &[], &opts).unwrap();
        assert_eq!(before.series, after.series);
    }
    let before = a.to_station_data("A", &["od550aer"], &opts).unwrap();
    let after = merged.to_station_data("A", &["od550aer"], &opts).unwrap();
    assert_eq!(before.series["od550aer"].time, after.series["od550aer"].time);
}

#[test]
fn test_merge_keeps_free_variable_index() {
    let a = create_test_container().extract_var("od550aer").unwrap();
    let b = create_two_var_container().extract_vars(&["od550aer", "ang4487aer"]).unwrap();
    let merged = a.merge(&b).unwrap();

    assert_eq!(merged.var_idx()["ang4487aer"], 1);
    let rows = &merged.meta_idx()[&2]["ang4487aer"];
    assert_eq!(merged.data()[[rows[0], columns::VAR_IDX]], 1.0);
}

#[test]
fn test_merge_into_empty_is_copy() {
    let other = create_two_var_container();
    let merged = UngriddedData::new().merge(&other).unwrap();

    assert!(merged.same_content(&other));
    assert!(merged.is_filtered());
}

#[test]
fn test_append_in_place() {
    let mut data = create_test_container();
    data.append(create_multi_instrument_container()).unwrap();

    assert_eq!(data.num_meta_blocks(), 4);
    assert_eq!(data.contains_datasets().len(), 2);
    assert!(data.check_index().is_ok());
}

#[test]
fn test_merge_common_meta() {
    let first = create_station_a()
        .with_data_revision("20200101")
        .with_extra("source_file", "a1.lev20");
    let second = StationRecord::new("AeronetSunV3Lev2.daily", "A")
        .with_coordinates(Some(10.01), Some(20.0), Some(100.0))
        .with_ts_type(TsType::Daily)
        .with_country("Chad")
        .with_data_revision("20210101")
        .with_extra("source_file", "a2.lev20")
        .with_dtime(vec![day(10), day(11)])
        .with_variable("od550aer", VariableSeries::new(vec![0.5, 0.6]))
        .with_var_info("od550aer", VarInfo::with_units("1"));

    let data = UngriddedData::from_station_data(
        &[first, create_station_b(), second],
        &test_ingestion_config(),
    )
    .unwrap();

    assert_eq!(data.find_common_meta(&["data_revision"]).len(), 3);
    assert_eq!(
        data.find_common_meta(&["data_revision", "source_file"]),
        vec![vec![0, 2], vec![1]]
    );

    let coalesced = data
        .merge_common_meta(&["data_revision", "source_file"])
        .unwrap();
    assert_eq!(coalesced.num_meta_blocks(), 2);
    assert_eq!(coalesced.shape(), data.shape());
    assert!(coalesced.check_index().is_ok());

    let a = &coalesced.metadata()[&0];
    assert_eq!(a.data_revision.as_deref(), Some("20200101"));
    assert_eq!(
        a.extra["source_file"],
        MetaValue::List(vec![MetaValue::from("a1.lev20"), MetaValue::from("a2.lev20")])
    );

    let station = coalesced
        .to_station_data("A", &["od550aer"], &QueryOptions::default().with_merge_if_multi(false))
        .unwrap();
    assert_eq!(station.series["od550aer"].len(), 5);
}

/// Block-by-block comparison of metadata and time series
fn assert_same_blocks(actual: &UngriddedData, expected: &UngriddedData) {
    assert_eq!(actual.shape().0, expected.shape().0);
    assert_eq!(actual.contains_vars(), expected.contains_vars());
    assert_eq!(actual.num_meta_blocks(), expected.num_meta_blocks());

    let opts = QueryOptions::default();
    for (a, e) in actual.metadata().keys().zip(expected.metadata().keys()) {
        assert_eq!(actual.metadata()[a], expected.metadata()[e]);

        let a_station = actual.to_station_data(*a, &[], &opts).unwrap();
        let e_station = expected.to_station_data(*e, &[], &opts).unwrap();
        assert_eq!(a_station.variables(), e_station.variables());
        for (var, e_series) in &e_station.series {
            let a_series = &a_station.series[var];
            assert_eq!(a_series.time, e_series.time);
            let as_opt = |v: &[f64]| -> Vec<Option<f64>> {
                v.iter().map(|x| (!x.is_nan()).then_some(*x)).collect()
            };
            assert_eq!(as_opt(&a_series.values), as_opt(&e_series.values));
        }
    }
}

#[test]
fn test_merge_then_filter_recovers_each_dataset() {
    let aeronet = create_two_var_container();
    let ebas = create_multi_instrument_container();
    let merged = aeronet.merge(&ebas).unwrap();
    assert_eq!(merged.contains_datasets(), vec!["AeronetSunV3Lev2.daily", "EBASMC"]);

    let by_id = |id: &str| MetaFilter::new().with("data_id", Predicate::exact(id));
    let aeronet_back = merged.filter_by_meta(&by_id("AeronetSunV3Lev2.daily")).unwrap();
    let ebas_back = merged.filter_by_meta(&by_id("EBASMC")).unwrap();

    aeronet_back.check_index().unwrap();
    ebas_back.check_index().unwrap();
    assert_same_blocks(&aeronet_back, &aeronet);
    assert_same_blocks(&ebas_back, &ebas);
    assert_eq!(
        ebas_back.all_datapoints_var("od550aer").unwrap().len(),
        ebas.all_datapoints_var("od550aer").unwrap().len()
    );
}
