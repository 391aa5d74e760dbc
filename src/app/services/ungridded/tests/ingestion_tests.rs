//! Tests for ingestion, consistency checks and serialization

use super::*;
use crate::Error;
use crate::app::models::MetaValue;
use crate::constants::columns;

#[test]
fn test_scenario_two_stations() {
    let data = create_test_container();

    assert_eq!(data.num_meta_blocks(), 2);
    assert_eq!(data.var_idx()["od550aer"], 0);
    assert_eq!(data.shape(), (4, columns::COUNT));
    assert_eq!(data.num_obs_var_valid("od550aer").unwrap(), 3);
    assert!(data.check_index().is_ok());
}

#[test]
fn test_missing_coordinates_become_nan() {
    let data = create_test_container();
    let b = &data.metadata()[&1];

    assert!(b.latitude.is_nan());
    assert!(!b.has_location());
    let rows = &data.meta_idx()[&1]["od550aer"];
    assert!(data.data()[[rows[0], columns::LATITUDE]].is_nan());
}

#[test]
fn test_index_closure() {
    let data = create_two_var_container();

    for (meta_key, vars) in data.meta_idx() {
        for (var_name, rows) in vars {
            for &row in rows {
                assert_eq!(data.data()[[row, columns::META_IDX]], *meta_key as f64);
                assert_eq!(
                    data.data()[[row, columns::VAR_IDX]],
                    data.var_idx()[var_name] as f64
                );
            }
        }
    }

    let listed: usize = data
        .meta_idx()
        .values()
        .flat_map(|vars| vars.values())
        .map(Vec::len)
        .sum();
    assert_eq!(listed, data.shape().0);
}

#[test]
fn test_variable_index_first_seen_order() {
    let data = create_two_var_container();
    assert_eq!(data.var_idx()["ang4487aer"], 0);
    assert_eq!(data.var_idx()["od550aer"], 1);
}

#[test]
fn test_growth_beyond_chunk_size() {
    let records: Vec<StationRecord> = (0..5)
        .map(|i| {
            StationRecord::new("net", format!("S{}", i))
                .with_coordinates(Some(i as f64), Some(0.0), None)
                .with_dtime((1..=3).map(day).collect())
                .with_variable("concpm10", VariableSeries::new(vec![1.0, 2.0, 3.0]))
        })
        .collect();

    let config = IngestionConfig::default().with_chunk_size(2);
    let data = UngriddedData::from_station_data(&records, &config).unwrap();

    assert_eq!(data.shape().0, 15);
    assert_eq!(data.num_meta_blocks(), 5);
    assert!(data.check_index().is_ok());
    assert!(data.data().column(columns::VALUE).iter().all(|v| v.is_finite()));
}

#[test]
fn test_malformed_record_produces_no_container() {
    let bad = StationRecord::new("net", "Bad")
        .with_dtime(vec![day(1), day(2)])
        .with_variable("od550aer", VariableSeries::new(vec![0.1]));

    let result = UngriddedData::from_station_data(
        &[create_station_a(), bad],
        &test_ingestion_config(),
    );
    assert!(matches!(result, Err(Error::MalformedRecord { .. })));
}

#[test]
fn test_append_records_continues_meta_index() {
    let mut data = create_test_container();
    data.append_station_records(
        &[create_two_var_station("Leipzig", 51.35, 12.43)],
        &test_ingestion_config(),
    )
    .unwrap();

    assert_eq!(data.num_meta_blocks(), 3);
    assert_eq!(data.last_meta_idx(), Some(2));
    assert_eq!(data.var_idx()["od550aer"], 0);
    assert_eq!(data.var_idx()["ang4487aer"], 1);
    assert_eq!(data.shape().0, 8);
    assert!(data.check_index().is_ok());
}

#[test]
fn test_own_time_index_and_optional_columns() {
    let record = StationRecord::new("net", "Profile")
        .with_coordinates(Some(1.0), Some(2.0), Some(3.0))
        .with_dtime(vec![day(1)])
        .with_stop_time(vec![day(2)])
        .with_variable(
            "bsc532aer",
            VariableSeries::with_time(vec![hour(1, 0), hour(1, 1)], vec![0.5, 0.6])
                .value_altitude(vec![500.0, 1000.0])
                .flags(vec![false, true]),
        )
        .with_variable("od550aer", VariableSeries::new(vec![0.2]));

    let data = UngriddedData::from_station_data(&[record], &test_ingestion_config()).unwrap();
    let rows = &data.meta_idx()[&0]["bsc532aer"];
    let view = data.data();

    assert_eq!(view[[rows[1], columns::VALUE_ALTITUDE]], 1000.0);
    assert_eq!(view[[rows[1], columns::FLAG]], 1.0);
    assert_eq!(view[[rows[0], columns::FLAG]], 0.0);
    assert!(view[[rows[0], columns::STOP_TIME]].is_nan());

    let od_row = data.meta_idx()[&0]["od550aer"][0];
    assert_eq!(view[[od_row, columns::STOP_TIME]], day(2).timestamp() as f64);
}

#[test]
fn test_empty_variable_kept_in_var_info_only() {
    let record = StationRecord::new("net", "S")
        .with_dtime(vec![day(1)])
        .with_variable("od550aer", VariableSeries::new(vec![0.1]))
        .with_variable("abs550aer", VariableSeries::with_time(vec![], vec![]));

    let data = UngriddedData::from_station_data(&[record], &test_ingestion_config()).unwrap();

    assert!(data.metadata()[&0].var_info.contains_key("abs550aer"));
    assert!(!data.var_idx().contains_key("abs550aer"));
    assert!(!data.meta_idx()[&0].contains_key("abs550aer"));
}

#[test]
fn test_add_meta_keys_restricts_extra() {
    let record = create_station_a()
        .with_extra("PI", "Doe")
        .with_extra("instrument_serial", 123i64);
    let config = test_ingestion_config().with_add_meta_keys(vec!["PI".to_string()]);

    let data = UngriddedData::from_station_data(&[record], &config).unwrap();
    let extra = &data.metadata()[&0].extra;
    assert!(extra.contains_key("PI"));
    assert!(!extra.contains_key("instrument_serial"));
}

#[test]
fn test_check_index_detects_corruption() {
    let mut data = create_test_container();
    data.data[[0, columns::META_IDX]] = 1.0;
    assert!(matches!(data.check_index(), Err(Error::Consistency { .. })));

    let mut data = create_test_container();
    data.var_idx.insert("ghost".to_string(), 7);
    assert!(data.check_index().is_err());
}

#[test]
fn test_serialization_round_trip_preserves_nan() {
    let data = create_test_container().extract_var("od550aer").unwrap();
    let bytes = data.to_bytes().unwrap();
    let restored = UngriddedData::from_bytes(&bytes).unwrap();

    assert!(data.same_content(&restored));
    assert_eq!(restored.filter_history(), data.filter_history());
    assert_eq!(restored.num_obs_var_valid("od550aer").unwrap(), 3);
    assert_eq!(restored.shape(), data.shape());
}

#[test]
fn test_write_read_round_trip() {
    let data = create_multi_instrument_container();
    let mut buffer = Vec::new();
    data.write_to(&mut buffer).unwrap();

    let restored = UngriddedData::read_from(buffer.as_slice()).unwrap();
    assert!(data.same_content(&restored));
}

#[test]
fn test_inspection_accessors() {
    let data = create_multi_instrument_container();

    assert_eq!(data.contains_datasets(), vec!["EBASMC".to_string()]);
    assert_eq!(
        data.contains_instruments(),
        vec!["Cimel".to_string(), "Sunphotometer".to_string()]
    );
    assert_eq!(data.unique_station_names(), vec!["Zugspitze".to_string()]);
    assert_eq!(data.station_names().len(), 2);
    assert_eq!(data.ts_types_var("od550aer"), vec![TsType::Daily]);
    assert_eq!(data.time_range(), Some((day(1), day(6))));
    assert!(!data.is_filtered());

    let coords = data.station_coordinates();
    assert_eq!(coords.len(), 2);
    assert_eq!(coords[&0], (47.42, 10.98, 2962.0));
    assert_eq!(
        data.unique_meta_values("instrument_name"),
        vec![MetaValue::from("Cimel"), MetaValue::from("Sunphotometer")]
    );
    assert!(data.unique_meta_values("PI").is_empty());
}

#[test]
fn test_station_id_is_stored_and_filterable() {
    let record = create_station_a().with_station_id("N'Djamena-01");
    let data = UngriddedData::from_station_data(&[record], &test_ingestion_config()).unwrap();

    assert_eq!(data.metadata()[&0].station_id.as_deref(), Some("N'Djamena-01"));
    assert_eq!(
        data.unique_meta_values("station_id"),
        vec![MetaValue::from("N'Djamena-01")]
    );
}

#[test]
fn test_check_unit() {
    let data = create_test_container();
    assert!(data.check_unit("od550aer", "1").is_ok());
    assert!(matches!(
        data.check_unit("od550aer", "m-1"),
        Err(Error::UnitMismatch { .. })
    ));
    assert!(matches!(
        data.check_unit("concpm10", "ug m-3"),
        Err(Error::VariableNotAvailable { .. })
    ));
}

#[test]
fn test_to_dataframe_long_format() {
    let data = create_two_var_container();
    let frame = data.to_dataframe().unwrap();

    assert_eq!(frame.height(), 8);
    assert!(frame.column("station_name").is_ok());
    assert!(frame.column("value").is_ok());
    assert_eq!(frame.get_column_names().len(), 13);
}
