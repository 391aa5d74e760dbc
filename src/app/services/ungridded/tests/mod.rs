//! Tests for the ungridded observation container
//!
//! Fixtures build small containers from station records with a small
//! growth chunk so that buffer growth is exercised.

pub mod filter_tests;
pub mod ingestion_tests;
pub mod merge_tests;
pub mod transform_tests;

use crate::app::models::{StationRecord, TsType, VarInfo, VariableSeries};
use crate::app::services::ungridded::UngriddedData;
use crate::config::IngestionConfig;
use chrono::{DateTime, TimeZone, Utc};

/// Midnight of a day in January 2020
pub fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, d, 0, 0, 0).unwrap()
}

/// A time of day in January 2020
pub fn hour(d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, d, h, 0, 0).unwrap()
}

/// Ingestion settings with a small chunk size
pub fn test_ingestion_config() -> IngestionConfig {
    IngestionConfig::default().with_chunk_size(4)
}

/// Station "A": lat 10, lon 20, od550aer = [0.1, 0.2, NaN] on days 1-3
pub fn create_station_a() -> StationRecord {
    StationRecord::new("AeronetSunV3Lev2.daily", "A")
        .with_coordinates(Some(10.0), Some(20.0), Some(100.0))
        .with_ts_type(TsType::Daily)
        .with_country("Chad")
        .with_dtime(vec![day(1), day(2), day(3)])
        .with_variable("od550aer", VariableSeries::new(vec![0.1, 0.2, f64::NAN]))
        .with_var_info("od550aer", VarInfo::with_units("1"))
}

/// Station "B": unknown coordinates, od550aer = [0.3] on day 2
pub fn create_station_b() -> StationRecord {
    StationRecord::new("AeronetSunV3Lev2.daily", "B")
        .with_ts_type(TsType::Daily)
        .with_dtime(vec![day(2)])
        .with_variable("od550aer", VariableSeries::new(vec![0.3]))
        .with_var_info("od550aer", VarInfo::with_units("1"))
}

/// Container holding stations "A" and "B"
pub fn create_test_container() -> UngriddedData {
    UngriddedData::from_station_data(
        &[create_station_a(), create_station_b()],
        &test_ingestion_config(),
    )
    .unwrap()
}

/// Station with two variables (ang4487aer is ingested first)
pub fn create_two_var_station(name: &str, lat: f64, lon: f64) -> StationRecord {
    StationRecord::new("AeronetSunV3Lev2.daily", name)
        .with_coordinates(Some(lat), Some(lon), Some(50.0))
        .with_ts_type(TsType::Daily)
        .with_dtime(vec![day(1), day(2)])
        .with_variable("ang4487aer", VariableSeries::new(vec![1.2, 1.4]))
        .with_variable("od550aer", VariableSeries::new(vec![0.25, 0.35]))
}

/// Container with two stations and two variables
pub fn create_two_var_container() -> UngriddedData {
    UngriddedData::from_station_data(
        &[
            create_two_var_station("Leipzig", 51.35, 12.43),
            create_two_var_station("Mace_Head", 53.33, -9.9),
        ],
        &test_ingestion_config(),
    )
    .unwrap()
}

/// Two records of one station from different instruments with overlapping days
///
/// "Cimel" covers days 1-4 (values 1..4), "Sunphotometer" covers days 3-6
/// (values 30..60) but has fewer valid points.
pub fn create_multi_instrument_records() -> Vec<StationRecord> {
    vec![
        StationRecord::new("EBASMC", "Zugspitze")
            .with_coordinates(Some(47.42), Some(10.98), Some(2962.0))
            .with_instrument("Cimel")
            .with_ts_type(TsType::Daily)
            .with_dtime(vec![day(1), day(2), day(3), day(4)])
            .with_variable(
                "od550aer",
                VariableSeries::new(vec![1.0, 2.0, 3.0, 4.0]).errors(vec![0.1; 4]),
            ),
        StationRecord::new("EBASMC", "Zugspitze")
            .with_coordinates(Some(47.42), Some(10.98), Some(2962.0))
            .with_instrument("Sunphotometer")
            .with_ts_type(TsType::Daily)
            .with_dtime(vec![day(3), day(4), day(5), day(6)])
            .with_variable(
                "od550aer",
                VariableSeries::new(vec![30.0, 40.0, 50.0, f64::NAN]),
            ),
    ]
}

/// Container built from [`create_multi_instrument_records`]
pub fn create_multi_instrument_container() -> UngriddedData {
    UngriddedData::from_station_data(
        &create_multi_instrument_records(),
        &test_ingestion_config(),
    )
    .unwrap()
}
