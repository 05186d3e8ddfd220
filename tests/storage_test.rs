//! Simulation file loading: delimited tables, GRF records, Parquet export

mod common;

use arrow::array::Array;
use common::{actuation_sto, grf_mot, position_error_sto};
use osim_pipeline::results::GroundReaction;
use osim_pipeline::storage::{DataTable, TableKind};
use osim_pipeline::Error;

fn loaded_and_unloaded() -> Vec<(f64, [f64; 18])> {
    // Right foot loaded in the first half, left foot in the second.
    (0..6)
        .map(|i| {
            let t = f64::from(i) * 0.1;
            let mut row = [0.5; 18];
            row[1] = if i < 3 { 700.0 } else { 0.0 };
            row[7] = if i < 3 { 0.0 } else { 650.0 };
            row[3..6].copy_from_slice(if i < 3 { &[0.2, 0.0, 0.1] } else { &[0.0, 0.0, 0.0] });
            row[9..12].copy_from_slice(if i < 3 { &[0.0, 0.0, 0.0] } else { &[0.4, 0.0, 0.3] });
            (t, row)
        })
        .collect()
}

#[test]
fn test_grf_channels_renamed_and_cycle_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("S1_A_Walk_GRF.mot");
    std::fs::write(&path, grf_mot(&[0.1, 0.4, 0.5], &loaded_and_unloaded())).unwrap();

    let grf = GroundReaction::read(&path).unwrap();
    assert_eq!(grf.cycle_frames, vec![20.0, 80.0]);
    assert_eq!(grf.cycle_samples, vec![200.0, 800.0]);
    assert_eq!(grf.cycle_bounds().unwrap(), (0.1, 0.4));
    assert_eq!(grf.last_cycle_time(), Some(0.5));

    let names = grf.table.names();
    assert_eq!(names[0], "time");
    for channel in ["RFX", "RFY", "RCX", "LCZ", "RMX", "LMZ"] {
        assert!(names.iter().any(|n| n == channel), "{channel} missing");
    }
    assert_eq!(grf.table.num_rows(), 6);
}

#[test]
fn test_cop_masked_where_side_unloaded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("S1_A_Walk_GRF.mot");
    std::fs::write(&path, grf_mot(&[0.1, 0.4], &loaded_and_unloaded())).unwrap();
    let grf = GroundReaction::read(&path).unwrap();

    let rcx = grf.table.column("RCX").unwrap();
    let lcx = grf.table.column("LCX").unwrap();
    for i in 0..3 {
        assert!(rcx.is_valid(i));
        assert!(lcx.is_null(i));
    }
    for i in 3..6 {
        assert!(rcx.is_null(i));
        assert!(lcx.is_valid(i));
    }
    // Forces themselves are never masked.
    assert!(grf.table.column("RFY").unwrap().is_valid(4));
}

#[test]
fn test_short_grf_file_is_numeric_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("S1_A_Walk_GRF.mot");
    std::fs::write(&path, "S1_A_Walk_GRF.mot\nversion=1\n").unwrap();
    let err = GroundReaction::read(&path).unwrap_err();
    assert!(matches!(err, Error::Numeric { .. }));
}

#[test]
fn test_header_lines_per_kind() {
    let dir = tempfile::tempdir().unwrap();
    let actuation = dir.path().join("S1_A_Walk_RRA_Actuation_force.sto");
    std::fs::write(&actuation, actuation_sto(4)).unwrap();
    let table = DataTable::read(&actuation, TableKind::Actuation).unwrap();
    assert_eq!(table.names()[..4], ["time", "FX", "FY", "FZ"]);
    assert_eq!(table.num_rows(), 4);
    assert_eq!(table.values("FY").unwrap(), vec![-2.0; 4]);

    let perr = dir.path().join("S1_A_Walk_RRA_pErr.sto");
    std::fs::write(&perr, position_error_sto(3)).unwrap();
    let table = DataTable::read(&perr, TableKind::PositionError).unwrap();
    assert!(table.has_column("pelvis_tx"));
    assert!(table.has_column("knee_angle_r"));
    assert_eq!(table.time().unwrap().len(), 3);
}

#[test]
fn test_missing_column_is_config_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let actuation = dir.path().join("S1_A_Walk_RRA_Actuation_force.sto");
    std::fs::write(&actuation, actuation_sto(2)).unwrap();
    let table = DataTable::read(&actuation, TableKind::Actuation).unwrap();
    let err = table.values("vas_med_r").unwrap_err();
    assert!(format!("{err}").contains("vas_med_r"));
}

#[test]
fn test_parquet_round_trip_keeps_nulls() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("S1_A_Walk_GRF.mot");
    std::fs::write(&path, grf_mot(&[0.1, 0.4], &loaded_and_unloaded())).unwrap();
    let grf = GroundReaction::read(&path).unwrap();

    let out = dir.path().join("grf.parquet");
    grf.table.write_parquet(&out).unwrap();
    let back = DataTable::load_parquet(&out).unwrap();
    assert_eq!(back.names(), grf.table.names());
    assert_eq!(back.num_rows(), 6);
    assert!(back.column("RCX").unwrap().is_null(4));
}
