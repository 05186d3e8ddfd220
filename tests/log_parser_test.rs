//! RRA console log parsing

mod common;

use common::{original_mass, rra_log};
use osim_pipeline::config::DEFAULT_BODIES;
use osim_pipeline::rra::log::{parse_log_file, parse_mass_change_file};
use osim_pipeline::rra::{RunOutcomeParser, TextLogParser};
use osim_pipeline::Error;

#[test]
fn test_twelve_body_section() {
    let log = rra_log("S1_A_Walk", 0.008);
    let adjustment = TextLogParser.mass_adjustment(&log).unwrap();
    assert_eq!(adjustment.bodies.len(), 12);
    assert_eq!(adjustment.total_change, 0.008);
    for (i, body) in DEFAULT_BODIES.iter().enumerate() {
        let row = adjustment.body(body).unwrap();
        assert_eq!(row.original, original_mass(i));
    }
    let masses = adjustment.original_masses(&DEFAULT_BODIES, "S1_A_Walk_RRA.log").unwrap();
    assert_eq!(masses.len(), 12);
    assert_eq!(TextLogParser.mass_change(&log).unwrap(), 0.008);
}

#[test]
fn test_missing_end_marker_is_a_parse_error() {
    let log = rra_log("S1_A_Walk", 0.05).replace("Note: Edit the model to make recommended", "Done");
    let err = TextLogParser.mass_adjustment(&log).unwrap_err();
    assert!(matches!(err, Error::LogParse(_)));
    assert!(format!("{err}").contains("Note: Edit the model"));
}

#[test]
fn test_missing_total_is_a_parse_error() {
    let log = rra_log("S1_A_Walk", 0.05).replace("*  Total mass change: 0.05\n", "");
    assert!(matches!(
        TextLogParser.mass_adjustment(&log),
        Err(Error::LogParse(_))
    ));
    assert!(matches!(
        TextLogParser.mass_change(&log),
        Err(Error::LogParse(_))
    ));
}

#[test]
fn test_parsing_is_idempotent() {
    let log = rra_log("S1_A_Walk", 0.231);
    let first = TextLogParser.mass_adjustment(&log).unwrap();
    let second = TextLogParser.mass_adjustment(&log).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        TextLogParser.mass_change(&log).unwrap(),
        TextLogParser.mass_change(&log).unwrap()
    );
}

#[test]
fn test_file_helpers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("S1_A_Walk_RRA.log");
    std::fs::write(&path, rra_log("S1_A_Walk", -0.012)).unwrap();
    assert_eq!(parse_mass_change_file(&TextLogParser, &path).unwrap(), -0.012);
    assert_eq!(parse_log_file(&TextLogParser, &path).unwrap().bodies.len(), 12);

    let missing = parse_mass_change_file(&TextLogParser, &dir.path().join("gone.log"));
    assert!(missing.is_err());
}
