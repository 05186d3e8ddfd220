//! Tests for error types

use osim_pipeline::Error;
use std::path::PathBuf;

#[test]
fn test_tool_timed_out_error() {
    let error = Error::ToolTimedOut {
        tool: "cmc".to_string(),
        trial: "20130221CONF_A_Walk_RepGRF".to_string(),
        elapsed_secs: 1500,
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("cmc"));
    assert!(error_str.contains("20130221CONF_A_Walk_RepGRF"));
    assert!(error_str.contains("1500s"));
    assert!(error_str.contains("Check status manually"));
    assert!(error.is_tool_outcome());
}

#[test]
fn test_tool_failed_error() {
    let error = Error::ToolFailed {
        tool: "rra".to_string(),
        trial: "S1_A_Walk".to_string(),
        reason: "exited without writing its artifact".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("rra failed for trial S1_A_Walk"));
    assert!(error_str.contains("without writing"));
    assert!(error.is_tool_outcome());
}

#[test]
fn test_log_parse_error() {
    let error = Error::LogParse("line 14: body `torso` has no new mass".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Log parse error"));
    assert!(error_str.contains("line 14"));
    assert!(!error.is_tool_outcome());
}

#[test]
fn test_config_mismatch_error() {
    let error = Error::mismatch("humerus_r", "S1__AdjustedCOM.osim");
    let error_str = format!("{error}");
    assert!(error_str.contains("humerus_r not found in S1__AdjustedCOM.osim"));
}

#[test]
fn test_numeric_error() {
    let error = Error::numeric(PathBuf::from("S1_A_Walk_RRA_pErr.sto"), "line 9: `nan?` is not a number");
    let error_str = format!("{error}");
    assert!(error_str.contains("S1_A_Walk_RRA_pErr.sto"));
    assert!(error_str.contains("line 9"));
}

#[test]
fn test_xml_and_config_errors() {
    assert!(format!("{}", Error::Xml("unexpected end".to_string())).contains("XML error"));
    assert!(format!("{}", Error::Config("workers must be at least 1".to_string()))
        .contains("Invalid configuration"));
}

#[test]
fn test_storage_error() {
    let error = Error::StorageError("file not found".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Storage error"));
    assert!(error_str.contains("file not found"));
}

#[test]
fn test_io_error_conversion() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let error: Error = io_error.into();
    let error_str = format!("{error}");
    assert!(error_str.contains("IO error"));
    assert!(error_str.contains("file not found"));
}

#[test]
fn test_other_error() {
    let error = Error::Other("custom error message".to_string());
    assert_eq!(format!("{error}"), "custom error message");
}

#[test]
fn test_error_debug() {
    let error = Error::LogParse("debug test".to_string());
    let debug_str = format!("{error:?}");
    assert!(debug_str.contains("LogParse"));
}

#[test]
fn test_not_found_only_for_missing_files() {
    let missing: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
    assert!(missing.is_not_found());
    let denied: Error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no").into();
    assert!(!denied.is_not_found());
    assert!(!Error::numeric("a.sto", "line 3: `x` is not a number").is_not_found());
}
