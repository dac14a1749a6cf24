use std::fs;

use folio::logging::init_file_logger;
use log::LevelFilter;
use tempfile::TempDir;

#[test]
fn test_file_logger_writes_records_once() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("folio.log");

    init_file_logger(&path, LevelFilter::Info).unwrap();
    log::info!("viewer session started");
    log::debug!("filtered out");

    let content = fs::read_to_string(&path).unwrap();
    assert!(content.contains("viewer session started"));
    assert!(!content.contains("filtered out"));

    assert!(init_file_logger(&dir.path().join("other.log"), LevelFilter::Info).is_err());
}
