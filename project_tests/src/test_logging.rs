use cosmic_core::loggers::setup_logging;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_setup_logging_writes_and_rotates() {
    // Create a temporary directory holding two stale log files
    let temp_dir = tempdir().expect("Failed to create temporary directory");
    let log_dir_path = temp_dir.path().to_path_buf();
    fs::write(log_dir_path.join("cosmic_monitor_old.log"), "old").expect("Failed to seed log");
    fs::write(log_dir_path.join("cosmic_monitor_older.log"), "older").expect("Failed to seed log");

    setup_logging(Some(&log_dir_path), "cosmic_monitor", "debug").expect("Logger setup failed");
    log::info!("Engine connected to ws://localhost/ws");
    log::debug!("Applied batch #1");
    log::trace!("should be filtered");
    log::logger().flush();

    let log_files: Vec<_> = fs::read_dir(&log_dir_path)
        .expect("Failed to read log directory")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().map_or(false, |ext| ext == "log"))
        .collect();

    // One surviving old file plus the new one
    assert_eq!(log_files.len(), 2, "Rotation kept {:?}", log_files);

    let contents: String = log_files
        .iter()
        .filter_map(|path| fs::read_to_string(path).ok())
        .collect();
    assert!(contents.contains("Engine connected to ws://localhost/ws"));
    assert!(contents.contains("[DEBUG] Applied batch #1"));
    assert!(!contents.contains("should be filtered"));

    // A second global logger cannot be installed
    assert!(setup_logging(None, "cosmic_monitor", "info").is_err());
}
