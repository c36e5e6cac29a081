//! Domain-specific assertion macros for logship harnesses.
//!
//! These wrap `pretty_assertions` and add failure messages that say which
//! part of the pipeline disagreed.

/// Assert the counters reported by `/monitor`.
///
/// ```rust
/// assert_monitor!(json, handle_line = 10, err_num = 0);
/// ```
#[macro_export]
macro_rules! assert_monitor {
    ($json:expr, handle_line = $lines:expr, err_num = $errors:expr) => {{
        let json: &serde_json::Value = &$json;
        let lines: u64 = $lines;
        let errors: u64 = $errors;
        match (json["handleLine"].as_u64(), json["errNum"].as_u64()) {
            (Some(l), Some(e)) if l == lines && e == errors => {}
            (l, e) => panic!(
                "assert_monitor! failed:\n  expected: handleLine={} errNum={}\n  actual:   handleLine={:?} errNum={:?}\n  body: {}",
                lines, errors, l, e, json
            ),
        }
    }};
}

/// Assert the parsed fields of a `LogRecord`, ignoring its timestamp.
///
/// ```rust
/// assert_record!(record, "GET", "/api/test", "200", 1024);
/// ```
#[macro_export]
macro_rules! assert_record {
    ($record:expr, $method:expr, $path:expr, $status:expr, $bytes:expr) => {{
        let record: &logship_core::LogRecord = &$record;
        pretty_assertions::assert_eq!(
            (record.method.as_str(), record.path.as_str(), record.status.as_str(), record.bytes_sent),
            ($method, $path, $status, $bytes),
            "record fields differ: {:?}",
            record
        );
    }};
}

/// Assert that a sequence of line-protocol points all target `measurement`.
#[macro_export]
macro_rules! assert_points_in {
    ($points:expr, $measurement:expr) => {{
        let measurement: &str = $measurement;
        for point in $points.iter() {
            let point: &str = point.as_ref();
            if !point.starts_with(&format!("{measurement},")) {
                panic!(
                    "assert_points_in! failed: point not in {:?}:\n  {}",
                    measurement, point
                );
            }
        }
    }};
}
