// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Test utilities shared across the workspace
//!
//! Every test wrapped with [`logged_test`] or [`logged_tokio_test`] writes its
//! diagnostics to a unique file under `target/test-logs/<date>/`. Passing
//! tests print a single line; failing tests print the log path and size.

pub mod guard;
pub mod logging;
pub mod macros;

pub use cca_test_utils_macros::{logged_test, logged_tokio_test};
pub use guard::TestLoggerGuard;
pub use logging::{TestLogError, TestLogger, create_unique_test_log};

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn unique_log_paths_are_distinct_and_writable() {
        let first = create_unique_test_log("unique_log_paths_1");
        let second = create_unique_test_log("unique_log_paths_2");
        assert_ne!(first, second);

        fs::write(&first, "one").unwrap();
        fs::write(&second, "two").unwrap();
        assert_eq!(fs::read_to_string(&first).unwrap(), "one");

        fs::remove_file(&first).unwrap();
        fs::remove_file(&second).unwrap();
    }

    #[test]
    fn logger_finishes_with_log_path() {
        let mut logger = TestLogger::new("logger_finishes_with_log_path").unwrap();
        logger.log("step one").unwrap();
        logger.log_json("payload", &serde_json::json!({"k": 1})).unwrap();
        let path = logger.finish_success().unwrap();
        let text = fs::read_to_string(path).unwrap();
        assert!(text.contains("step one"));
        assert!(text.contains("\"k\": 1"));
    }
}
