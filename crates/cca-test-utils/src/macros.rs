// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Assertion macros that record their outcome in the test log

/// Assert a condition, logging the check and its result.
///
/// ```rust,ignore
/// logged_assert!(logger, response.is_success(), "fork request accepted");
/// ```
#[macro_export]
macro_rules! logged_assert {
    ($logger:expr, $condition:expr) => {
        $crate::logged_assert!($logger, $condition, stringify!($condition))
    };
    ($logger:expr, $condition:expr, $message:expr) => {{
        let _ = $logger.log(&format!("Asserting: {}", $message));
        if $condition {
            let _ = $logger.log("✓ Assertion passed");
        } else {
            let _ = $logger.log("✗ Assertion failed");
            panic!("Assertion failed: {}", $message);
        }
    }};
}

/// Assert equality, logging both sides on failure.
#[macro_export]
macro_rules! logged_assert_eq {
    ($logger:expr, $left:expr, $right:expr) => {{
        let left = &$left;
        let right = &$right;
        let _ = $logger.log(&format!(
            "Asserting equality: {} == {}",
            stringify!($left),
            stringify!($right)
        ));
        if left == right {
            let _ = $logger.log("✓ Equality assertion passed");
        } else {
            let message = format!(
                "assertion failed: `(left == right)`\n  left: `{:?}`,\n right: `{:?}`",
                left, right
            );
            let _ = $logger.log(&format!("✗ {}", message));
            panic!("{}", message);
        }
    }};
}
