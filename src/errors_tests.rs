// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `errors.rs`

#[cfg(test)]
mod tests {
    use super::super::ErrorAggregator;

    #[test]
    fn test_empty_aggregator_is_ok() {
        let errs = ErrorAggregator::new(", ");
        assert!(!errs.has_errors());
        assert!(errs.into_result().is_ok());
    }

    #[test]
    fn test_messages_joined_in_order() {
        let mut errs = ErrorAggregator::new(", ");
        errs.add("first");
        errs.add(format!("second {}", 2));
        assert_eq!(errs.len(), 2);

        let err = errs.into_result().unwrap_err();
        assert_eq!(err.to_string(), "first, second 2");
        assert_eq!(err.messages(), ["first".to_string(), "second 2".to_string()]);
    }

    #[test]
    fn test_check_records_only_errors() {
        let mut errs = ErrorAggregator::new("\n");
        let ok: Result<i32, String> = Ok(3);
        let bad: Result<i32, String> = Err("bad".to_string());

        assert_eq!(errs.check(ok), Some(3));
        assert_eq!(errs.check(bad), None);
        assert_eq!(errs.len(), 1);
    }
}
