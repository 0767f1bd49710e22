use prep_core::model::ExamMode;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn parse_mode(s: &str) -> Result<ExamMode, StorageError> {
    s.parse::<ExamMode>()
        .map_err(|_| StorageError::Serialization(format!("invalid mode: {s}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_parse_from_keys() {
        assert_eq!(parse_mode("full_mock").unwrap(), ExamMode::FullMock);
        assert!(parse_mode("weekly").is_err());
    }

    #[test]
    fn negative_counts_are_rejected() {
        assert!(u32_from_i64("correct", -1).is_err());
        assert_eq!(u32_from_i64("correct", 7).unwrap(), 7);
    }
}
