//! Fixed ABI between the host and Tier1 analysis modules.
//!
//! Exports: `memory`, `allocate(size) -> ptr`, `deallocate(ptr, size)`,
//! `analyze_file(ptr, len) -> result_ptr`, `get_version() -> i32`.
//! Host imports under `env`: `log(level, ptr, len)` and `current_time_ms()`.
//!
//! Result record, little-endian, at `result_ptr`:
//!
//! | offset | type | field                  |
//! |--------|------|------------------------|
//! | 0      | f32  | pattern_score          |
//! | 4      | f32  | ml_score               |
//! | 8      | u32  | detected_pattern_count |
//! | 12     | u64  | execution_time_us      |
//! | 20     | u32  | error_code             |
//! | 24     | u32  | reserved               |
//!
//! The whole 28-byte record must lie inside guest memory. The host decodes
//! the first 24 bytes and releases all 28.

use crate::config::types::{Result, SandboxError};

pub const ABI_VERSION: i32 = 1;

pub const EXPORT_MEMORY: &str = "memory";
pub const EXPORT_ALLOCATE: &str = "allocate";
pub const EXPORT_DEALLOCATE: &str = "deallocate";
pub const EXPORT_ANALYZE: &str = "analyze_file";
pub const EXPORT_VERSION: &str = "get_version";

pub const REQUIRED_FUNCTIONS: [&str; 4] =
    [EXPORT_ALLOCATE, EXPORT_DEALLOCATE, EXPORT_ANALYZE, EXPORT_VERSION];

/// Bytes the module allocated for the record; bounds-checked and released
pub const RESULT_RECORD_LEN: usize = 28;

/// Decoded result record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResultRecord {
    pub pattern_score: f32,
    pub ml_score: f32,
    pub detected_pattern_count: u32,
    pub execution_time_us: u64,
    pub error_code: u32,
}

impl ResultRecord {
    /// Decode and validate a record
    ///
    /// Scores must be finite and within [0, 1].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < RESULT_RECORD_LEN {
            return Err(SandboxError::ResultDecode(format!(
                "result record is {} bytes, expected {}",
                bytes.len(),
                RESULT_RECORD_LEN
            )));
        }

        let record = Self {
            pattern_score: f32::from_le_bytes(word(bytes, 0)),
            ml_score: f32::from_le_bytes(word(bytes, 4)),
            detected_pattern_count: u32::from_le_bytes(word(bytes, 8)),
            execution_time_us: u64::from_le_bytes(dword(bytes, 12)),
            error_code: u32::from_le_bytes(word(bytes, 20)),
        };

        for (name, score) in [("pattern_score", record.pattern_score), ("ml_score", record.ml_score)] {
            if !score.is_finite() || !(0.0..=1.0).contains(&score) {
                return Err(SandboxError::ResultDecode(format!(
                    "{} {} is outside [0, 1]",
                    name, score
                )));
            }
        }

        Ok(record)
    }

    pub fn is_error(&self) -> bool {
        self.error_code != 0
    }
}

fn word(bytes: &[u8], at: usize) -> [u8; 4] {
    [bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]
}

fn dword(bytes: &[u8], at: usize) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&bytes[at..at + 8]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(pattern: f32, ml: f32, count: u32, us: u64, code: u32) -> Vec<u8> {
        let mut out = Vec::with_capacity(RESULT_RECORD_LEN);
        out.extend_from_slice(&pattern.to_le_bytes());
        out.extend_from_slice(&ml.to_le_bytes());
        out.extend_from_slice(&count.to_le_bytes());
        out.extend_from_slice(&us.to_le_bytes());
        out.extend_from_slice(&code.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out
    }

    #[test]
    fn test_decode_reads_little_endian_fields() {
        let record = ResultRecord::decode(&encode(0.75, 0.25, 3, 1234, 0)).unwrap();
        assert_eq!(record.pattern_score, 0.75);
        assert_eq!(record.ml_score, 0.25);
        assert_eq!(record.detected_pattern_count, 3);
        assert_eq!(record.execution_time_us, 1234);
        assert!(!record.is_error());
    }

    #[test]
    fn test_out_of_range_scores_rejected() {
        assert!(ResultRecord::decode(&encode(1.5, 0.0, 0, 0, 0)).is_err());
        assert!(ResultRecord::decode(&encode(0.0, -0.1, 0, 0, 0)).is_err());
        assert!(ResultRecord::decode(&encode(f32::NAN, 0.0, 0, 0, 0)).is_err());
    }

    #[test]
    fn test_short_record_rejected() {
        let bytes = encode(0.1, 0.1, 0, 0, 0);
        let err = ResultRecord::decode(&bytes[..20]).unwrap_err();
        assert!(matches!(err, SandboxError::ResultDecode(_)));
        // the reserved word is part of the footprint
        assert!(ResultRecord::decode(&bytes[..24]).is_err());
    }

    #[test]
    fn test_error_code_is_preserved() {
        let record = ResultRecord::decode(&encode(0.0, 0.0, 0, 0, 7)).unwrap();
        assert!(record.is_error());
        assert_eq!(record.error_code, 7);
    }
}
