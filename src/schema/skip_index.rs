//! Data-skipping index definitions.
//!
//! Parameters are checked when a spec is constructed; an out-of-range value never
//! reaches DDL.

use crate::error::ClickguardError;

/// Index type and its parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipIndexKind {
    Minmax,
    BloomFilter {
        false_positive_rate: Option<f64>,
    },
    TokenBloomFilter {
        size_bytes: u32,
        hash_functions: u32,
        seed: u32,
    },
    NgramBloomFilter {
        ngram_size: u32,
        size_bytes: u32,
        hash_functions: u32,
        seed: u32,
    },
    Set {
        max_rows: u32,
    },
}

/// A skip index type plus granularity, as rendered after `TYPE`.
#[derive(Debug, Clone, PartialEq)]
pub struct SkipIndexSpec {
    kind: SkipIndexKind,
    granularity: u32,
}

/// `minmax` with granularity 3.
impl Default for SkipIndexSpec {
    fn default() -> Self {
        Self {
            kind: SkipIndexKind::Minmax,
            granularity: 3,
        }
    }
}

fn check_range<T>(name: &str, value: T, min: T, max: T) -> Result<T, ClickguardError>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if !(min..=max).contains(&value) {
        Err(ClickguardError::invalid_config(
            name,
            value,
            format!("a value between {min} and {max}"),
        ))
    } else {
        Ok(value)
    }
}

impl SkipIndexSpec {
    fn with_kind(kind: SkipIndexKind, granularity: u32) -> Result<Self, ClickguardError> {
        let granularity = check_range("skip index granularity", granularity, 1, 1000)?;
        Ok(Self { kind, granularity })
    }

    pub fn minmax(granularity: u32) -> Result<Self, ClickguardError> {
        Self::with_kind(SkipIndexKind::Minmax, granularity)
    }

    /// Bloom filter with the server's default false-positive rate.
    pub fn bloom_filter(granularity: u32) -> Result<Self, ClickguardError> {
        Self::with_kind(SkipIndexKind::BloomFilter { false_positive_rate: None }, granularity)
    }

    pub fn bloom_filter_with_rate(false_positive_rate: f64, granularity: u32) -> Result<Self, ClickguardError> {
        let rate = check_range("bloom_filter false positive rate", false_positive_rate, 0.001, 0.5)?;
        Self::with_kind(
            SkipIndexKind::BloomFilter {
                false_positive_rate: Some(rate),
            },
            granularity,
        )
    }

    pub fn token_bloom_filter(
        size_bytes: u32,
        hash_functions: u32,
        seed: u32,
        granularity: u32,
    ) -> Result<Self, ClickguardError> {
        Self::with_kind(
            SkipIndexKind::TokenBloomFilter {
                size_bytes: check_range("tokenbf_v1 size", size_bytes, 256, 1_048_576)?,
                hash_functions: check_range("tokenbf_v1 hash functions", hash_functions, 1, 10)?,
                seed,
            },
            granularity,
        )
    }

    pub fn ngram_bloom_filter(
        ngram_size: u32,
        size_bytes: u32,
        hash_functions: u32,
        seed: u32,
        granularity: u32,
    ) -> Result<Self, ClickguardError> {
        Self::with_kind(
            SkipIndexKind::NgramBloomFilter {
                ngram_size: check_range("ngrambf_v1 ngram size", ngram_size, 1, 10)?,
                size_bytes: check_range("ngrambf_v1 size", size_bytes, 256, 1_048_576)?,
                hash_functions: check_range("ngrambf_v1 hash functions", hash_functions, 1, 10)?,
                seed,
            },
            granularity,
        )
    }

    /// `set(max_rows)`; zero means unlimited.
    pub fn set(max_rows: u32, granularity: u32) -> Result<Self, ClickguardError> {
        Self::with_kind(
            SkipIndexKind::Set {
                max_rows: check_range("set max rows", max_rows, 0, 1_000_000)?,
            },
            granularity,
        )
    }

    pub fn kind(&self) -> &SkipIndexKind {
        &self.kind
    }

    pub fn granularity(&self) -> u32 {
        self.granularity
    }

    /// The index type expression, e.g. `bloom_filter(0.025)`.
    pub fn type_expression(&self) -> String {
        match &self.kind {
            SkipIndexKind::Minmax => "minmax".to_string(),
            SkipIndexKind::BloomFilter {
                false_positive_rate: None,
            } => "bloom_filter".to_string(),
            SkipIndexKind::BloomFilter {
                false_positive_rate: Some(rate),
            } => format!("bloom_filter({rate})"),
            SkipIndexKind::TokenBloomFilter {
                size_bytes,
                hash_functions,
                seed,
            } => format!("tokenbf_v1({size_bytes}, {hash_functions}, {seed})"),
            SkipIndexKind::NgramBloomFilter {
                ngram_size,
                size_bytes,
                hash_functions,
                seed,
            } => format!("ngrambf_v1({ngram_size}, {size_bytes}, {hash_functions}, {seed})"),
            SkipIndexKind::Set { max_rows } => format!("set({max_rows})"),
        }
    }

    /// `TYPE <expr> GRANULARITY <n>`.
    pub fn render(&self) -> String {
        format!("TYPE {} GRANULARITY {}", self.type_expression(), self.granularity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_minmax_granularity_3() {
        assert_eq!(SkipIndexSpec::default().render(), "TYPE minmax GRANULARITY 3");
    }

    #[test]
    fn test_render_types() {
        assert_eq!(
            SkipIndexSpec::bloom_filter_with_rate(0.025, 3).unwrap().render(),
            "TYPE bloom_filter(0.025) GRANULARITY 3"
        );
        assert_eq!(
            SkipIndexSpec::token_bloom_filter(10240, 3, 0, 4).unwrap().type_expression(),
            "tokenbf_v1(10240, 3, 0)"
        );
        assert_eq!(
            SkipIndexSpec::ngram_bloom_filter(4, 10240, 3, 0, 1).unwrap().type_expression(),
            "ngrambf_v1(4, 10240, 3, 0)"
        );
        assert_eq!(SkipIndexSpec::set(100, 2).unwrap().type_expression(), "set(100)");
        assert_eq!(SkipIndexSpec::bloom_filter(1).unwrap().type_expression(), "bloom_filter");
    }

    #[test]
    fn test_out_of_range_parameters_rejected() {
        assert!(SkipIndexSpec::minmax(0).is_err());
        assert!(SkipIndexSpec::minmax(1001).is_err());
        assert!(SkipIndexSpec::bloom_filter_with_rate(0.6, 3).is_err());
        assert!(SkipIndexSpec::bloom_filter_with_rate(0.0001, 3).is_err());
        assert!(SkipIndexSpec::token_bloom_filter(128, 3, 0, 1).is_err());
        assert!(SkipIndexSpec::token_bloom_filter(1024, 11, 0, 1).is_err());
        assert!(SkipIndexSpec::ngram_bloom_filter(0, 1024, 3, 0, 1).is_err());
        assert!(SkipIndexSpec::set(1_000_001, 1).is_err());
    }

    #[test]
    fn test_non_finite_rate_rejected() {
        for rate in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = SkipIndexSpec::bloom_filter_with_rate(rate, 3).unwrap_err();
            assert!(matches!(err, ClickguardError::ConfigurationValidation { .. }));
        }
    }

    #[test]
    fn test_boundaries_accepted() {
        assert!(SkipIndexSpec::minmax(1).is_ok());
        assert!(SkipIndexSpec::minmax(1000).is_ok());
        assert!(SkipIndexSpec::bloom_filter_with_rate(0.5, 3).is_ok());
        assert!(SkipIndexSpec::set(0, 1).is_ok());
    }
}
