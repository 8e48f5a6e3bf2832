//! Priority-ID filters.
//!
//! A filter is written as comma-separated tokens, each of which is either a
//! single id (`1000`), a closed range (`2-5`), or a half-open range where the
//! missing side is unbounded (`3-`, `-100`). A lone `-` matches every id.
//!
//! ```
//! use facet_pov::FilterSet;
//!
//! let filter: FilterSet = "1,10-20,100-".parse().unwrap();
//! assert!(filter.contains(15));
//! assert!(filter.contains(4096));
//! assert!(!filter.contains(7));
//! ```

use core::fmt;
use core::str::FromStr;

/// One inclusive range of priority ids. `None` on a side means unbounded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Interval {
    /// Lowest matching id, or `None` for no lower bound
    pub low: Option<i64>,
    /// Highest matching id, or `None` for no upper bound
    pub high: Option<i64>,
}

impl Interval {
    /// An interval holding exactly one id.
    pub const fn point(id: i64) -> Self {
        Self {
            low: Some(id),
            high: Some(id),
        }
    }

    /// The interval matching every id.
    pub const fn everything() -> Self {
        Self {
            low: None,
            high: None,
        }
    }

    /// Whether `id` falls inside this interval.
    #[inline]
    pub fn contains(&self, id: i64) -> bool {
        self.low.is_none_or(|low| low <= id) && self.high.is_none_or(|high| id <= high)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.low, self.high) {
            (Some(low), Some(high)) if low == high => write!(f, "{low}"),
            (low, high) => {
                if let Some(low) = low {
                    write!(f, "{low}")?;
                }
                write!(f, "-")?;
                if let Some(high) = high {
                    write!(f, "{high}")?;
                }
                Ok(())
            }
        }
    }
}

/// An ordered set of [`Interval`]s answering "is this priority id enabled?".
///
/// A set with zero intervals matches nothing. That is not the same thing as
/// emissions being disabled altogether, which is a separate switch on the
/// [`Session`](crate::Session).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterSet {
    intervals: Vec<Interval>,
}

impl Default for FilterSet {
    /// The default filter lets every id through (same as parsing `-`).
    fn default() -> Self {
        Self::everything()
    }
}

impl FilterSet {
    /// A filter matching every id.
    pub fn everything() -> Self {
        Self {
            intervals: vec![Interval::everything()],
        }
    }

    /// A filter matching no id at all.
    pub fn nothing() -> Self {
        Self {
            intervals: Vec::new(),
        }
    }

    /// Build a filter from already-validated intervals.
    pub fn from_intervals(intervals: impl IntoIterator<Item = Interval>) -> Self {
        Self {
            intervals: intervals.into_iter().collect(),
        }
    }

    /// Parse a filter specification.
    pub fn parse(spec: &str) -> Result<Self, FilterError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Ok(Self::nothing());
        }

        let intervals = spec
            .split(',')
            .map(parse_token)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { intervals })
    }

    /// Parse a filter specification, falling back to [`FilterSet::everything`]
    /// when it is malformed. The error is handed back for reporting.
    pub fn parse_or_default(spec: &str) -> (Self, Option<FilterError>) {
        match Self::parse(spec) {
            Ok(filter) => (filter, None),
            Err(err) => {
                tracing::warn!("ignoring id filter {spec:?}: {err}");
                (Self::default(), Some(err))
            }
        }
    }

    /// Whether `id` is enabled by this filter. The first matching interval wins.
    pub fn contains(&self, id: i64) -> bool {
        self.intervals.iter().any(|interval| interval.contains(id))
    }

    /// The intervals in the order they were written.
    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    /// Whether the filter holds no intervals (and so matches nothing).
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }
}

impl FromStr for FilterSet {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for FilterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, interval) in self.intervals.iter().enumerate() {
            if idx > 0 {
                write!(f, ",")?;
            }
            write!(f, "{interval}")?;
        }
        Ok(())
    }
}

fn parse_token(token: &str) -> Result<Interval, FilterError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(FilterError::EmptyToken);
    }

    let Some((low, high)) = token.split_once('-') else {
        return parse_bound(token, token).map(Interval::point);
    };
    if high.contains('-') {
        return Err(FilterError::TooManyHyphens {
            token: token.to_owned(),
        });
    }

    let low = match low.trim() {
        "" => None,
        low => Some(parse_bound(token, low)?),
    };
    let high = match high.trim() {
        "" => None,
        high => Some(parse_bound(token, high)?),
    };

    if let (Some(l), Some(h)) = (low, high)
        && l > h
    {
        return Err(FilterError::Inverted {
            token: token.to_owned(),
        });
    }

    Ok(Interval { low, high })
}

fn parse_bound(token: &str, text: &str) -> Result<i64, FilterError> {
    text.trim()
        .parse::<i64>()
        .map_err(|_| FilterError::NotAnInteger {
            token: token.to_owned(),
        })
}

/// Errors produced while parsing a filter specification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilterError {
    /// Two commas with nothing in between, or a leading/trailing comma.
    EmptyToken,

    /// A bound was not an integer.
    NotAnInteger {
        /// The offending token.
        token: String,
    },

    /// More than one `-` in a single token.
    TooManyHyphens {
        /// The offending token.
        token: String,
    },

    /// A closed range whose low bound is above its high bound.
    Inverted {
        /// The offending token.
        token: String,
    },
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterError::EmptyToken => write!(f, "empty token between commas"),
            FilterError::NotAnInteger { token } => {
                write!(f, "token {token:?} has a non-integer bound")
            }
            FilterError::TooManyHyphens { token } => {
                write!(f, "token {token:?} has more than one '-'")
            }
            FilterError::Inverted { token } => {
                write!(f, "token {token:?} has its low bound above its high bound")
            }
        }
    }
}

impl core::error::Error for FilterError {}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    /// Plain list-of-pairs reference used to cross-check `contains`.
    fn naive(pairs: &[(i64, i64)], id: i64) -> bool {
        pairs.iter().any(|&(low, high)| low <= id && id <= high)
    }

    #[test]
    fn grammar_examples() {
        let single = FilterSet::parse("1000").unwrap();
        assert_eq!(single.intervals(), &[Interval::point(1000)]);

        let all = FilterSet::parse("-").unwrap();
        assert_eq!(all.intervals(), &[Interval::everything()]);

        let from = FilterSet::parse("3-").unwrap();
        assert_eq!(
            from.intervals(),
            &[Interval {
                low: Some(3),
                high: None
            }]
        );

        let upto = FilterSet::parse("-100").unwrap();
        assert_eq!(
            upto.intervals(),
            &[Interval {
                low: None,
                high: Some(100)
            }]
        );
    }

    #[test]
    fn empty_spec_matches_nothing_and_dash_matches_everything() {
        let empty = FilterSet::parse("").unwrap();
        let dash = FilterSet::parse("-").unwrap();
        assert!(empty.is_empty());
        for id in -1000..=1000 {
            assert!(!empty.contains(id));
            assert!(dash.contains(id));
        }
        assert!(dash.contains(i64::MIN));
        assert!(dash.contains(i64::MAX));
    }

    fn bound_strategy() -> impl Strategy<Value = Option<i64>> {
        prop_oneof![
            1 => Just(None),
            4 => (0i64..1200).prop_map(Some),
        ]
    }

    fn interval_strategy() -> impl Strategy<Value = Interval> {
        (bound_strategy(), bound_strategy()).prop_map(|bounds| match bounds {
            (Some(a), Some(b)) => Interval {
                low: Some(a.min(b)),
                high: Some(a.max(b)),
            },
            (low, high) => Interval { low, high },
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            failure_persistence: None,
            ..ProptestConfig::default()
        })]

        #[test]
        fn agrees_with_naive_reference(
            intervals in prop::collection::vec(interval_strategy(), 1..6),
        ) {
            let text = FilterSet::from_intervals(intervals.iter().copied()).to_string();
            let filter = FilterSet::parse(&text);
            prop_assert!(filter.is_ok(), "{text:?} did not parse");
            let filter = filter.unwrap();
            prop_assert_eq!(filter.intervals(), &intervals[..]);

            let pairs: Vec<_> = intervals
                .iter()
                .map(|i| (i.low.unwrap_or(i64::MIN), i.high.unwrap_or(i64::MAX)))
                .collect();
            for id in -1000..=1000 {
                prop_assert_eq!(filter.contains(id), naive(&pairs, id), "{} at id {}", text, id);
            }
        }
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert_eq!(FilterSet::parse("1,,2"), Err(FilterError::EmptyToken));
        assert_eq!(FilterSet::parse("1,"), Err(FilterError::EmptyToken));
        assert!(matches!(
            FilterSet::parse("abc"),
            Err(FilterError::NotAnInteger { .. })
        ));
        assert!(matches!(
            FilterSet::parse("1-2-3"),
            Err(FilterError::TooManyHyphens { .. })
        ));
        assert!(matches!(
            FilterSet::parse("9-2"),
            Err(FilterError::Inverted { .. })
        ));
    }

    #[test]
    fn malformed_spec_falls_back_to_everything() {
        let (filter, err) = FilterSet::parse_or_default("x-y");
        assert!(err.is_some());
        assert_eq!(filter, FilterSet::everything());
    }

    #[test]
    fn display_round_trips_the_grammar() {
        let filter = FilterSet::parse("1000,-,3-,-100,2-5").unwrap();
        assert_eq!(filter.to_string(), "1000,-,3-,-100,2-5");
    }
}
