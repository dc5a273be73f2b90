//! Request selectors understood by the test-data explorer endpoint.

use std::fmt;
use std::str::FromStr;

use crate::ArgumentError;

/// Aggregation interval, mapped to the provider's numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Interval {
    #[cfg_attr(feature = "serde", serde(rename = "5m"))]
    FiveMinutes,
    #[cfg_attr(feature = "serde", serde(rename = "10m"))]
    TenMinutes,
    #[default]
    #[cfg_attr(feature = "serde", serde(rename = "15m"))]
    FifteenMinutes,
    #[cfg_attr(feature = "serde", serde(rename = "30m"))]
    ThirtyMinutes,
    #[cfg_attr(feature = "serde", serde(rename = "1h"))]
    OneHour,
    #[cfg_attr(feature = "serde", serde(rename = "2h"))]
    TwoHours,
    #[cfg_attr(feature = "serde", serde(rename = "3h"))]
    ThreeHours,
    #[cfg_attr(feature = "serde", serde(rename = "4h"))]
    FourHours,
    #[cfg_attr(feature = "serde", serde(rename = "5h"))]
    FiveHours,
    #[cfg_attr(feature = "serde", serde(rename = "6h"))]
    SixHours,
    #[cfg_attr(feature = "serde", serde(rename = "1d"))]
    OneDay,
}

impl Interval {
    /// All intervals in ascending order.
    pub const ALL: [Interval; 11] = [
        Interval::FiveMinutes,
        Interval::TenMinutes,
        Interval::FifteenMinutes,
        Interval::ThirtyMinutes,
        Interval::OneHour,
        Interval::TwoHours,
        Interval::ThreeHours,
        Interval::FourHours,
        Interval::FiveHours,
        Interval::SixHours,
        Interval::OneDay,
    ];

    /// Short label such as `15m` or `1d`.
    pub fn label(&self) -> &'static str {
        match self {
            Interval::FiveMinutes => "5m",
            Interval::TenMinutes => "10m",
            Interval::FifteenMinutes => "15m",
            Interval::ThirtyMinutes => "30m",
            Interval::OneHour => "1h",
            Interval::TwoHours => "2h",
            Interval::ThreeHours => "3h",
            Interval::FourHours => "4h",
            Interval::FiveHours => "5h",
            Interval::SixHours => "6h",
            Interval::OneDay => "1d",
        }
    }

    /// Provider-specific code sent as the `interval` query parameter.
    pub fn code(&self) -> &'static str {
        match self {
            Interval::FiveMinutes => "4",
            Interval::TenMinutes => "5",
            Interval::FifteenMinutes => "6",
            Interval::ThirtyMinutes => "7",
            Interval::OneHour => "8",
            Interval::TwoHours => "11",
            Interval::ThreeHours => "12",
            Interval::FourHours => "13",
            Interval::FiveHours => "15",
            Interval::SixHours => "16",
            Interval::OneDay => "9",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Interval {
    type Err = ArgumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Interval::ALL
            .iter()
            .copied()
            .find(|i| i.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| ArgumentError::UnknownInterval(s.to_string()))
    }
}

/// Test type filter applied when resolving a folder to its tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TestType {
    Web,
    Transaction,
    Api,
    #[default]
    All,
}

impl TestType {
    /// Lower-case label.
    pub fn label(&self) -> &'static str {
        match self {
            TestType::Web => "web",
            TestType::Transaction => "transaction",
            TestType::Api => "api",
            TestType::All => "all",
        }
    }

    /// Whether a provider test type name (e.g. `"Web"`) passes this filter.
    pub fn matches(&self, provider_name: &str) -> bool {
        match self {
            TestType::All => true,
            other => provider_name.eq_ignore_ascii_case(other.label()),
        }
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TestType {
    type Err = ArgumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "web" => Ok(TestType::Web),
            "transaction" => Ok(TestType::Transaction),
            "api" => Ok(TestType::Api),
            "all" => Ok(TestType::All),
            _ => Err(ArgumentError::UnknownTestType(s.to_string())),
        }
    }
}

/// Which explorer view to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DataKind {
    #[default]
    Aggregated,
    Raw,
}

impl DataKind {
    /// Path segment used in the explorer URL.
    pub fn path(&self) -> &'static str {
        match self {
            DataKind::Aggregated => "aggregated",
            DataKind::Raw => "raw",
        }
    }
}

impl FromStr for DataKind {
    type Err = ArgumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aggregated" => Ok(DataKind::Aggregated),
            "raw" => Ok(DataKind::Raw),
            _ => Err(ArgumentError::UnknownDataKind(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_codes() {
        assert_eq!(Interval::FiveMinutes.code(), "4");
        assert_eq!(Interval::TwoHours.code(), "11");
        assert_eq!(Interval::OneDay.code(), "9");
        assert_eq!(Interval::default().code(), "6");
    }

    #[test]
    fn test_interval_parse() {
        assert_eq!("1h".parse::<Interval>().unwrap(), Interval::OneHour);
        assert_eq!(" 6H ".parse::<Interval>().unwrap(), Interval::SixHours);
        assert!(matches!(
            "7m".parse::<Interval>(),
            Err(ArgumentError::UnknownInterval(_))
        ));
    }

    #[test]
    fn test_test_type_matches() {
        assert!(TestType::All.matches("Transaction"));
        assert!(TestType::Web.matches("Web"));
        assert!(!TestType::Api.matches("Web"));
        assert!("ftp".parse::<TestType>().is_err());
    }
}
