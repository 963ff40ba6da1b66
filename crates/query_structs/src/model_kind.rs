use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::PredictorError;

/// Regression algorithm behind a performance model.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ModelKind {
    /// Ordinary least squares.
    #[default]
    Linear,
    /// Single CART regression tree.
    Tree,
    /// Bagged ensemble of regression trees.
    Forest,
}

impl ModelKind {
    /// Returns the long name used in stored model metadata.
    #[must_use]
    pub const fn as_metadata_name(self) -> &'static str {
        match self {
            Self::Linear => "linear_regression",
            Self::Tree => "decision_tree",
            Self::Forest => "random_forest",
        }
    }
}

impl FromStr for ModelKind {
    type Err = PredictorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "linear" | "linear_regression" => Ok(Self::Linear),
            "tree" | "decision_tree" => Ok(Self::Tree),
            "forest" | "random_forest" => Ok(Self::Forest),
            _ => Err(PredictorError::InvalidConfiguration(format!(
                "Invalid model_type: {s}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_parse_short_and_long_names() {
        assert_eq!("linear".parse::<ModelKind>(), Ok(ModelKind::Linear));
        assert_eq!("Decision-Tree".parse::<ModelKind>(), Ok(ModelKind::Tree));
        assert_eq!("random_forest".parse::<ModelKind>(), Ok(ModelKind::Forest));
    }

    #[test]
    fn test_invalid_kind_is_configuration_error() {
        let err = "invalid_model".parse::<ModelKind>().unwrap_err();
        assert!(matches!(err, PredictorError::InvalidConfiguration(_)));
        assert!(err.to_string().contains("Invalid model_type"));
    }

    #[test]
    fn test_display_round_trips_through_from_str() {
        for kind in ModelKind::iter() {
            assert_eq!(kind.to_string().parse::<ModelKind>(), Ok(kind));
            assert_eq!(kind.as_metadata_name().parse::<ModelKind>(), Ok(kind));
        }
    }
}
