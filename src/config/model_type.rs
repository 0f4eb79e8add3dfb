//! Supported model identifiers

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Model family a [`ModelType`] belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    /// Fine-tuned generative language model answering True/False per KC
    LanguageModel,
    /// Sequence model over discrete KC ids
    Baseline,
    /// Non-learned prediction policy used as an evaluation floor
    Policy,
}

/// Every model identifier accepted in a run configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ModelType {
    Lmkt,
    DktMulti,
    DktSem,
    Dkt,
    Akt,
    Dkvmn,
    Saint,
    SimpleKt,
    Random,
    Majority,
}

impl ModelType {
    /// All identifiers, in CLI order
    pub const ALL: [ModelType; 10] = [
        ModelType::Lmkt,
        ModelType::DktMulti,
        ModelType::DktSem,
        ModelType::Dkt,
        ModelType::Akt,
        ModelType::Dkvmn,
        ModelType::Saint,
        ModelType::SimpleKt,
        ModelType::Random,
        ModelType::Majority,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelType::Lmkt => "lmkt",
            ModelType::DktMulti => "dkt-multi",
            ModelType::DktSem => "dkt-sem",
            ModelType::Dkt => "dkt",
            ModelType::Akt => "akt",
            ModelType::Dkvmn => "dkvmn",
            ModelType::Saint => "saint",
            ModelType::SimpleKt => "simplekt",
            ModelType::Random => "random",
            ModelType::Majority => "majority",
        }
    }

    pub fn family(self) -> ModelFamily {
        match self {
            ModelType::Lmkt => ModelFamily::LanguageModel,
            ModelType::Random | ModelType::Majority => ModelFamily::Policy,
            _ => ModelFamily::Baseline,
        }
    }

    pub fn is_language_model(self) -> bool {
        self.family() == ModelFamily::LanguageModel
    }

    /// Architectures that consume one KC per sequence step and need flattened turns
    pub fn flattens_kcs(self) -> bool {
        !matches!(self, ModelType::DktMulti | ModelType::DktSem)
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ModelType::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| Error::UnsupportedModel(s.to_string()))
    }
}

impl TryFrom<String> for ModelType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ModelType> for String {
    fn from(value: ModelType) -> Self {
        value.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_names() {
        for model in ModelType::ALL {
            assert_eq!(model.as_str().parse::<ModelType>().unwrap(), model);
        }
    }

    #[test]
    fn test_unknown_model_fails_fast() {
        let err = "gpt-kt".parse::<ModelType>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedModel(name) if name == "gpt-kt"));
    }

    #[test]
    fn test_families() {
        assert_eq!(ModelType::Lmkt.family(), ModelFamily::LanguageModel);
        assert_eq!(ModelType::Saint.family(), ModelFamily::Baseline);
        assert_eq!(ModelType::Majority.family(), ModelFamily::Policy);
    }

    #[test]
    fn test_flattening() {
        assert!(!ModelType::DktMulti.flattens_kcs());
        assert!(!ModelType::DktSem.flattens_kcs());
        assert!(ModelType::Dkt.flattens_kcs());
        assert!(ModelType::SimpleKt.flattens_kcs());
    }

    #[test]
    fn test_serde_uses_cli_names() {
        let json = serde_json::to_string(&ModelType::DktMulti).unwrap();
        assert_eq!(json, "\"dkt-multi\"");
        let parsed: ModelType = serde_json::from_str("\"simplekt\"").unwrap();
        assert_eq!(parsed, ModelType::SimpleKt);
        assert!(serde_json::from_str::<ModelType>("\"bkt\"").is_err());
    }
}
