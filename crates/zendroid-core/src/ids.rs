use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier the server assigns when a run is created. Opaque to the client.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RunId {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_owned()))
    }
}

impl AsRef<str> for RunId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_preserves_value() {
        let id = RunId::from_raw("3f1c-run");
        assert_eq!(id.as_str(), "3f1c-run");
        assert_eq!(id.to_string(), "3f1c-run");
    }

    #[test]
    fn serializes_as_bare_string() {
        let id = RunId::from_raw("r1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"r1\"");
        let parsed: RunId = serde_json::from_str("\"r1\"").unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn parses_from_str() {
        let id: RunId = "abc".parse().unwrap();
        assert_eq!(id, RunId::from_raw("abc"));
    }
}
