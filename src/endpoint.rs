//! Target endpoints and the request fixtures the suites replay.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One callable endpoint of the target API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Short identifier used in reports (e.g. `predict_simple`).
    pub name: String,

    #[serde(with = "method_serde")]
    pub method: Method,

    /// Path relative to the base URL, with a leading slash.
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Endpoint {
    pub fn get(name: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            method: Method::GET,
            path: path.to_string(),
            payload: None,
        }
    }

    pub fn post(name: &str, path: &str, payload: Value) -> Self {
        Self {
            name: name.to_string(),
            method: Method::POST,
            path: path.to_string(),
            payload: Some(payload),
        }
    }

    pub fn predict(name: &str, home_team: &str, away_team: &str) -> Self {
        Self::post(
            name,
            "/predict",
            json!({ "home_team": home_team, "away_team": away_team }),
        )
    }

    pub fn analyze(name: &str, team: &str) -> Self {
        Self::post(name, "/analyze", json!({ "team": team }))
    }

    pub fn chat(name: &str, message: &str) -> Self {
        Self::post(name, "/chat", json!({ "message": message }))
    }
}

mod method_serde {
    use reqwest::Method;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(method: &Method, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(method.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Method, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Method::from_str(&raw.to_uppercase()).map_err(D::Error::custom)
    }
}

/// The endpoints the load suite exercises, in burst order.
pub fn load_test_endpoints() -> Vec<Endpoint> {
    vec![
        Endpoint::get("health", "/health"),
        Endpoint::predict("predict_simple", "Arsenal", "Chelsea"),
        Endpoint::analyze("analyze_team", "Liverpool"),
        Endpoint::chat("chat_simple", "¿Quién ganará la Premier League?"),
    ]
}

/// Look up one of the [`load_test_endpoints`] by name.
pub fn load_test_endpoint(name: &str) -> Option<Endpoint> {
    load_test_endpoints().into_iter().find(|e| e.name == name)
}

/// Read-only GET endpoints probed by the performance suite.
pub fn basic_endpoints() -> Vec<Endpoint> {
    ["health", "teams", "stats", "system"]
        .iter()
        .map(|name| Endpoint::get(name, &format!("/{}", name)))
        .collect()
}

pub fn prediction_cases() -> Vec<Endpoint> {
    [
        ("Liverpool", "Chelsea"),
        ("Arsenal", "Man City"),
        ("Man United", "Tottenham"),
        ("Newcastle", "Aston Villa"),
        ("Brighton", "West Ham"),
    ]
    .iter()
    .enumerate()
    .map(|(i, (home, away))| Endpoint::predict(&format!("prediction_{}", i + 1), home, away))
    .collect()
}

pub fn analysis_cases() -> Vec<Endpoint> {
    ["Liverpool", "Chelsea", "Arsenal", "Man City", "Man United"]
        .iter()
        .enumerate()
        .map(|(i, team)| Endpoint::analyze(&format!("analysis_{}", i + 1), team))
        .collect()
}

pub fn chat_cases() -> Vec<Endpoint> {
    [
        "¿Quién será el máximo goleador esta temporada?",
        "¿Cómo va el Arsenal esta temporada?",
        "¿Quién ganaría entre Liverpool y Chelsea?",
        "¿Cuáles son los favoritos al título?",
        "¿Qué tal los fichajes del Manchester United?",
    ]
    .iter()
    .enumerate()
    .map(|(i, message)| Endpoint::chat(&format!("chat_{}", i + 1), message))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixtures_have_expected_sizes() {
        assert_eq!(load_test_endpoints().len(), 4);
        assert_eq!(basic_endpoints().len(), 4);
        assert_eq!(prediction_cases().len(), 5);
        assert_eq!(analysis_cases().len(), 5);
        assert_eq!(chat_cases().len(), 5);
    }

    #[test]
    fn lookup_by_name() {
        let chat = load_test_endpoint("chat_simple").unwrap();
        assert_eq!(chat.method, Method::POST);
        assert_eq!(chat.path, "/chat");
        assert!(load_test_endpoint("missing").is_none());
    }

    #[test]
    fn endpoint_deserializes_lowercase_method() {
        let yaml = "name: teams\nmethod: get\npath: /teams\n";
        let endpoint: Endpoint = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(endpoint.method, Method::GET);
        assert!(endpoint.payload.is_none());
    }

    #[test]
    fn predict_payload_shape() {
        let endpoint = Endpoint::predict("p", "Arsenal", "Chelsea");
        let payload = endpoint.payload.unwrap();
        assert_eq!(payload["home_team"], "Arsenal");
        assert_eq!(payload["away_team"], "Chelsea");
    }
}
