//! Conduit over HTTP.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};

use super::{Conduit, ConduitError};

/// Response envelope shared by every Conduit method.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_info: Option<String>,
}

/// [`Conduit`] client posting form-encoded calls to `{uri}/api/{method}`.
pub struct HttpConduit {
    base: String,
    token: Option<String>,
    client: reqwest::blocking::Client,
}

impl HttpConduit {
    /// Build a client for the server at `uri`.
    ///
    /// # Errors
    /// Returns the HTTP client builder error.
    pub fn new(
        uri: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            base: uri.trim_end_matches('/').to_owned(),
            token,
            client,
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/api/{method}", self.base)
    }

    fn with_token(&self, params: Value) -> Value {
        let mut map = match params {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("params".to_owned(), other);
                map
            }
        };
        if let Some(token) = &self.token {
            map.insert("__conduit__".to_owned(), json!({ "token": token }));
        }
        Value::Object(map)
    }
}

impl Conduit for HttpConduit {
    #[instrument(skip(self, params))]
    fn call(&self, method: &str, params: Value) -> Result<Value, ConduitError> {
        let transport = |source| ConduitError::Transport {
            method: method.to_owned(),
            source,
        };
        let body = self.with_token(params).to_string();
        let response = self
            .client
            .post(self.endpoint(method))
            .form(&[("params", body.as_str()), ("output", "json"), ("__conduit__", "1")])
            .send()
            .map_err(transport)?
            .error_for_status()
            .map_err(transport)?;
        let envelope: Envelope = response.json().map_err(|source| ConduitError::InvalidBody {
            method: method.to_owned(),
            source,
        })?;
        decode_envelope(method, envelope)
    }
}

fn decode_envelope(method: &str, envelope: Envelope) -> Result<Value, ConduitError> {
    if let Some(code) = envelope.error_code.filter(|c| !c.is_empty()) {
        return Err(ConduitError::Remote {
            method: method.to_owned(),
            code,
            info: envelope.error_info.unwrap_or_default(),
        });
    }
    debug!(method, "conduit call ok");
    Ok(envelope.result)
}
