use colored::Colorize;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Transport-level failure taxonomy. Only `QuotaExhausted` is transient;
/// everything else aborts the batch immediately.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle quota exhausted")]
    QuotaExhausted,
    #[error("oracle request failed: {0}")]
    Http(String),
    #[error("malformed oracle response: {0}")]
    Malformed(String),
}

/// One resolved title, deserialized from the oracle's strict-JSON output.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OracleEntry {
    #[serde(rename = "titulo", default)]
    pub title: String,
    #[serde(rename = "anio", default)]
    pub year: String,
}

/// Seam between the retry loop and the wire, so the loop is testable with
/// canned responses.
pub trait OracleTransport {
    fn generate(&self, prompt: &str) -> Result<String, OracleError>;
}

/// Blocking sleeps are injected so tests can observe backoff durations.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Production transport for the Gemini `generateContent` endpoint,
/// requesting a JSON response body.
pub struct GeminiTransport {
    agent: ureq::Agent,
    url: String,
}

impl GeminiTransport {
    pub fn new(model: &str, api_key: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout_read(Duration::from_secs(120))
            .build();
        let url = format!("{}/{}:generateContent?key={}", GEMINI_BASE_URL, model, api_key);
        Self { agent, url }
    }

    fn classify_failure(error: ureq::Error) -> OracleError {
        match error {
            ureq::Error::Status(429, _) => OracleError::QuotaExhausted,
            ureq::Error::Status(code, response) => {
                let body = response.into_string().unwrap_or_default();
                if body.contains("RESOURCE_EXHAUSTED") {
                    OracleError::QuotaExhausted
                } else {
                    OracleError::Http(format!("status {}: {}", code, body))
                }
            }
            ureq::Error::Transport(transport) => OracleError::Http(transport.to_string()),
        }
    }
}

impl OracleTransport for GeminiTransport {
    fn generate(&self, prompt: &str) -> Result<String, OracleError> {
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "responseMimeType": "application/json" }
        });

        let response = self
            .agent
            .post(&self.url)
            .send_json(body)
            .map_err(Self::classify_failure)?;

        let payload: serde_json::Value = response
            .into_json()
            .map_err(|e| OracleError::Malformed(e.to_string()))?;

        payload["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| OracleError::Malformed("response carries no candidate text".to_string()))
    }
}

/// Batched title resolution with quota-aware retry.
///
/// A batch that exhausts its retries, or hits any non-quota failure, yields
/// an empty mapping: the engine reports every file in it as failed and
/// leaves them unmanifested, so the next run picks them up again.
pub struct OracleClient {
    transport: Box<dyn OracleTransport>,
    sleeper: Box<dyn Sleeper>,
    title_language: String,
    max_attempts: u32,
    backoff_base: Duration,
}

impl OracleClient {
    pub fn new(
        transport: Box<dyn OracleTransport>,
        sleeper: Box<dyn Sleeper>,
        title_language: String,
        max_attempts: u32,
        backoff_base: Duration,
    ) -> Self {
        Self {
            transport,
            sleeper,
            title_language,
            max_attempts,
            backoff_base,
        }
    }

    pub fn classify_batch(&self, filenames: &[String]) -> HashMap<String, OracleEntry> {
        let prompt = build_prompt(filenames, &self.title_language);

        for attempt in 1..=self.max_attempts {
            match self.transport.generate(&prompt) {
                Ok(text) => match parse_batch(&text) {
                    Ok(map) => return map,
                    Err(err) => {
                        eprintln!("{}", format!("Oracle error: {}", err).red());
                        return HashMap::new();
                    }
                },
                Err(OracleError::QuotaExhausted) => {
                    let wait = self.backoff_base * attempt;
                    eprintln!(
                        "{}",
                        format!("Quota exhausted; pausing {}s before retry...", wait.as_secs())
                            .red()
                    );
                    self.sleeper.sleep(wait);
                }
                Err(err) => {
                    // Auth/network/malformed-payload failures are not
                    // expected to clear on their own; abort the batch.
                    eprintln!("{}", format!("Oracle error: {}", err).red());
                    return HashMap::new();
                }
            }
        }
        HashMap::new()
    }
}

fn build_prompt(filenames: &[String], title_language: &str) -> String {
    let input = serde_json::to_string(filenames).unwrap_or_else(|_| "[]".to_string());
    format!(
        "Act as a movie database API (IMDb).\n\
         TASK: identify the official title and release year for each filename.\n\
         OUTPUT LANGUAGE: \"{title_language}\" (if 'original', keep the title's original language).\n\
         \n\
         INPUT (JSON list): {input}\n\
         \n\
         OUTPUT (strictly a JSON object, one key per input filename):\n\
         {{\n\
           \"original_file_1.ext\": {{ \"titulo\": \"Official Title\", \"anio\": \"YYYY\" }},\n\
           \"file_2.avi\": {{ \"titulo\": \"Title 2\", \"anio\": \"YYYY\" }}\n\
         }}\n"
    )
}

/// A value the oracle could not shape (`null`, wrong type) is a per-file
/// gap, not a batch failure; only an unparsable body aborts the batch.
fn parse_batch(text: &str) -> Result<HashMap<String, OracleEntry>, OracleError> {
    let raw: HashMap<String, serde_json::Value> =
        serde_json::from_str(text).map_err(|e| OracleError::Malformed(e.to_string()))?;
    Ok(raw
        .into_iter()
        .filter_map(|(name, value)| {
            serde_json::from_value::<OracleEntry>(value)
                .ok()
                .map(|entry| (name, entry))
        })
        .collect())
}
