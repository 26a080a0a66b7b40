//! Gemini `generateContent` client and the background service the UI talks to.

use crate::config::Config;
use crate::error::AiError;
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

pub const FIX_PROMPT: &str = "Find and fix any bugs in this code:";
pub const EXPLAIN_PROMPT: &str = "Explain this line of code:";
pub const OPTIMIZE_PROMPT: &str = "Optimize this code for better performance or readability:";
pub const TEST_PROMPT: &str = "Generate unit tests for this code:";

const REQUEST_TIMEOUT_SECS: u64 = 60;
const MIN_COMPLETION_CONTEXT: usize = 3;
const MAX_SUGGESTIONS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Generation {
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl Generation {
    pub const ASK: Generation = Generation {
        max_output_tokens: 2000,
        temperature: 0.5,
    };
    pub const COMPLETE: Generation = Generation {
        max_output_tokens: 100,
        temperature: 0.2,
    };
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

fn request_body(prompt: &str, generation: Generation) -> GenerateRequest<'_> {
    GenerateRequest {
        contents: vec![RequestContent {
            parts: vec![RequestPart { text: prompt }],
        }],
        generation_config: GenerationConfig {
            max_output_tokens: generation.max_output_tokens,
            temperature: generation.temperature,
        },
    }
}

/// Joins the text parts of the first candidate.
pub fn parse_response(body: &str) -> Result<String, AiError> {
    let response: GenerateResponse = serde_json::from_str(body)?;
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(AiError::Empty);
    }
    Ok(text)
}

pub fn build_prompt(prompt: &str, context: &str) -> String {
    format!("{prompt}\n\n```\n{context}\n```")
}

/// `None` when there is too little typed text to complete from.
pub fn completion_prompt(context_before: &str) -> Option<String> {
    let trimmed = context_before.trim();
    if trimmed.chars().count() < MIN_COMPLETION_CONTEXT {
        return None;
    }
    Some(format!("Suggest code completions for: {context_before}"))
}

pub fn format_suggestions(reply: &str) -> Option<String> {
    let picks: Vec<&str> = reply
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(MAX_SUGGESTIONS)
        .collect();
    if picks.is_empty() {
        return None;
    }
    let mut out = String::from("Suggestions:");
    for (idx, pick) in picks.iter().enumerate() {
        out.push_str(&format!("\n{}. {pick}", idx + 1));
    }
    Some(out)
}

/// Text shown in the assistant panel for a failed request.
pub fn failure_text(err: &AiError) -> String {
    match err {
        AiError::Empty | AiError::NotConfigured(_) => err.to_string(),
        other => format!("Gemini Error: {other}"),
    }
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    endpoint: String,
    model: String,
    key_env: String,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn from_config(config: &Config) -> Self {
        let api_key = env::var(&config.ai_api_key_env)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        if api_key.is_none() {
            tracing::info!(var = %config.ai_api_key_env, "no Gemini API key; assistant disabled");
        }
        Self {
            endpoint: config.ai_endpoint.trim_end_matches('/').to_string(),
            model: config.ai_model.clone(),
            key_env: config.ai_api_key_env.clone(),
            api_key,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.api_key.is_some()
    }

    fn url(&self, key: &str) -> String {
        format!("{}/{}:generateContent?key={key}", self.endpoint, self.model)
    }

    pub fn generate(&self, prompt: &str, generation: Generation) -> Result<String, AiError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AiError::NotConfigured(self.key_env.clone()))?;

        tracing::debug!(model = %self.model, chars = prompt.len(), "sending generateContent");
        let response = minreq::post(self.url(key))
            .with_header("Content-Type", "application/json")
            .with_header("User-Agent", "vimai")
            .with_timeout(REQUEST_TIMEOUT_SECS)
            .with_json(&request_body(prompt, generation))?
            .send()?;

        let body = response.as_str()?;
        if !(200..300).contains(&response.status_code) {
            return Err(AiError::Status {
                status: response.status_code,
                body: body.chars().take(200).collect(),
            });
        }
        parse_response(body)
    }
}

#[derive(Debug)]
pub enum AiEvent {
    Answer(String),
    Suggestions(String),
    Failed(AiError),
    CompletionFailed(AiError),
}

/// Owns the client and the reply channel; requests run on worker threads.
pub struct AiService {
    client: GeminiClient,
    tx: Sender<AiEvent>,
    rx: Receiver<AiEvent>,
    in_flight: usize,
}

impl AiService {
    pub fn new(client: GeminiClient) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            client,
            tx,
            rx,
            in_flight: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight > 0
    }

    pub fn ask(&mut self, prompt: &str, context: &str) -> Result<(), AiError> {
        if !self.client.is_connected() {
            return Err(AiError::NotConfigured(self.client.key_env.clone()));
        }
        let full = build_prompt(prompt, context);
        self.spawn(full, Generation::ASK, false)
    }

    /// Returns `Ok(false)` when the context is too short to bother.
    pub fn complete(&mut self, context_before: &str) -> Result<bool, AiError> {
        if !self.client.is_connected() {
            return Err(AiError::NotConfigured(self.client.key_env.clone()));
        }
        let Some(prompt) = completion_prompt(context_before) else {
            return Ok(false);
        };
        self.spawn(prompt, Generation::COMPLETE, true)?;
        Ok(true)
    }

    fn spawn(&mut self, prompt: String, generation: Generation, completion: bool) -> Result<(), AiError> {
        let client = self.client.clone();
        let tx = self.tx.clone();
        let spawned = thread::Builder::new()
            .name("vimai-ai".to_string())
            .spawn(move || {
                let event = match client.generate(&prompt, generation) {
                    Ok(text) if completion => match format_suggestions(&text) {
                        Some(s) => AiEvent::Suggestions(s),
                        None => AiEvent::CompletionFailed(AiError::Empty),
                    },
                    Ok(text) => AiEvent::Answer(text),
                    Err(err) => {
                        tracing::warn!(%err, completion, "Gemini request failed");
                        if completion {
                            AiEvent::CompletionFailed(err)
                        } else {
                            AiEvent::Failed(err)
                        }
                    }
                };
                let _ = tx.send(event);
            });
        match spawned {
            Ok(_) => {
                self.in_flight += 1;
                Ok(())
            }
            Err(err) => {
                tracing::error!(%err, "failed to spawn assistant thread");
                Err(err.into())
            }
        }
    }

    #[cfg(test)]
    pub fn deliver(&mut self, event: AiEvent) {
        self.in_flight += 1;
        let _ = self.tx.send(event);
    }

    pub fn drain(&mut self) -> Vec<AiEvent> {
        let events: Vec<AiEvent> = self.rx.try_iter().collect();
        self.in_flight = self.in_flight.saturating_sub(events.len());
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_config() -> Config {
        Config {
            ai_api_key_env: "VIMAI_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn prompt_wraps_context_in_fence() {
        assert_eq!(
            build_prompt(FIX_PROMPT, "x = 1"),
            "Find and fix any bugs in this code:\n\n```\nx = 1\n```"
        );
    }

    #[test]
    fn completion_needs_three_characters() {
        assert_eq!(completion_prompt("  ab  "), None);
        assert_eq!(
            completion_prompt("    def").as_deref(),
            Some("Suggest code completions for:     def")
        );
        assert_eq!(
            completion_prompt("x = fo").as_deref(),
            Some("Suggest code completions for: x = fo")
        );
    }

    #[test]
    fn suggestions_take_first_three_non_empty_lines() {
        let reply = "\nprint(x)\n\n  return x\nx += 1\nignored()";
        assert_eq!(
            format_suggestions(reply).as_deref(),
            Some("Suggestions:\n1. print(x)\n2. return x\n3. x += 1")
        );
        assert_eq!(format_suggestions(" \n\n"), None);
    }

    #[test]
    fn parses_candidate_text_parts() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"Hello "},{"text":"world"}],"role":"model"}}]}"#;
        assert_eq!(parse_response(body).unwrap(), "Hello world");
    }

    #[test]
    fn empty_candidates_is_empty_error() {
        assert!(matches!(parse_response(r#"{"candidates":[]}"#), Err(AiError::Empty)));
        assert!(matches!(parse_response("{}"), Err(AiError::Empty)));
        assert!(matches!(
            parse_response(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#),
            Err(AiError::Empty)
        ));
    }

    #[test]
    fn malformed_body_is_json_error() {
        assert!(matches!(parse_response("<html>"), Err(AiError::Json(_))));
    }

    #[test]
    fn request_body_shape() {
        let value = serde_json::to_value(request_body("hi", Generation::COMPLETE)).unwrap();
        assert_eq!(value["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 100);
        let temp = value["generationConfig"]["temperature"].as_f64().unwrap();
        assert!((temp - 0.2).abs() < 1e-6);
    }

    #[test]
    fn missing_key_means_not_connected() {
        let client = GeminiClient::from_config(&offline_config());
        assert!(!client.is_connected());
        let err = client.generate("hi", Generation::ASK).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Gemini AI not available (set VIMAI_TEST_KEY_THAT_IS_NEVER_SET)"
        );

        let mut service = AiService::new(client);
        assert!(service.ask(TEST_PROMPT, "x").is_err());
        assert!(!service.is_busy());
        assert!(service.drain().is_empty());
    }

    #[test]
    fn url_includes_model_and_method() {
        let client = GeminiClient::from_config(&offline_config());
        assert_eq!(
            client.url("k"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent?key=k"
        );
    }

    #[test]
    fn failure_text_prefixes_transport_errors() {
        assert_eq!(failure_text(&AiError::Empty), "No response text received from Gemini");
        let err = AiError::Status {
            status: 400,
            body: "bad".to_string(),
        };
        assert_eq!(failure_text(&err), "Gemini Error: API returned status 400: bad");
    }
}
