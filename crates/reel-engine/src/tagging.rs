//! Content tagging collaborator
//!
//! A [`FrameTagger`] turns one sampled frame into a [`TagRecord`]. The
//! default [`HeuristicTagger`] asks a [`Captioner`] for a short caption,
//! measures the frame's brightness, and derives tags and 0..10 scores from
//! keywords in the caption. Construct one tagger per process and share it
//! between jobs.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{ReelError, ReelResult};
use crate::media::FfmpegClient;
use crate::tags::{ShotType, TagRecord};

const MAX_NEW_TOKENS: u32 = 32;

/// Tag → caption keywords that imply it.
const KEYWORDS: &[(&str, &[&str])] = &[
    ("club", &["club", "bar"]),
    ("crowd", &["crowd", "people", "audience"]),
    ("dancing", &["dance", "dancing"]),
    ("dj", &["dj", "turntable"]),
    ("drinks", &["drink", "beer", "cocktail"]),
    ("friends", &["friends", "friend", "group"]),
    ("lights", &["lights", "neon", "stage"]),
    ("phone", &["phone", "mobile"]),
    ("selfie", &["selfie"]),
    ("street", &["street", "road"]),
];

const PERSON_WORDS: &[&str] = &["person", "people", "man", "woman", "boy", "girl"];
const HIGHLIGHT_TAGS: &[&str] = &["selfie", "dj", "dancing", "crowd"];

#[async_trait]
pub trait Captioner: Send + Sync {
    /// Short natural-language description of an image; empty when unknown.
    async fn caption(&self, image: &Path) -> ReelResult<String>;
}

/// Captioner for setups without a model endpoint.
#[derive(Debug, Clone, Default)]
pub struct NoopCaptioner;

#[async_trait]
impl Captioner for NoopCaptioner {
    async fn caption(&self, _image: &Path) -> ReelResult<String> {
        Ok(String::new())
    }
}

/// Image-to-text model behind an HTTP inference endpoint.
#[derive(Debug, Clone)]
pub struct HttpCaptioner {
    client: Client,
    endpoint: String,
    model: String,
    token: Option<String>,
}

impl HttpCaptioner {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> ReelResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            token,
        })
    }
}

/// `generated_text` from either `[{..}]` or `{..}` responses.
fn parse_caption(body: &Value) -> Option<String> {
    let item = match body {
        Value::Array(items) => items.first()?,
        other => other,
    };
    item.get("generated_text")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
}

#[async_trait]
impl Captioner for HttpCaptioner {
    async fn caption(&self, image: &Path) -> ReelResult<String> {
        let bytes = tokio::fs::read(image).await?;
        let payload = json!({
            "inputs": base64::engine::general_purpose::STANDARD.encode(&bytes),
            "parameters": { "max_new_tokens": MAX_NEW_TOKENS },
        });

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ReelError::tool(
                "captioner",
                format!("{} returned {}: {}", self.model, status, text.trim()),
            ));
        }

        let body: Value = response.json().await?;
        Ok(parse_caption(&body).unwrap_or_default())
    }
}

/// Tags implied by `caption`, sorted.
pub fn extract_tags(caption: &str) -> Vec<String> {
    let lower = caption.to_lowercase();
    KEYWORDS
        .iter()
        .filter(|(_, words)| words.iter().any(|w| lower.contains(w)))
        .map(|(tag, _)| tag.to_string())
        .collect()
}

fn has(tags: &[String], tag: &str) -> bool {
    tags.iter().any(|t| t == tag)
}

pub fn shot_type(caption: &str, tags: &[String]) -> ShotType {
    let lower = caption.to_lowercase();
    if has(tags, "selfie") || lower.contains("selfie") {
        ShotType::Selfie
    } else if lower.contains("close") && lower.contains("up") {
        ShotType::Closeup
    } else if has(tags, "crowd") || has(tags, "street") {
        ShotType::Wide
    } else if lower.contains("pov") {
        ShotType::Pov
    } else {
        ShotType::Other
    }
}

pub fn people_score(caption: &str, tags: &[String]) -> u8 {
    let lower = caption.to_lowercase();
    if has(tags, "selfie") {
        2
    } else if has(tags, "crowd") {
        5
    } else if PERSON_WORDS.iter().any(|w| lower.contains(w)) {
        3
    } else {
        0
    }
}

pub fn energy_score(tags: &[String], brightness: f64) -> u8 {
    let mut score: i32 = 4;
    if has(tags, "dancing") {
        score += 3;
    }
    if has(tags, "crowd") {
        score += 2;
    }
    if has(tags, "lights") {
        score += 1;
    }
    if has(tags, "club") {
        score += 1;
    }
    if brightness < 0.2 {
        score -= 2;
    }
    score.clamp(0, 10) as u8
}

pub fn highlight_score(energy: u8, tags: &[String], people: u8) -> u8 {
    let mut score = energy as i32;
    if people > 0 {
        score += 1;
    }
    if HIGHLIGHT_TAGS.iter().any(|t| has(tags, t)) {
        score += 2;
    }
    score.clamp(0, 10) as u8
}

/// Full tag record for a frame from its caption and brightness.
pub fn describe(caption: &str, brightness: f64) -> TagRecord {
    let tags = extract_tags(caption);
    let people = people_score(caption, &tags);
    let energy = energy_score(&tags, brightness);
    let highlight = highlight_score(energy, &tags, people);

    TagRecord {
        scene: caption.to_string(),
        shot_type: shot_type(caption, &tags),
        tags,
        energy,
        highlight,
        people,
        brightness: (brightness * 1000.0).round() / 1000.0,
        ai_used: !caption.is_empty(),
    }
}

#[async_trait]
pub trait FrameTagger: Send + Sync {
    async fn tag_frame(&self, frame: &Path) -> ReelResult<TagRecord>;
}

/// Caption plus brightness heuristics.
pub struct HeuristicTagger {
    captioner: Arc<dyn Captioner>,
    ffmpeg: FfmpegClient,
}

impl HeuristicTagger {
    pub fn new(captioner: Arc<dyn Captioner>, ffmpeg: FfmpegClient) -> Self {
        Self { captioner, ffmpeg }
    }

    /// HTTP captioner when an endpoint is configured, heuristics only otherwise.
    pub fn from_config(config: &EngineConfig) -> ReelResult<Self> {
        let captioner: Arc<dyn Captioner> = match &config.caption_endpoint {
            Some(endpoint) => Arc::new(HttpCaptioner::new(
                endpoint,
                &config.caption_model,
                config.caption_token.clone(),
                Duration::from_secs(config.caption_timeout_secs),
            )?),
            None => Arc::new(NoopCaptioner),
        };
        Ok(Self::new(captioner, FfmpegClient::from_config(config)))
    }
}

#[async_trait]
impl FrameTagger for HeuristicTagger {
    async fn tag_frame(&self, frame: &Path) -> ReelResult<TagRecord> {
        let brightness = self.ffmpeg.mean_brightness(frame).await?;
        let caption = match self.captioner.caption(frame).await {
            Ok(caption) => caption,
            Err(e) => {
                warn!(frame = %frame.display(), error = %e, "Captioning failed, using heuristics only");
                String::new()
            }
        };
        debug!(frame = %frame.display(), caption = %caption, brightness, "Tagged frame");
        Ok(describe(&caption, brightness))
    }
}
