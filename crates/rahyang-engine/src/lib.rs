use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::GenericImageView;
use indexmap::IndexMap;
use rahyang_contracts::food::{build_style_prompt, FoodContext, FoodStyle};
use rahyang_contracts::retry::{GenError, RetryPolicy};
use rahyang_contracts::runlog::RunLog;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

pub const TEXT_MODEL: &str = "gemini-2.5-flash";
pub const IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const IMAGEN_MODEL: &str = "imagen-4.0-generate-001";
pub const VIDEO_MODEL: &str = "veo-3.1-fast-generate-preview";
pub const TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";

pub const TTS_SAMPLE_RATE: u32 = 24_000;

/// Styled reference calls accept at most this many reference images.
pub const MAX_REFERENCE_IMAGES: usize = 2;

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Candidate finish reasons that mean the provider refused on content
/// policy grounds.
const SAFETY_FINISH_REASONS: [&str; 3] = ["SAFETY", "IMAGE_SAFETY", "PROHIBITED_CONTENT"];

/// Explicit credentials and endpoint configuration for a client.
///
/// Constructors take this object; nothing in the engine reads ambient
/// environment state, so tests run against fake keys and local bases.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub api_base: String,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// CLI-edge convenience: resolve the key from `GEMINI_API_KEY`, falling
    /// back to `GOOGLE_API_KEY`.
    pub fn from_env() -> Option<Self> {
        non_empty_env("GEMINI_API_KEY")
            .or_else(|| non_empty_env("GOOGLE_API_KEY"))
            .map(Self::new)
    }
}

/// Raw generated media plus its declared mime type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

/// An image shipped inline with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl InlineImage {
    pub fn jpeg(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            mime_type: "image/jpeg".to_string(),
        }
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        let mime_type = match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("png") => "image/png",
            Some("webp") => "image/webp",
            _ => "image/jpeg",
        };
        Ok(Self {
            bytes,
            mime_type: mime_type.to_string(),
        })
    }

    fn to_part(&self) -> Value {
        json!({
            "inlineData": {
                "mimeType": self.mime_type,
                "data": BASE64.encode(&self.bytes),
            }
        })
    }
}

// ---- clock/sleep and cancellation seams ----

/// Injected clock and sleep source.
///
/// Production uses [`SystemTicker`]; tests drive a fake whose `now()`
/// advances exactly by the slept durations, so retry and polling schedules
/// are asserted without real waits.
pub trait Ticker {
    fn sleep(&self, duration: Duration);
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTicker;

impl Ticker for SystemTicker {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }

    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Shared cancellation flag threaded through the executor and poller.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

// ---- retrying request executor ----

/// Run `request_fn` under `policy`.
///
/// The function is invoked up to `policy.max_attempts` times (the attempt
/// number, starting at 1, is passed in). Terminal errors and cancellation
/// short-circuit immediately; retryable errors wait the scheduled delay
/// first. Success mid-schedule returns at once.
pub fn execute<T>(
    policy: &RetryPolicy,
    ticker: &dyn Ticker,
    cancel: &CancelToken,
    mut request_fn: impl FnMut(usize) -> Result<T, GenError>,
) -> Result<T, GenError> {
    let mut attempt = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(GenError::Cancelled);
        }
        attempt += 1;
        match request_fn(attempt) {
            Ok(value) => return Ok(value),
            Err(err) if err.is_terminal() => return Err(err),
            Err(err) if attempt >= policy.max_attempts => return Err(err),
            Err(_) => ticker.sleep(policy.delay_after(attempt)),
        }
    }
}

// ---- long-running video jobs ----

/// Snapshot of an in-flight asynchronous operation. Polling returns a
/// fresh snapshot; handles are never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationHandle {
    pub name: String,
    pub done: bool,
    pub error: Option<String>,
    pub result_uri: Option<String>,
}

#[derive(Debug, Clone)]
pub struct VideoRequest {
    pub prompt: String,
    pub seed_image: Option<InlineImage>,
    pub aspect_ratio: AspectRatio,
    pub resolution: String,
}

impl VideoRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            seed_image: None,
            aspect_ratio: AspectRatio::Landscape,
            resolution: "720p".to_string(),
        }
    }
}

/// Provider seam for asynchronous video generation.
pub trait VideoBackend {
    fn submit(&self, request: &VideoRequest) -> Result<OperationHandle, GenError>;
    fn poll(&self, handle: &OperationHandle) -> Result<OperationHandle, GenError>;
    fn fetch(&self, uri: &str) -> Result<Artifact, GenError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    /// Hard wall-clock bound; exceeding it fails the job with
    /// [`GenError::TimedOut`].
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Submitted,
    Polling,
    Succeeded,
    Failed,
}

/// Drives one submit/poll/fetch cycle against a [`VideoBackend`].
///
/// Each job owns its handle; N jobs running on the same backend share no
/// mutable state, so one job's failure never touches another's lifecycle.
pub struct VideoJob<'a> {
    backend: &'a dyn VideoBackend,
    config: PollConfig,
    ticker: &'a dyn Ticker,
    cancel: CancelToken,
    state: JobState,
}

impl<'a> VideoJob<'a> {
    pub fn new(
        backend: &'a dyn VideoBackend,
        config: PollConfig,
        ticker: &'a dyn Ticker,
        cancel: CancelToken,
    ) -> Self {
        Self {
            backend,
            config,
            ticker,
            cancel,
            state: JobState::Idle,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn run(&mut self, request: &VideoRequest) -> Result<Artifact, GenError> {
        let outcome = self.drive(request);
        self.state = match outcome {
            Ok(_) => JobState::Succeeded,
            Err(_) => JobState::Failed,
        };
        outcome
    }

    fn drive(&mut self, request: &VideoRequest) -> Result<Artifact, GenError> {
        self.check_cancel()?;
        let mut handle = self.backend.submit(request)?;
        self.state = JobState::Submitted;
        let started = self.ticker.now();

        while !handle.done {
            self.state = JobState::Polling;
            let elapsed = self.ticker.now().duration_since(started);
            if elapsed >= self.config.timeout {
                return Err(GenError::TimedOut { after: elapsed });
            }
            self.ticker.sleep(self.config.interval);
            self.check_cancel()?;
            handle = self.backend.poll(&handle)?;
        }

        if let Some(message) = handle.error {
            return Err(GenError::OperationFailed { message });
        }
        let uri = handle.result_uri.ok_or(GenError::MissingArtifact)?;
        self.backend.fetch(&uri)
    }

    fn check_cancel(&self) -> Result<(), GenError> {
        if self.cancel.is_cancelled() {
            return Err(GenError::Cancelled);
        }
        Ok(())
    }
}

// ---- Gemini REST adapter ----

/// Blocking client for the generative API. All response-shape knowledge
/// lives here; callers only ever see [`Artifact`]s and [`GenError`]s.
pub struct GeminiClient {
    config: ClientConfig,
    http: HttpClient,
}

impl GeminiClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            http: HttpClient::new(),
        }
    }

    /// Reuse an existing [`HttpClient`] for connection pooling.
    pub fn with_client(http: HttpClient, config: ClientConfig) -> Self {
        Self { config, http }
    }

    fn model_url(&self, model: &str, verb: &str) -> String {
        format!("{}/models/{model}:{verb}", self.config.api_base)
    }

    fn post_json(&self, url: &str, payload: &Value) -> Result<Value, GenError> {
        let response = self
            .http
            .post(url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(payload)
            .send()
            .map_err(|err| GenError::Transport {
                detail: format!("request to {url} failed: {err}"),
            })?;
        read_json_response(response)
    }

    fn get_json(&self, url: &str) -> Result<Value, GenError> {
        let response = self
            .http
            .get(url)
            .query(&[("key", self.config.api_key.as_str())])
            .send()
            .map_err(|err| GenError::Transport {
                detail: format!("request to {url} failed: {err}"),
            })?;
        read_json_response(response)
    }

    /// Text (and vision) generation. With `json_output` the model is asked
    /// for an `application/json` response body.
    pub fn generate_text(
        &self,
        prompt: &str,
        image: Option<&InlineImage>,
        json_output: bool,
    ) -> Result<String, GenError> {
        let mut parts = vec![json!({ "text": prompt })];
        if let Some(image) = image {
            parts.push(image.to_part());
        }
        let mut payload = json!({
            "contents": [{ "role": "user", "parts": parts }],
        });
        if json_output {
            payload["generationConfig"] = json!({ "responseMimeType": "application/json" });
        }

        let answer = self.post_json(&self.model_url(TEXT_MODEL, "generateContent"), &payload)?;
        let parts = content_parts(&answer, "text data")?;
        first_text(&parts).ok_or(GenError::TransientNoData {
            what: "text data".to_string(),
        })
    }

    /// Styled image generation from a prompt plus reference images.
    pub fn generate_image(
        &self,
        prompt: &str,
        references: &[InlineImage],
    ) -> Result<Artifact, GenError> {
        let mut parts = vec![json!({ "text": prompt })];
        for reference in references.iter().take(MAX_REFERENCE_IMAGES) {
            parts.push(reference.to_part());
        }
        let payload = json!({
            "contents": [{ "role": "user", "parts": parts }],
        });

        let answer = self.post_json(&self.model_url(IMAGE_MODEL, "generateContent"), &payload)?;
        let parts = content_parts(&answer, "image data")?;
        first_inline_data(&parts, "image/").ok_or(GenError::TransientNoData {
            what: "image data".to_string(),
        })
    }

    /// Text-to-image via the Imagen predict endpoint.
    pub fn generate_imagen(&self, prompt: &str, aspect_ratio: &str) -> Result<Artifact, GenError> {
        let payload = json!({
            "instances": [{ "prompt": prompt }],
            "parameters": {
                "sampleCount": 1,
                "aspectRatio": aspect_ratio,
                "outputMimeType": "image/jpeg",
            },
        });
        let answer = self.post_json(&self.model_url(IMAGEN_MODEL, "predict"), &payload)?;
        let prediction = answer
            .get("predictions")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .ok_or(GenError::TransientNoData {
                what: "image data".to_string(),
            })?;
        let data = prediction
            .get("bytesBase64Encoded")
            .and_then(Value::as_str)
            .ok_or(GenError::TransientNoData {
                what: "image data".to_string(),
            })?;
        let bytes = BASE64
            .decode(data.as_bytes())
            .map_err(|err| GenError::InvalidResponse {
                detail: format!("image base64 decode failed: {err}"),
            })?;
        let mime_type = prediction
            .get("mimeType")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| Some("image/jpeg".to_string()));
        Ok(Artifact { bytes, mime_type })
    }

    /// Speech synthesis with a prebuilt voice. The artifact carries raw
    /// 16-bit PCM at [`TTS_SAMPLE_RATE`]; wrap it with [`wav_from_pcm16`]
    /// before writing a playable file.
    pub fn generate_speech(&self, text: &str, voice_name: &str) -> Result<Artifact, GenError> {
        let payload = json!({
            "contents": [{ "role": "user", "parts": [{ "text": text }] }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": voice_name }
                    }
                }
            },
        });
        let answer = self.post_json(&self.model_url(TTS_MODEL, "generateContent"), &payload)?;
        let parts = content_parts(&answer, "audio data")?;
        first_inline_data(&parts, "audio/").ok_or(GenError::TransientNoData {
            what: "audio data".to_string(),
        })
    }
}

impl VideoBackend for GeminiClient {
    fn submit(&self, request: &VideoRequest) -> Result<OperationHandle, GenError> {
        let mut instance = Map::new();
        instance.insert("prompt".to_string(), Value::String(request.prompt.clone()));
        if let Some(seed) = &request.seed_image {
            instance.insert(
                "image".to_string(),
                json!({
                    "bytesBase64Encoded": BASE64.encode(&seed.bytes),
                    "mimeType": seed.mime_type,
                }),
            );
        }
        let payload = json!({
            "instances": [Value::Object(instance)],
            "parameters": {
                "aspectRatio": request.aspect_ratio.veo_ratio(),
                "resolution": request.resolution,
                "sampleCount": 1,
            },
        });

        let answer = self.post_json(&self.model_url(VIDEO_MODEL, "predictLongRunning"), &payload)?;
        let handle = parse_operation(&answer);
        if handle.name.is_empty() && !handle.done {
            return Err(GenError::InvalidResponse {
                detail: "submit answer carried no operation name".to_string(),
            });
        }
        Ok(handle)
    }

    fn poll(&self, handle: &OperationHandle) -> Result<OperationHandle, GenError> {
        let url = format!("{}/{}", self.config.api_base, handle.name);
        let answer = self.get_json(&url)?;
        Ok(parse_operation(&answer))
    }

    fn fetch(&self, uri: &str) -> Result<Artifact, GenError> {
        // The artifact URI wants the API key as a query parameter.
        let separator = if uri.contains('?') { '&' } else { '?' };
        let url = format!("{uri}{separator}key={}", self.config.api_key);
        let response = self.http.get(&url).send().map_err(|err| GenError::Transport {
            detail: format!("artifact download failed: {err}"),
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(GenError::Transport {
                detail: format!("artifact download failed (HTTP {})", status.as_u16()),
            });
        }
        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .map_err(|err| GenError::Transport {
                detail: format!("artifact body read failed: {err}"),
            })?
            .to_vec();
        if bytes.is_empty() {
            return Err(GenError::MissingArtifact);
        }
        Ok(Artifact { bytes, mime_type })
    }
}

// ---- response normalization ----

fn read_json_response(response: reqwest::blocking::Response) -> Result<Value, GenError> {
    let status = response.status().as_u16();
    let body = response.text().map_err(|err| GenError::Transport {
        detail: format!("response body read failed: {err}"),
    })?;
    let payload: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
    if !(200..300).contains(&status) {
        return Err(classify_http_failure(status, &payload, &body));
    }
    Ok(payload)
}

/// Map a non-2xx answer into the taxonomy. Quota limits are recognized
/// from an explicit marker table; 5xx is transport (retryable); everything
/// else is an invalid request.
fn classify_http_failure(status: u16, payload: &Value, body: &str) -> GenError {
    if let Some(detail) = quota_detail(status, payload) {
        return GenError::QuotaExceeded { detail };
    }
    if status >= 500 {
        return GenError::Transport {
            detail: format!("HTTP {status}: {}", truncate_text(body, 256)),
        };
    }
    GenError::InvalidResponse {
        detail: format!("HTTP {status}: {}", truncate_text(body, 256)),
    }
}

/// Marker table for rate/billing exhaustion.
fn quota_detail(status: u16, payload: &Value) -> Option<String> {
    if status == 429 {
        return Some("HTTP 429".to_string());
    }
    let error = payload.get("error")?;
    if error.get("status").and_then(Value::as_str) == Some("RESOURCE_EXHAUSTED") {
        return Some("RESOURCE_EXHAUSTED".to_string());
    }
    if error.get("code").and_then(Value::as_u64) == Some(429) {
        return Some("error code 429".to_string());
    }
    None
}

/// Pull the first candidate's content parts out of a `generateContent`
/// answer, surfacing safety refusals and empty payloads as classified
/// errors.
fn content_parts(payload: &Value, what: &str) -> Result<Vec<Value>, GenError> {
    if let Some(reason) = payload
        .get("promptFeedback")
        .and_then(|feedback| feedback.get("blockReason"))
        .and_then(Value::as_str)
    {
        return Err(GenError::ContentPolicyBlock {
            reason: reason.to_string(),
        });
    }
    let Some(candidate) = payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|rows| rows.first())
    else {
        return Err(GenError::TransientNoData {
            what: what.to_string(),
        });
    };
    if let Some(reason) = candidate.get("finishReason").and_then(Value::as_str) {
        if SAFETY_FINISH_REASONS.contains(&reason) {
            return Err(GenError::ContentPolicyBlock {
                reason: reason.to_string(),
            });
        }
    }
    let parts = candidate
        .get("content")
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    if parts.is_empty() {
        return Err(GenError::TransientNoData {
            what: what.to_string(),
        });
    }
    Ok(parts)
}

fn first_text(parts: &[Value]) -> Option<String> {
    parts
        .iter()
        .find_map(|part| part.get("text").and_then(Value::as_str))
        .map(str::to_string)
}

fn first_inline_data(parts: &[Value], mime_prefix: &str) -> Option<Artifact> {
    for part in parts {
        let Some(inline) = part
            .get("inlineData")
            .or_else(|| part.get("inline_data"))
            .and_then(Value::as_object)
        else {
            continue;
        };
        let mime_type = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if !mime_prefix.is_empty() && !mime_type.starts_with(mime_prefix) {
            continue;
        }
        let data = inline.get("data").and_then(Value::as_str).unwrap_or_default();
        if data.is_empty() {
            continue;
        }
        if let Ok(bytes) = BASE64.decode(data.as_bytes()) {
            return Some(Artifact {
                bytes,
                mime_type: Some(mime_type.to_string()),
            });
        }
    }
    None
}

/// Normalize an operation payload into a handle. The provider has shipped
/// the result under several container spellings; all of them are mapped
/// here and nowhere else.
fn parse_operation(payload: &Value) -> OperationHandle {
    let name = payload
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let done = payload.get("done").and_then(Value::as_bool).unwrap_or(false);
    let error = payload.get("error").map(|error| {
        error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string())
    });
    OperationHandle {
        name,
        done,
        error,
        result_uri: extract_video_uri(payload),
    }
}

fn extract_video_uri(payload: &Value) -> Option<String> {
    for container_key in ["response", "result"] {
        let Some(container) = payload.get(container_key) else {
            continue;
        };
        let samples = container
            .get("generateVideoResponse")
            .and_then(|inner| inner.get("generatedSamples"))
            .and_then(Value::as_array)
            .or_else(|| container.get("generatedVideos").and_then(Value::as_array));
        let uri = samples
            .and_then(|rows| rows.first())
            .and_then(|row| row.get("video"))
            .and_then(|video| video.get("uri"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|uri| !uri.is_empty());
        if let Some(uri) = uri {
            return Some(uri.to_string());
        }
    }
    None
}

// ---- batch pack generation ----

/// Provider seam for reference-styled image generation.
pub trait ImageBackend {
    fn generate_styled(&self, prompt: &str, reference: &InlineImage) -> Result<Artifact, GenError>;
}

impl ImageBackend for GeminiClient {
    fn generate_styled(&self, prompt: &str, reference: &InlineImage) -> Result<Artifact, GenError> {
        self.generate_image(prompt, std::slice::from_ref(reference))
    }
}

#[derive(Debug, Clone)]
pub struct PackPlan {
    pub product_name: String,
    pub context: FoodContext,
    pub styles: Vec<FoodStyle>,
    pub variants_per_style: usize,
    pub inter_call_delay: Duration,
    pub retry: RetryPolicy,
}

impl PackPlan {
    pub fn new(product_name: impl Into<String>, context: FoodContext) -> Self {
        Self {
            product_name: product_name.into(),
            context,
            styles: FoodStyle::PACK.to_vec(),
            variants_per_style: 4,
            inter_call_delay: Duration::from_millis(500),
            retry: RetryPolicy::fixed_doubling(3),
        }
    }
}

/// Generate the full pack: every style sequentially, `variants_per_style`
/// slots each, a fixed pause between calls.
///
/// Slot writes are keyed by `(style, index)`; a failed variant leaves
/// `None` in its slot and the batch carries on, so sibling results survive
/// any one failure. Only cancellation aborts the whole pack.
pub fn generate_pack(
    backend: &dyn ImageBackend,
    plan: &PackPlan,
    reference: &InlineImage,
    ticker: &dyn Ticker,
    cancel: &CancelToken,
    log: &RunLog,
) -> Result<IndexMap<String, Vec<Option<Artifact>>>, GenError> {
    let mut results: IndexMap<String, Vec<Option<Artifact>>> = IndexMap::new();

    for style in &plan.styles {
        let base_prompt = build_style_prompt(*style, &plan.product_name, &plan.context)
            .map_err(|err| GenError::InvalidResponse {
                detail: format!("style template defect: {err}"),
            })?;
        let slots = results
            .entry(style.name().to_string())
            .or_insert_with(|| Vec::with_capacity(plan.variants_per_style));

        for index in 0..plan.variants_per_style {
            if cancel.is_cancelled() {
                return Err(GenError::Cancelled);
            }
            let variant_prompt = format!("{base_prompt} --v {index}");
            let outcome = execute(&plan.retry, ticker, cancel, |_| {
                backend.generate_styled(&variant_prompt, reference)
            });
            match outcome {
                Ok(artifact) => {
                    log.emit(
                        "variant_ok",
                        &[("style", json!(style.name())), ("index", json!(index))],
                    )
                    .ok();
                    slots.push(Some(artifact));
                }
                Err(GenError::Cancelled) => return Err(GenError::Cancelled),
                Err(err) => {
                    log.emit(
                        "variant_failed",
                        &[
                            ("style", json!(style.name())),
                            ("index", json!(index)),
                            ("error", json!(err.to_string())),
                        ],
                    )
                    .ok();
                    slots.push(None);
                }
            }
            ticker.sleep(plan.inter_call_delay);
        }
    }
    Ok(results)
}

// ---- media utilities ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AspectRatio {
    #[default]
    Original,
    /// 1:1
    Square,
    /// 4:5 portrait feed
    PortraitFeed,
    /// 16:9
    Landscape,
    /// 9:16 story
    Story,
}

impl AspectRatio {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "original" | "asli" => Some(AspectRatio::Original),
            "1:1" | "square" => Some(AspectRatio::Square),
            "4:5" => Some(AspectRatio::PortraitFeed),
            "16:9" | "landscape" => Some(AspectRatio::Landscape),
            "9:16" | "story" | "portrait" => Some(AspectRatio::Story),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Original => "Original",
            AspectRatio::Square => "1:1",
            AspectRatio::PortraitFeed => "4:5",
            AspectRatio::Landscape => "16:9",
            AspectRatio::Story => "9:16",
        }
    }

    fn ratio(&self) -> Option<(u32, u32)> {
        match self {
            AspectRatio::Original => None,
            AspectRatio::Square => Some((1, 1)),
            AspectRatio::PortraitFeed => Some((4, 5)),
            AspectRatio::Landscape => Some((16, 9)),
            AspectRatio::Story => Some((9, 16)),
        }
    }

    /// The video endpoint only accepts landscape and story framing.
    pub fn veo_ratio(&self) -> &'static str {
        match self {
            AspectRatio::Story => "9:16",
            _ => "16:9",
        }
    }

    /// Nearest ratio the Imagen predict endpoint accepts.
    pub fn imagen_ratio(&self) -> &'static str {
        match self {
            AspectRatio::Original | AspectRatio::Square => "1:1",
            AspectRatio::PortraitFeed => "3:4",
            AspectRatio::Landscape => "16:9",
            AspectRatio::Story => "9:16",
        }
    }
}

/// Center-crop `bytes` to the requested ratio and re-encode as JPEG.
/// `Original` passes the input through untouched.
pub fn crop_to_ratio(bytes: &[u8], ratio: AspectRatio) -> anyhow::Result<Vec<u8>> {
    let Some((ratio_w, ratio_h)) = ratio.ratio() else {
        return Ok(bytes.to_vec());
    };
    let img = image::load_from_memory(bytes).context("failed decoding image for crop")?;
    let (width, height) = img.dimensions();
    let target = ratio_w as f64 / ratio_h as f64;
    let current = width as f64 / height as f64;

    let (crop_w, crop_h) = if current > target {
        ((height as f64 * target).round() as u32, height)
    } else {
        (width, (width as f64 / target).round() as u32)
    };
    let crop_w = crop_w.clamp(1, width);
    let crop_h = crop_h.clamp(1, height);
    let x = (width - crop_w) / 2;
    let y = (height - crop_h) / 2;

    let cropped = img.crop_imm(x, y, crop_w, crop_h);
    encode_jpeg(&cropped, 90)
}

/// Scale down to at most `max_width` pixels wide and re-encode as JPEG at
/// quality 80. Images already narrow enough are only re-encoded.
pub fn compress_to_width(bytes: &[u8], max_width: u32) -> anyhow::Result<Vec<u8>> {
    let img = image::load_from_memory(bytes).context("failed decoding image for compression")?;
    let img = if img.width() > max_width {
        let scaled_height =
            ((img.height() as f64) * (max_width as f64 / img.width() as f64)).round() as u32;
        img.resize_exact(max_width, scaled_height.max(1), FilterType::Triangle)
    } else {
        img
    };
    encode_jpeg(&img, 80)
}

fn encode_jpeg(img: &image::DynamicImage, quality: u8) -> anyhow::Result<Vec<u8>> {
    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, quality);
    img.to_rgb8()
        .write_with_encoder(encoder)
        .context("jpeg encode failed")?;
    Ok(out)
}

/// Wrap little-endian 16-bit mono PCM in a WAV container.
pub fn wav_from_pcm16(pcm: &[u8], sample_rate: u32) -> Vec<u8> {
    const NUM_CHANNELS: u16 = 1;
    const BYTES_PER_SAMPLE: u16 = 2;
    let block_align = NUM_CHANNELS * BYTES_PER_SAMPLE;
    let byte_rate = sample_rate * block_align as u32;
    let data_len = pcm.len() as u32;

    let mut out = Vec::with_capacity(44 + pcm.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM format tag
    out.extend_from_slice(&NUM_CHANNELS.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&(BYTES_PER_SAMPLE * 8).to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(pcm);
    out
}

/// Write an artifact plus a JSON sidecar carrying checksum, size, mime and
/// the producing prompt. Inline bytes are never duplicated into the
/// sidecar.
pub fn save_artifact(
    dir: &Path,
    stem: &str,
    artifact: &Artifact,
    prompt: &str,
) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let extension = extension_from_mime(artifact.mime_type.as_deref());
    let artifact_path = dir.join(format!("{stem}.{extension}"));
    fs::write(&artifact_path, &artifact.bytes)
        .with_context(|| format!("failed to write {}", artifact_path.display()))?;

    let digest = Sha256::digest(&artifact.bytes);
    let sidecar = json!({
        "sha256": hex::encode(digest),
        "bytes": artifact.bytes.len(),
        "mime_type": artifact.mime_type,
        "prompt": prompt,
        "created_at": chrono::Utc::now().to_rfc3339(),
    });
    let sidecar_path = dir.join(format!("{stem}.json"));
    fs::write(&sidecar_path, serde_json::to_string_pretty(&sidecar)?)
        .with_context(|| format!("failed to write {}", sidecar_path.display()))?;
    Ok(artifact_path)
}

fn extension_from_mime(mime_type: Option<&str>) -> &'static str {
    match mime_type.unwrap_or_default() {
        mime if mime.starts_with("image/png") => "png",
        mime if mime.starts_with("image/webp") => "webp",
        mime if mime.starts_with("image/") => "jpg",
        mime if mime.starts_with("video/") => "mp4",
        mime if mime.starts_with("audio/wav") || mime.starts_with("audio/x-wav") => "wav",
        mime if mime.starts_with("audio/") => "pcm",
        _ => "bin",
    }
}

fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{truncated}...")
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use rahyang_contracts::runlog::RunLog;

    use super::*;

    struct FakeTicker {
        base: Instant,
        offset: Cell<Duration>,
        slept: RefCell<Vec<Duration>>,
    }

    impl FakeTicker {
        fn new() -> Self {
            Self {
                base: Instant::now(),
                offset: Cell::new(Duration::ZERO),
                slept: RefCell::new(Vec::new()),
            }
        }

        fn slept(&self) -> Vec<Duration> {
            self.slept.borrow().clone()
        }
    }

    impl Ticker for FakeTicker {
        fn sleep(&self, duration: Duration) {
            self.slept.borrow_mut().push(duration);
            self.offset.set(self.offset.get() + duration);
        }

        fn now(&self) -> Instant {
            self.base + self.offset.get()
        }
    }

    fn artifact() -> Artifact {
        Artifact {
            bytes: b"bytes".to_vec(),
            mime_type: Some("image/jpeg".to_string()),
        }
    }

    #[test]
    fn executor_retries_up_to_the_attempt_bound() {
        let ticker = FakeTicker::new();
        let cancel = CancelToken::new();
        let policy = RetryPolicy::fixed_doubling(3);
        let mut calls = 0;
        let outcome: Result<Artifact, GenError> = execute(&policy, &ticker, &cancel, |_| {
            calls += 1;
            Err(GenError::TransientNoData {
                what: "image data".to_string(),
            })
        });
        assert!(matches!(outcome, Err(GenError::TransientNoData { .. })));
        assert_eq!(calls, 3);
        assert_eq!(
            ticker.slept(),
            vec![Duration::from_secs(2), Duration::from_secs(4)]
        );
    }

    #[test]
    fn executor_short_circuits_on_terminal_error() {
        let ticker = FakeTicker::new();
        let cancel = CancelToken::new();
        let policy = RetryPolicy::fixed_doubling(3);
        let mut calls = 0;
        let outcome: Result<Artifact, GenError> = execute(&policy, &ticker, &cancel, |_| {
            calls += 1;
            Err(GenError::ContentPolicyBlock {
                reason: "SAFETY".to_string(),
            })
        });
        assert!(matches!(outcome, Err(GenError::ContentPolicyBlock { .. })));
        assert_eq!(calls, 1);
        assert!(ticker.slept().is_empty());
    }

    #[test]
    fn executor_returns_immediately_on_mid_schedule_success() {
        let ticker = FakeTicker::new();
        let cancel = CancelToken::new();
        let policy = RetryPolicy::fixed_doubling(4);
        let mut calls = 0;
        let outcome = execute(&policy, &ticker, &cancel, |attempt| {
            calls += 1;
            if attempt < 2 {
                Err(GenError::Transport {
                    detail: "reset".to_string(),
                })
            } else {
                Ok(artifact())
            }
        });
        assert!(outcome.is_ok());
        assert_eq!(calls, 2);
        assert_eq!(ticker.slept(), vec![Duration::from_secs(2)]);
    }

    #[test]
    fn executor_respects_cancellation() {
        let ticker = FakeTicker::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        let policy = RetryPolicy::fixed_doubling(3);
        let mut calls = 0;
        let outcome: Result<Artifact, GenError> = execute(&policy, &ticker, &cancel, |_| {
            calls += 1;
            Ok(artifact())
        });
        assert!(matches!(outcome, Err(GenError::Cancelled)));
        assert_eq!(calls, 0);
    }

    struct FakeVideoBackend {
        polls_until_done: usize,
        final_error: Option<String>,
        final_uri: Option<String>,
        polls: Cell<usize>,
        fetches: Cell<usize>,
    }

    impl FakeVideoBackend {
        fn succeeding_after(polls: usize) -> Self {
            Self {
                polls_until_done: polls,
                final_error: None,
                final_uri: Some("https://example.test/video.mp4".to_string()),
                polls: Cell::new(0),
                fetches: Cell::new(0),
            }
        }
    }

    impl VideoBackend for FakeVideoBackend {
        fn submit(&self, _request: &VideoRequest) -> Result<OperationHandle, GenError> {
            Ok(OperationHandle {
                name: "operations/op-1".to_string(),
                done: false,
                error: None,
                result_uri: None,
            })
        }

        fn poll(&self, handle: &OperationHandle) -> Result<OperationHandle, GenError> {
            let count = self.polls.get() + 1;
            self.polls.set(count);
            if count < self.polls_until_done {
                return Ok(OperationHandle {
                    done: false,
                    ..handle.clone()
                });
            }
            Ok(OperationHandle {
                name: handle.name.clone(),
                done: true,
                error: self.final_error.clone(),
                result_uri: self.final_uri.clone(),
            })
        }

        fn fetch(&self, _uri: &str) -> Result<Artifact, GenError> {
            self.fetches.set(self.fetches.get() + 1);
            Ok(Artifact {
                bytes: b"mp4".to_vec(),
                mime_type: Some("video/mp4".to_string()),
            })
        }
    }

    #[test]
    fn poller_issues_exact_status_and_fetch_calls() {
        let backend = FakeVideoBackend::succeeding_after(3);
        let ticker = FakeTicker::new();
        let mut job = VideoJob::new(
            &backend,
            PollConfig::default(),
            &ticker,
            CancelToken::new(),
        );
        let artifact = job.run(&VideoRequest::new("a scene")).unwrap();
        assert_eq!(artifact.mime_type.as_deref(), Some("video/mp4"));
        assert_eq!(backend.polls.get(), 3);
        assert_eq!(backend.fetches.get(), 1);
        assert_eq!(job.state(), JobState::Succeeded);
        assert_eq!(ticker.slept().len(), 3);
    }

    #[test]
    fn poller_times_out_with_distinct_error() {
        let backend = FakeVideoBackend::succeeding_after(usize::MAX);
        let ticker = FakeTicker::new();
        let config = PollConfig {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(12),
        };
        let mut job = VideoJob::new(&backend, config, &ticker, CancelToken::new());
        let outcome = job.run(&VideoRequest::new("a scene"));
        assert!(matches!(outcome, Err(GenError::TimedOut { .. })));
        assert_eq!(job.state(), JobState::Failed);
        // 0s, 5s and 10s polls run; the 15s check trips the bound.
        assert_eq!(backend.polls.get(), 3);
        assert_eq!(backend.fetches.get(), 0);
    }

    #[test]
    fn poller_surfaces_provider_reported_failure() {
        let backend = FakeVideoBackend {
            final_error: Some("internal error".to_string()),
            final_uri: None,
            ..FakeVideoBackend::succeeding_after(1)
        };
        let ticker = FakeTicker::new();
        let mut job = VideoJob::new(
            &backend,
            PollConfig::default(),
            &ticker,
            CancelToken::new(),
        );
        let outcome = job.run(&VideoRequest::new("a scene"));
        assert_eq!(
            outcome,
            Err(GenError::OperationFailed {
                message: "internal error".to_string()
            })
        );
        assert_eq!(backend.fetches.get(), 0);
    }

    #[test]
    fn poller_reports_missing_artifact_distinctly() {
        let backend = FakeVideoBackend {
            final_uri: None,
            ..FakeVideoBackend::succeeding_after(1)
        };
        let ticker = FakeTicker::new();
        let mut job = VideoJob::new(
            &backend,
            PollConfig::default(),
            &ticker,
            CancelToken::new(),
        );
        assert_eq!(
            job.run(&VideoRequest::new("a scene")),
            Err(GenError::MissingArtifact)
        );
    }

    #[test]
    fn poller_stops_on_cancellation() {
        let backend = FakeVideoBackend::succeeding_after(usize::MAX);
        let ticker = FakeTicker::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut job = VideoJob::new(&backend, PollConfig::default(), &ticker, cancel);
        assert_eq!(
            job.run(&VideoRequest::new("a scene")),
            Err(GenError::Cancelled)
        );
        assert_eq!(backend.polls.get(), 0);
    }

    struct FakeImageBackend {
        failing_call: usize,
        calls: Cell<usize>,
        prompts: RefCell<Vec<String>>,
    }

    impl ImageBackend for FakeImageBackend {
        fn generate_styled(
            &self,
            prompt: &str,
            _reference: &InlineImage,
        ) -> Result<Artifact, GenError> {
            let call = self.calls.get() + 1;
            self.calls.set(call);
            self.prompts.borrow_mut().push(prompt.to_string());
            if call == self.failing_call {
                return Err(GenError::ContentPolicyBlock {
                    reason: "SAFETY".to_string(),
                });
            }
            Ok(artifact())
        }
    }

    #[test]
    fn pack_keeps_slot_order_under_partial_failure() {
        let backend = FakeImageBackend {
            failing_call: 3,
            calls: Cell::new(0),
            prompts: RefCell::new(Vec::new()),
        };
        let temp = tempfile::tempdir().unwrap();
        let log = RunLog::new(temp.path().join("events.jsonl"), "job-1");
        let mut plan = PackPlan::new("Mie Goreng", FoodContext::default());
        plan.styles = vec![FoodStyle::CinematicCommercial];
        plan.retry = RetryPolicy::once();
        let ticker = FakeTicker::new();

        let results = generate_pack(
            &backend,
            &plan,
            &InlineImage::jpeg(b"ref".to_vec()),
            &ticker,
            &CancelToken::new(),
            &log,
        )
        .unwrap();

        let slots = &results["Cinematic Commercial"];
        assert_eq!(slots.len(), 4);
        assert!(slots[0].is_some());
        assert!(slots[1].is_some());
        assert!(slots[2].is_none());
        assert!(slots[3].is_some());

        let prompts = backend.prompts.borrow();
        assert!(prompts[0].ends_with("--v 0"));
        assert!(prompts[3].ends_with("--v 3"));

        let events = std::fs::read_to_string(log.path()).unwrap();
        assert!(events.contains("variant_failed"));
    }

    #[test]
    fn pack_aborts_only_on_cancellation() {
        struct CancellingBackend {
            cancel: CancelToken,
        }
        impl ImageBackend for CancellingBackend {
            fn generate_styled(
                &self,
                _prompt: &str,
                _reference: &InlineImage,
            ) -> Result<Artifact, GenError> {
                self.cancel.cancel();
                Ok(artifact())
            }
        }
        let cancel = CancelToken::new();
        let backend = CancellingBackend {
            cancel: cancel.clone(),
        };
        let temp = tempfile::tempdir().unwrap();
        let log = RunLog::new(temp.path().join("events.jsonl"), "job-1");
        let mut plan = PackPlan::new("Mie Goreng", FoodContext::default());
        plan.styles = vec![FoodStyle::CinematicCommercial];
        let ticker = FakeTicker::new();

        let outcome = generate_pack(
            &backend,
            &plan,
            &InlineImage::jpeg(b"ref".to_vec()),
            &ticker,
            &cancel,
            &log,
        );
        assert!(matches!(outcome, Err(GenError::Cancelled)));
    }

    #[test]
    fn quota_markers_map_to_quota_exceeded() {
        assert!(quota_detail(429, &Value::Null).is_some());
        assert!(quota_detail(
            400,
            &json!({ "error": { "status": "RESOURCE_EXHAUSTED" } })
        )
        .is_some());
        assert!(quota_detail(400, &json!({ "error": { "code": 429 } })).is_some());
        assert!(quota_detail(400, &json!({ "error": { "code": 500 } })).is_none());
        assert!(quota_detail(500, &Value::Null).is_none());

        let err = classify_http_failure(429, &Value::Null, "Too Many Requests");
        assert!(matches!(err, GenError::QuotaExceeded { .. }));
        let err = classify_http_failure(503, &Value::Null, "unavailable");
        assert!(matches!(err, GenError::Transport { .. }));
        let err = classify_http_failure(400, &Value::Null, "bad request");
        assert!(matches!(err, GenError::InvalidResponse { .. }));
    }

    #[test]
    fn safety_refusals_become_content_policy_blocks() {
        let blocked = json!({ "promptFeedback": { "blockReason": "PROHIBITED_CONTENT" } });
        assert!(matches!(
            content_parts(&blocked, "image data"),
            Err(GenError::ContentPolicyBlock { .. })
        ));

        let finish = json!({ "candidates": [{ "finishReason": "SAFETY" }] });
        assert!(matches!(
            content_parts(&finish, "image data"),
            Err(GenError::ContentPolicyBlock { .. })
        ));

        let empty = json!({ "candidates": [] });
        assert!(matches!(
            content_parts(&empty, "image data"),
            Err(GenError::TransientNoData { .. })
        ));

        let ok = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "answer" }] },
                "finishReason": "STOP",
            }]
        });
        let parts = content_parts(&ok, "text data").unwrap();
        assert_eq!(first_text(&parts).as_deref(), Some("answer"));
    }

    #[test]
    fn inline_data_extraction_filters_by_mime_prefix() {
        let parts = vec![
            json!({ "text": "caption" }),
            json!({ "inlineData": { "mimeType": "audio/L16", "data": BASE64.encode(b"pcm") } }),
            json!({ "inlineData": { "mimeType": "image/png", "data": BASE64.encode(b"png") } }),
        ];
        let image = first_inline_data(&parts, "image/").unwrap();
        assert_eq!(image.bytes, b"png");
        assert_eq!(image.mime_type.as_deref(), Some("image/png"));
        let audio = first_inline_data(&parts, "audio/").unwrap();
        assert_eq!(audio.bytes, b"pcm");
        assert!(first_inline_data(&parts, "video/").is_none());
    }

    #[test]
    fn operation_parsing_normalizes_both_result_shapes() {
        let pending = json!({ "name": "operations/op-9" });
        let handle = parse_operation(&pending);
        assert_eq!(handle.name, "operations/op-9");
        assert!(!handle.done);
        assert!(handle.result_uri.is_none());

        let veo_shape = json!({
            "name": "operations/op-9",
            "done": true,
            "response": {
                "generateVideoResponse": {
                    "generatedSamples": [{ "video": { "uri": "https://files.test/a.mp4" } }]
                }
            }
        });
        assert_eq!(
            parse_operation(&veo_shape).result_uri.as_deref(),
            Some("https://files.test/a.mp4")
        );

        let sdk_shape = json!({
            "done": true,
            "result": { "generatedVideos": [{ "video": { "uri": "https://files.test/b.mp4" } }] }
        });
        assert_eq!(
            parse_operation(&sdk_shape).result_uri.as_deref(),
            Some("https://files.test/b.mp4")
        );

        let failed = json!({ "done": true, "error": { "message": "quota burned" } });
        assert_eq!(parse_operation(&failed).error.as_deref(), Some("quota burned"));
    }

    #[test]
    fn wav_container_header_matches_pcm_payload() {
        let pcm: Vec<u8> = (0..8u8).collect();
        let wav = wav_from_pcm16(&pcm, TTS_SAMPLE_RATE);
        assert_eq!(wav.len(), 44 + 8);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes(wav[4..8].try_into().unwrap()), 36 + 8);
        assert_eq!(&wav[8..12], b"WAVE");
        // channels
        assert_eq!(u16::from_le_bytes(wav[22..24].try_into().unwrap()), 1);
        // sample rate and byte rate
        assert_eq!(
            u32::from_le_bytes(wav[24..28].try_into().unwrap()),
            TTS_SAMPLE_RATE
        );
        assert_eq!(
            u32::from_le_bytes(wav[28..32].try_into().unwrap()),
            TTS_SAMPLE_RATE * 2
        );
        // bits per sample and data length
        assert_eq!(u16::from_le_bytes(wav[34..36].try_into().unwrap()), 16);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32::from_le_bytes(wav[40..44].try_into().unwrap()), 8);
    }

    #[test]
    fn aspect_ratio_parse_and_veo_clamp() {
        assert_eq!(AspectRatio::parse("9:16"), Some(AspectRatio::Story));
        assert_eq!(AspectRatio::parse("Original"), Some(AspectRatio::Original));
        assert_eq!(AspectRatio::parse("nope"), None);
        assert_eq!(AspectRatio::Story.veo_ratio(), "9:16");
        assert_eq!(AspectRatio::Square.veo_ratio(), "16:9");
        assert_eq!(AspectRatio::PortraitFeed.veo_ratio(), "16:9");
        assert_eq!(AspectRatio::PortraitFeed.imagen_ratio(), "3:4");
        assert_eq!(AspectRatio::Original.imagen_ratio(), "1:1");
    }

    fn png_fixture(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([120, 40, 200]));
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn crop_centers_to_requested_ratio() {
        let wide = png_fixture(100, 50);
        let square = crop_to_ratio(&wide, AspectRatio::Square).unwrap();
        let decoded = image::load_from_memory(&square).unwrap();
        assert_eq!(decoded.dimensions(), (50, 50));

        let story = crop_to_ratio(&wide, AspectRatio::Story).unwrap();
        let decoded = image::load_from_memory(&story).unwrap();
        let (width, height) = decoded.dimensions();
        assert_eq!(height, 50);
        assert!((width as i64 - 28).abs() <= 1, "width was {width}");

        let untouched = crop_to_ratio(&wide, AspectRatio::Original).unwrap();
        assert_eq!(untouched, wide);
    }

    #[test]
    fn compression_caps_width_and_keeps_proportions() {
        let big = png_fixture(1600, 400);
        let compressed = compress_to_width(&big, 800).unwrap();
        let decoded = image::load_from_memory(&compressed).unwrap();
        assert_eq!(decoded.dimensions(), (800, 200));

        let small = png_fixture(300, 300);
        let unchanged = compress_to_width(&small, 800).unwrap();
        let decoded = image::load_from_memory(&unchanged).unwrap();
        assert_eq!(decoded.dimensions(), (300, 300));
    }

    #[test]
    fn saved_artifacts_carry_checksum_sidecars() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let artifact = Artifact {
            bytes: b"payload".to_vec(),
            mime_type: Some("image/png".to_string()),
        };
        let path = save_artifact(temp.path(), "poster-00", &artifact, "a prompt")?;
        assert!(path.ends_with("poster-00.png"));
        assert_eq!(fs::read(&path)?, b"payload");

        let sidecar: Value =
            serde_json::from_str(&fs::read_to_string(temp.path().join("poster-00.json"))?)?;
        assert_eq!(sidecar["bytes"], json!(7));
        assert_eq!(sidecar["prompt"], json!("a prompt"));
        assert_eq!(
            sidecar["sha256"],
            json!(hex::encode(Sha256::digest(b"payload")))
        );
        Ok(())
    }

    #[test]
    fn extension_mapping_covers_artifact_kinds() {
        assert_eq!(extension_from_mime(Some("image/jpeg")), "jpg");
        assert_eq!(extension_from_mime(Some("image/png")), "png");
        assert_eq!(extension_from_mime(Some("video/mp4")), "mp4");
        assert_eq!(extension_from_mime(Some("audio/L16;rate=24000")), "pcm");
        assert_eq!(extension_from_mime(Some("audio/wav")), "wav");
        assert_eq!(extension_from_mime(None), "bin");
    }
}
