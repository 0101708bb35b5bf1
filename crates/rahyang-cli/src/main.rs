use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand};
use rahyang_contracts::accounts::{Role, UserAccount, UserStore};
use rahyang_contracts::food::{food_analysis_prompt, video_context_prompt, FoodContext, FoodStyle};
use rahyang_contracts::retry::RetryPolicy;
use rahyang_contracts::runlog::RunLog;
use rahyang_contracts::scenes::{
    self, character_analysis_prompt, parse_scenes, scene_preview_prompt, scene_video_prompt,
    story_prompt, CharacterProfile, SceneRecord, StoryMode,
};
use rahyang_contracts::veo::{Subject, VeoPromptInputs, VEO_FIELDS};
use rahyang_contracts::voices::{filter_voices, find_voice};
use rahyang_engine::{
    compress_to_width, crop_to_ratio, execute, generate_pack, save_artifact, wav_from_pcm16,
    AspectRatio, CancelToken, ClientConfig, GeminiClient, InlineImage, PackPlan, PollConfig,
    SystemTicker, VideoJob, VideoRequest, TTS_SAMPLE_RATE,
};
use serde_json::json;

#[derive(Debug, Parser)]
#[command(name = "rahyang", version, about = "Rahyang content generation toolkit")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate the full promo pack for a product photo.
    FoodPack(FoodPackArgs),
    /// Write a video concept (visual prompt + script) for one pack style.
    FoodScript(FoodScriptArgs),
    /// Generate a single photorealistic character portrait.
    Character(CharacterArgs),
    /// Generate or extend a storyboard with a consistency-locked character.
    Storyboard(StoryboardArgs),
    /// Render a still preview image for one storyboard scene.
    SceneImage(SceneImageArgs),
    /// Render a video for one storyboard scene from its preview image.
    SceneVideo(SceneVideoArgs),
    /// Assemble Veo prompts from structured inputs without calling any API.
    VeoPrompt(VeoPromptArgs),
    /// Synthesize speech with a prebuilt voice.
    Tts(TtsArgs),
    /// List the voice catalog.
    Voices(VoicesArgs),
    /// Manage the user directory.
    Users(UsersArgs),
}

#[derive(Debug, Parser)]
struct FoodPackArgs {
    /// Product photo used as the style reference.
    #[arg(long)]
    image: PathBuf,
    /// Product name or concept description.
    #[arg(long)]
    name: String,
    #[arg(long, default_value = "Original")]
    ratio: String,
    #[arg(long, default_value_t = 4)]
    variants: usize,
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Parser)]
struct FoodScriptArgs {
    /// Product name.
    #[arg(long)]
    name: String,
    /// Pack style the concept is written for.
    #[arg(long, default_value = "Cinematic Commercial")]
    style: String,
    #[arg(long, default_value = "Delicious")]
    flavor: String,
}

#[derive(Debug, Parser)]
struct CharacterArgs {
    /// Character description.
    #[arg(long)]
    prompt: String,
    /// Extra edit instructions appended to the base prompt.
    #[arg(long)]
    edit: Option<String>,
    #[arg(long, default_value = "front view, looking at camera")]
    pose: String,
    #[arg(long, default_value = "1:1")]
    ratio: String,
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Parser)]
struct StoryboardArgs {
    /// Story title.
    #[arg(long)]
    title: String,
    /// Analyze this photo into the locked character sheet.
    #[arg(long)]
    character_image: Option<PathBuf>,
    #[arg(long, default_value = "Budi")]
    name: String,
    #[arg(
        long,
        default_value = "Anak kecil Indonesia, rambut hitam pendek, kulit sawo matang, wajah polos"
    )]
    appearance: String,
    #[arg(long, default_value = "Kaos merah polos")]
    outfit_top: String,
    #[arg(long, default_value = "Celana pendek biru jeans")]
    outfit_bottom: String,
    #[arg(long, default_value = "3D Disney Pixar Style")]
    style: String,
    /// initial, next or closing.
    #[arg(long, default_value = "initial")]
    mode: String,
    /// Existing scenes file to extend (next/closing modes).
    #[arg(long)]
    scenes_file: Option<PathBuf>,
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Parser)]
struct SceneImageArgs {
    #[arg(long)]
    scenes_file: PathBuf,
    /// Zero-based scene index.
    #[arg(long)]
    index: usize,
    #[arg(long, default_value = "3D Disney Pixar Style")]
    style: String,
    #[arg(long, default_value = "16:9")]
    ratio: String,
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Parser)]
struct SceneVideoArgs {
    #[arg(long)]
    scenes_file: PathBuf,
    /// Zero-based scene index.
    #[arg(long)]
    index: usize,
    /// Scene preview image used as the seed frame.
    #[arg(long)]
    image: PathBuf,
    #[arg(long, default_value = "3D Disney Pixar Style")]
    style: String,
    #[arg(long, default_value = "16:9")]
    ratio: String,
    /// Seconds between status polls.
    #[arg(long, default_value_t = 5)]
    poll_interval: u64,
    /// Maximum seconds to wait before giving up on the job.
    #[arg(long, default_value_t = 600)]
    timeout: u64,
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Parser)]
struct VeoPromptArgs {
    /// Subject description; repeat for multiple subjects.
    #[arg(long = "subject")]
    subjects: Vec<String>,
    /// Dialogue line for the subject at the same position.
    #[arg(long = "dialogue")]
    dialogues: Vec<String>,
    #[arg(long)]
    action: Option<String>,
    #[arg(long)]
    expression: Option<String>,
    #[arg(long)]
    place: Option<String>,
    #[arg(long)]
    time: Option<String>,
    #[arg(long)]
    camera_motion: Option<String>,
    #[arg(long)]
    lighting: Option<String>,
    #[arg(long)]
    video_style: Option<String>,
    #[arg(long)]
    video_vibe: Option<String>,
    #[arg(long)]
    sound_music: Option<String>,
    #[arg(long)]
    additional_details: Option<String>,
    /// List the field keys and select options instead of assembling.
    #[arg(long)]
    list_fields: bool,
}

#[derive(Debug, Parser)]
struct TtsArgs {
    #[arg(long)]
    text: String,
    #[arg(long, default_value = "Achernar")]
    voice: String,
    /// Output WAV path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Parser)]
struct VoicesArgs {
    #[arg(long, default_value = "Semua")]
    gender: String,
    #[arg(long, default_value = "Semua")]
    style: String,
}

#[derive(Debug, Parser)]
struct UsersArgs {
    /// Path of the JSON user directory.
    #[arg(long, default_value = "rahyang-users.json")]
    store: PathBuf,
    #[command(subcommand)]
    action: UsersAction,
}

#[derive(Debug, Subcommand)]
enum UsersAction {
    List,
    Add {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        /// admin or user.
        #[arg(long, default_value = "user")]
        role: String,
        /// Expiry date (YYYY-MM-DD); omitted means non-expiring.
        #[arg(long)]
        expires: Option<String>,
    },
    Remove {
        #[arg(long)]
        username: String,
    },
    Expire {
        #[arg(long)]
        username: String,
        /// Expiry date (YYYY-MM-DD); omit to clear.
        #[arg(long)]
        date: Option<String>,
    },
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("rahyang error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::FoodPack(args) => run_food_pack(args),
        Command::FoodScript(args) => run_food_script(args),
        Command::Character(args) => run_character(args),
        Command::Storyboard(args) => run_storyboard(args),
        Command::SceneImage(args) => run_scene_image(args),
        Command::SceneVideo(args) => run_scene_video(args),
        Command::VeoPrompt(args) => run_veo_prompt(args),
        Command::Tts(args) => run_tts(args),
        Command::Voices(args) => run_voices(args),
        Command::Users(args) => run_users(args),
    }
}

fn client_from_env() -> Result<GeminiClient> {
    let Some(mut config) = ClientConfig::from_env() else {
        bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set");
    };
    if let Ok(base) = std::env::var("GEMINI_API_BASE") {
        if !base.trim().is_empty() {
            config = config.with_api_base(base);
        }
    }
    Ok(GeminiClient::new(config))
}

fn parse_ratio(label: &str) -> Result<AspectRatio> {
    AspectRatio::parse(label)
        .with_context(|| format!("unsupported ratio '{label}' (Original, 1:1, 4:5, 16:9, 9:16)"))
}

fn run_log(out: &Path) -> RunLog {
    RunLog::new(
        out.join("events.jsonl"),
        uuid::Uuid::new_v4().to_string(),
    )
}

fn style_slug(name: &str) -> String {
    name.to_ascii_lowercase().replace(' ', "-")
}

fn run_food_pack(args: FoodPackArgs) -> Result<i32> {
    let client = client_from_env()?;
    let ratio = parse_ratio(&args.ratio)?;
    let ticker = SystemTicker;
    let cancel = CancelToken::new();
    let log = run_log(&args.out);

    let raw = fs::read(&args.image)
        .with_context(|| format!("failed reading {}", args.image.display()))?;
    let compressed = compress_to_width(&raw, 800)?;
    let reference = InlineImage::jpeg(crop_to_ratio(&compressed, ratio)?);

    log.emit(
        "pack_started",
        &[("product", json!(args.name)), ("ratio", json!(ratio.as_str()))],
    )?;

    // Analysis failure falls back to the generic context; the pack still
    // renders.
    let context = execute(
        &RetryPolicy::linear(3, Duration::from_secs(2)),
        &ticker,
        &cancel,
        |_| client.generate_text(&food_analysis_prompt(), Some(&reference), true),
    )
    .ok()
    .and_then(|answer| FoodContext::from_model_json(&answer))
    .unwrap_or_else(|| {
        let _ = log.record("analysis_fallback");
        FoodContext::default()
    });
    log.emit("context_ready", &[("context", json!(context))])?;

    let mut plan = PackPlan::new(&args.name, context.clone());
    plan.variants_per_style = args.variants.max(1);
    let results = generate_pack(&client, &plan, &reference, &ticker, &cancel, &log)
        .map_err(anyhow::Error::new)?;

    let mut manifest = BTreeMap::new();
    for (style_name, slots) in &results {
        let style_dir = args.out.join(style_slug(style_name));
        let mut files = Vec::new();
        for (index, slot) in slots.iter().enumerate() {
            match slot {
                Some(artifact) => {
                    let path = save_artifact(
                        &style_dir,
                        &format!("variant-{index:02}"),
                        artifact,
                        &format!("{style_name} of {}", args.name),
                    )?;
                    files.push(json!(path.display().to_string()));
                }
                None => files.push(json!(null)),
            }
        }
        manifest.insert(style_name.clone(), files);
    }
    let manifest_path = args.out.join("pack.json");
    fs::write(
        &manifest_path,
        serde_json::to_string_pretty(&json!({
            "product": args.name,
            "context": context,
            "results": manifest,
        }))?,
    )?;
    log.record("pack_finished")?;
    println!("pack manifest written to {}", manifest_path.display());
    Ok(0)
}

fn run_food_script(args: FoodScriptArgs) -> Result<i32> {
    let style = FoodStyle::PACK
        .into_iter()
        .find(|style| style.name().eq_ignore_ascii_case(&args.style))
        .with_context(|| format!("unknown style '{}'", args.style))?;
    let client = client_from_env()?;
    let ticker = SystemTicker;
    let cancel = CancelToken::new();

    let prompt = video_context_prompt(style, &args.name, &args.flavor);
    let answer = execute(
        &RetryPolicy::linear(3, Duration::from_secs(2)),
        &ticker,
        &cancel,
        |_| client.generate_text(&prompt, None, true),
    )
    .map_err(anyhow::Error::new)?;
    let concept: serde_json::Value = serde_json::from_str(scenes::strip_code_fences(&answer))
        .context("concept model returned invalid JSON")?;

    let field = |key: &str| {
        concept
            .get(key)
            .and_then(serde_json::Value::as_str)
            .unwrap_or("")
            .to_string()
    };
    println!("=== Visual Prompt ===");
    println!("{}", field("visual"));
    println!();
    println!("=== Script ===");
    println!("{}", field("script"));
    Ok(0)
}

const REALISM_BOOST: &str = "photorealistic, hyper-realistic, 8k resolution, highly detailed \
texture, skin pores, cinematic lighting, raw photo, masterpiece, sharp focus, photography";

fn run_character(args: CharacterArgs) -> Result<i32> {
    let client = client_from_env()?;
    let ratio = parse_ratio(&args.ratio)?;
    let log = run_log(&args.out);

    let mut prompt = args.prompt.clone();
    if let Some(edit) = &args.edit {
        prompt = format!("{prompt}, {edit}");
    }
    let final_prompt = format!("{prompt}, {}, {REALISM_BOOST}", args.pose);

    log.emit("character_started", &[("prompt", json!(final_prompt))])?;
    let artifact = client
        .generate_imagen(&final_prompt, ratio.imagen_ratio())
        .map_err(anyhow::Error::new)?;
    let path = save_artifact(&args.out, "character", &artifact, &final_prompt)?;
    log.record("character_finished")?;
    println!("character written to {}", path.display());
    Ok(0)
}

fn load_scenes(path: &Path) -> Result<Vec<SceneRecord>> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed reading {}", path.display()))?;
    parse_scenes(&raw).with_context(|| format!("{} is not a scene file", path.display()))
}

fn write_scenes(path: &Path, scenes: &[SceneRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(scenes)?)
        .with_context(|| format!("failed writing {}", path.display()))
}

fn run_storyboard(args: StoryboardArgs) -> Result<i32> {
    let client = client_from_env()?;
    let ticker = SystemTicker;
    let cancel = CancelToken::new();
    let log = run_log(&args.out);

    let mode = match args.mode.as_str() {
        "initial" => StoryMode::Initial,
        "next" => StoryMode::Next,
        "closing" => StoryMode::Closing,
        other => bail!("unknown mode '{other}' (initial, next, closing)"),
    };

    let mut profile = CharacterProfile {
        name: args.name.clone(),
        appearance: args.appearance.clone(),
        outfit_top: args.outfit_top.clone(),
        outfit_bottom: args.outfit_bottom.clone(),
    };
    if let Some(image_path) = &args.character_image {
        let image = InlineImage::from_path(image_path)?;
        let answer = execute(
            &RetryPolicy::linear(3, Duration::from_secs(2)),
            &ticker,
            &cancel,
            |_| client.generate_text(&character_analysis_prompt(), Some(&image), true),
        )
        .map_err(anyhow::Error::new)
        .context("character analysis failed")?;
        let sheet: serde_json::Value =
            serde_json::from_str(scenes::strip_code_fences(&answer))
                .context("character analysis returned invalid JSON")?;
        let field = |key: &str, fallback: &str| {
            sheet
                .get(key)
                .and_then(serde_json::Value::as_str)
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .unwrap_or(fallback)
                .to_string()
        };
        profile.appearance = field("appearance", &profile.appearance);
        profile.outfit_top = field("outfit_top", &profile.outfit_top);
        profile.outfit_bottom = field("outfit_bottom", &profile.outfit_bottom);
        log.record("character_scanned")?;
    }

    let existing = match &args.scenes_file {
        Some(path) => load_scenes(path)?,
        None => Vec::new(),
    };
    if mode != StoryMode::Initial && existing.is_empty() {
        bail!("mode '{}' needs --scenes-file with existing scenes", args.mode);
    }

    let prompt = story_prompt(mode, &args.title, &profile, &args.style, &existing);
    log.emit("story_requested", &[("mode", json!(args.mode))])?;
    let answer = execute(&RetryPolicy::fixed_doubling(3), &ticker, &cancel, |_| {
        client.generate_text(&prompt, None, true)
    })
    .map_err(anyhow::Error::new)?;
    let generated = parse_scenes(&answer).context("story model returned unusable scenes")?;

    let mut scenes_out = existing;
    for scene in &generated {
        scenes_out.push(scenes::enforce(scene, &profile));
    }

    let scenes_path = args.out.join("scenes.json");
    write_scenes(&scenes_path, &scenes_out)?;
    fs::write(
        args.out.join("character.json"),
        serde_json::to_string_pretty(&profile)?,
    )?;
    log.emit(
        "story_finished",
        &[("scene_count", json!(scenes_out.len()))],
    )?;
    println!(
        "{} scenes written to {}",
        scenes_out.len(),
        scenes_path.display()
    );
    Ok(0)
}

fn scene_at(scenes: &[SceneRecord], index: usize) -> Result<&SceneRecord> {
    scenes.get(index).with_context(|| {
        format!(
            "scene index {index} out of range ({} scenes in file)",
            scenes.len()
        )
    })
}

fn run_scene_image(args: SceneImageArgs) -> Result<i32> {
    let client = client_from_env()?;
    let ratio = parse_ratio(&args.ratio)?;
    let log = run_log(&args.out);

    let scenes = load_scenes(&args.scenes_file)?;
    let scene = scene_at(&scenes, args.index)?;
    let prompt = scene_preview_prompt(scene, &args.style);

    log.emit("preview_started", &[("index", json!(args.index))])?;
    let artifact = client
        .generate_imagen(&prompt, ratio.imagen_ratio())
        .map_err(anyhow::Error::new)?;
    let path = save_artifact(
        &args.out,
        &format!("scene-{:02}", args.index),
        &artifact,
        &prompt,
    )?;
    log.record("preview_finished")?;
    println!("preview written to {}", path.display());
    Ok(0)
}

fn run_scene_video(args: SceneVideoArgs) -> Result<i32> {
    let client = client_from_env()?;
    let ratio = parse_ratio(&args.ratio)?;
    let log = run_log(&args.out);

    let scenes = load_scenes(&args.scenes_file)?;
    let scene = scene_at(&scenes, args.index)?;
    let prompt = scene_video_prompt(scene, &args.style);
    let seed_image = InlineImage::from_path(&args.image)?;

    let request = VideoRequest {
        prompt,
        seed_image: Some(seed_image),
        aspect_ratio: ratio,
        resolution: "720p".to_string(),
    };
    let config = PollConfig {
        interval: Duration::from_secs(args.poll_interval.max(1)),
        timeout: Duration::from_secs(args.timeout.max(1)),
    };

    log.emit("video_submitted", &[("index", json!(args.index))])?;
    let ticker = SystemTicker;
    let mut job = VideoJob::new(&client, config, &ticker, CancelToken::new());
    let artifact = match job.run(&request) {
        Ok(artifact) => artifact,
        Err(err) => {
            log.emit("video_failed", &[("error", json!(err.to_string()))])?;
            return Err(anyhow::Error::new(err));
        }
    };
    let path = save_artifact(
        &args.out,
        &format!("scene-{:02}", args.index),
        &artifact,
        &request.prompt,
    )?;
    log.record("video_done")?;
    println!("video written to {}", path.display());
    Ok(0)
}

fn run_veo_prompt(args: VeoPromptArgs) -> Result<i32> {
    if args.list_fields {
        for field in VEO_FIELDS {
            println!("{} - {}", field.key, field.label);
            for (value, label) in field.options {
                println!("    {value}  ({label})");
            }
        }
        return Ok(0);
    }
    if args.subjects.is_empty() {
        bail!("at least one --subject is required");
    }

    let subjects = args
        .subjects
        .iter()
        .enumerate()
        .map(|(index, description)| Subject {
            description: description.clone(),
            dialogue: args.dialogues.get(index).cloned().unwrap_or_default(),
        })
        .collect();

    let mut values = BTreeMap::new();
    let fields = [
        ("action", &args.action),
        ("expression", &args.expression),
        ("place", &args.place),
        ("time", &args.time),
        ("camera_motion", &args.camera_motion),
        ("lighting", &args.lighting),
        ("video_style", &args.video_style),
        ("video_vibe", &args.video_vibe),
        ("sound_music", &args.sound_music),
        ("additional_details", &args.additional_details),
    ];
    for (key, value) in fields {
        if let Some(value) = value {
            values.insert(key.to_string(), value.clone());
        }
    }

    let inputs = VeoPromptInputs { subjects, values };
    println!("=== Prompt (Indonesia) ===");
    println!("{}", inputs.assemble_indonesian());
    println!();
    println!("=== Prompt (English) ===");
    println!("{}", inputs.assemble_english());
    Ok(0)
}

fn run_tts(args: TtsArgs) -> Result<i32> {
    let voice = find_voice(&args.voice)
        .with_context(|| format!("unknown voice '{}'; see `rahyang voices`", args.voice))?;
    let client = client_from_env()?;

    let artifact = client
        .generate_speech(&args.text, voice.name)
        .map_err(anyhow::Error::new)?;
    let wav = wav_from_pcm16(&artifact.bytes, TTS_SAMPLE_RATE);
    if let Some(parent) = args.out.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&args.out, wav)
        .with_context(|| format!("failed writing {}", args.out.display()))?;
    println!("audio written to {}", args.out.display());
    Ok(0)
}

fn run_voices(args: VoicesArgs) -> Result<i32> {
    let voices = filter_voices(&args.gender, &args.style);
    if voices.is_empty() {
        println!("no voices match gender='{}' style='{}'", args.gender, args.style);
        return Ok(0);
    }
    for voice in voices {
        println!(
            "{:<14} {:<8} {:<12} {}",
            voice.name, voice.gender, voice.style, voice.description
        );
    }
    Ok(0)
}

fn parse_expiry(date: &str) -> Result<chrono::DateTime<Utc>> {
    let day = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{date}', expected YYYY-MM-DD"))?;
    let midnight = day
        .and_hms_opt(0, 0, 0)
        .context("invalid midnight timestamp")?;
    Ok(Utc.from_utc_datetime(&midnight))
}

fn run_users(args: UsersArgs) -> Result<i32> {
    let mut store = UserStore::load_or_seed(&args.store)?;
    match args.action {
        UsersAction::List => {
            for account in store.accounts() {
                let expiry = account
                    .expires_at
                    .map(|at| at.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{:<16} {:<6} expires: {expiry}",
                    account.username,
                    account.role.as_str()
                );
            }
        }
        UsersAction::Add {
            username,
            password,
            role,
            expires,
        } => {
            let role = match role.as_str() {
                "admin" => Role::Admin,
                "user" => Role::User,
                other => bail!("unknown role '{other}' (admin, user)"),
            };
            let expires_at = expires.as_deref().map(parse_expiry).transpose()?;
            store.upsert(UserAccount {
                username: username.clone(),
                password,
                role,
                expires_at,
            });
            store.save()?;
            println!("account '{username}' saved");
        }
        UsersAction::Remove { username } => {
            if !store.remove(&username) {
                bail!("no account '{username}'");
            }
            store.save()?;
            println!("account '{username}' removed");
        }
        UsersAction::Expire { username, date } => {
            let expires_at = date.as_deref().map(parse_expiry).transpose()?;
            if !store.set_expiry(&username, expires_at) {
                bail!("no account '{username}'");
            }
            store.save()?;
            println!("expiry updated for '{username}'");
        }
        UsersAction::Login { username, password } => {
            match store.authenticate(&username, &password, Utc::now()) {
                Ok(account) => println!("ok: role {}", account.role.as_str()),
                Err(err) => {
                    println!("denied: {err}");
                    return Ok(1);
                }
            }
        }
    }
    Ok(0)
}
