//! Food/drink promo pack: style catalog, discriminant categories and the
//! prompt assembly that turns an analyzed product photo into model-ready
//! text.

use serde::{Deserialize, Serialize};

use crate::scenes::strip_code_fences;
use crate::templates::{PromptTemplate, TemplateContext, TemplateError};

/// Product category detected by the analysis call.
///
/// Parsing is total: labels that match none of the specific categories fall
/// back to [`FoodCategory::General`], so template selection always has
/// exactly one answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FoodCategory {
    NoodleBowl,
    Drink,
    SolidBar,
    SmallTreat,
    General,
}

impl FoodCategory {
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "noodlebowl" | "noodle_bowl" => FoodCategory::NoodleBowl,
            "drink" => FoodCategory::Drink,
            "solidbar" | "solid_bar" => FoodCategory::SolidBar,
            "smalltreat" | "small_treat" => FoodCategory::SmallTreat,
            _ => FoodCategory::General,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FoodCategory::NoodleBowl => "NoodleBowl",
            FoodCategory::Drink => "Drink",
            FoodCategory::SolidBar => "SolidBar",
            FoodCategory::SmallTreat => "SmallTreat",
            FoodCategory::General => "General",
        }
    }
}

/// Flavor/keyword context extracted from the product photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodContext {
    pub category: FoodCategory,
    pub flavor: String,
    pub creative_title: String,
    pub keywords: String,
}

impl Default for FoodContext {
    /// Fallback used when analysis fails; the pack still renders with
    /// generic appetite-appeal wording.
    fn default() -> Self {
        Self {
            category: FoodCategory::General,
            flavor: "General".to_string(),
            creative_title: "DELICIOUS TASTE".to_string(),
            keywords: "DELICIOUS, TASTY, YUMMY".to_string(),
        }
    }
}

impl FoodContext {
    /// Parse the analysis model's JSON answer, tolerating markdown fences
    /// and missing keys. Returns `None` when the payload is not an object.
    pub fn from_model_json(raw: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(strip_code_fences(raw)).ok()?;
        let object = value.as_object()?;
        let fallback = FoodContext::default();
        let field = |key: &str, default: &str| {
            object
                .get(key)
                .and_then(serde_json::Value::as_str)
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .unwrap_or(default)
                .to_string()
        };
        Some(Self {
            category: FoodCategory::parse(&field("category", "General")),
            flavor: field("flavor", &fallback.flavor),
            creative_title: field("creative_title", &fallback.creative_title),
            keywords: field("keywords", &fallback.keywords),
        })
    }
}

/// Vision prompt for the analysis call that produces a [`FoodContext`].
pub fn food_analysis_prompt() -> String {
    [
        "Analyze this food image extremely carefully for a commercial poster design.",
        "Determine the following:",
        "1. \"category\": Choose one best fit:",
        "   - \"NoodleBowl\" (for noodles, ramen, bakso, rice bowls, messy savory food)",
        "   - \"Drink\" (for bottles, glasses, beverages, ice)",
        "   - \"SolidBar\" (for chocolate bars, energetic bars, cake slices, long solid items)",
        "   - \"SmallTreat\" (for candies, cookies, small chocolate bites, nuggets)",
        "   - \"General\" (if none match)",
        "2. \"flavor\": \"Spicy\", \"Sweet\", \"Savory\", \"Fresh\".",
        "3. \"creative_title\": A short, punchy, 2-3 word poster headline suitable for this food (e.g. \"PEDAS NERAKA\", \"CHOCO BLAST\", \"FRESH ATTACK\"). Uppercase.",
        "4. \"keywords\": 3 visual adjectives for the background/effects.",
        "",
        "Return ONLY JSON. Example: { \"category\": \"NoodleBowl\", \"flavor\": \"Spicy\", \"creative_title\": \"PEDAS GILA\", \"keywords\": \"FIRE, SMOKE, CHAOS\" }",
    ]
    .join("\n")
}

/// The five pack styles. `CustomConcept` is the escape hatch for a caller
/// supplied concept and has no base template of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FoodStyle {
    PosterPromo,
    CinematicCommercial,
    RestaurantScene,
    ExtremeAd,
    WithModel,
    CustomConcept,
}

impl FoodStyle {
    /// Styles generated by the full pack, in display order.
    pub const PACK: [FoodStyle; 5] = [
        FoodStyle::PosterPromo,
        FoodStyle::CinematicCommercial,
        FoodStyle::RestaurantScene,
        FoodStyle::ExtremeAd,
        FoodStyle::WithModel,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FoodStyle::PosterPromo => "Poster Promo",
            FoodStyle::CinematicCommercial => "Cinematic Commercial",
            FoodStyle::RestaurantScene => "Di Tempat Makan",
            FoodStyle::ExtremeAd => "Iklan Ekstrim",
            FoodStyle::WithModel => "Dengan Model",
            FoodStyle::CustomConcept => "Custom Concept",
        }
    }

    /// Whether the rendered image must carry typography. Styles without it
    /// get an explicit no-text instruction instead.
    pub fn needs_text_overlay(&self) -> bool {
        matches!(self, FoodStyle::PosterPromo | FoodStyle::ExtremeAd)
    }

    fn base_template(&self) -> PromptTemplate {
        let body = match self {
            FoodStyle::PosterPromo => {
                "Professional food poster design for {food}, including BOLD TYPOGRAPHY TEXT overlay directly on image (e.g., {keywords}). Modern graphic design layout, magazine quality, appetite-appeal lighting, sharp details. WAJIB ADA TEKS JUDUL YANG ESTETIK PADA GAMBAR."
            }
            FoodStyle::CinematicCommercial => {
                "Cinematic 8K hyper-realistic commercial food advertisement, dramatic soft lighting, ultra-detailed textures, {food} placed as the hero, premium studio setup, crisp close-up, shallow depth of field, luxury color grading, perfect highlights, droplets and textures highly visible, professional advertising style, clean background, high-end product photography. NO TEXT overlays."
            }
            FoodStyle::RestaurantScene => {
                "Cinematic 8K hyper-realistic {food} served on a restaurant table, glossy texture, rising steam, dramatic soft lighting, shallow depth of field, warm ambient restaurant background, natural reflections, ultra-detailed food textures. NO TEXT overlays."
            }
            FoodStyle::ExtremeAd => {
                "Cinematic 8K hyper-realistic extreme food advertisement for {food}. INCLUDE EXCITING TEXT OVERLAYS like {keywords} or the food name. Glossy textures, flying ingredients, dynamic motion, dramatic lighting, high contrast. WAJIB ADA TEKS/TULISAN SERU PADA GAMBAR SESUAI RASA MAKANAN."
            }
            FoodStyle::WithModel => {
                "Cinematic 8K hyper-realistic scene of a model eating {food} at a restaurant, glossy texture, steam rising, the model interacting with {food}, natural warm restaurant lighting, soft background bokeh, expressive enjoyment, ultra-detailed textures. NO TEXT overlays."
            }
            FoodStyle::CustomConcept => "{food}",
        };
        PromptTemplate::new(self.name(), body)
    }
}

/// Poster layout variant, selected from the discriminant category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PosterVariant {
    FantasyStorm,
    RefreshmentExplosion,
    EpicMacroLandscape,
    MacroProductBurst,
}

/// Total mapping from `(category, flavor)` to a poster variant.
pub fn poster_variant(category: FoodCategory, flavor: &str) -> PosterVariant {
    let flavor = flavor.trim().to_ascii_lowercase();
    if category == FoodCategory::NoodleBowl
        || (category == FoodCategory::General && flavor == "spicy")
    {
        PosterVariant::FantasyStorm
    } else if category == FoodCategory::Drink || flavor == "fresh" {
        PosterVariant::RefreshmentExplosion
    } else if category == FoodCategory::SolidBar {
        PosterVariant::EpicMacroLandscape
    } else {
        PosterVariant::MacroProductBurst
    }
}

fn poster_variant_template(variant: PosterVariant) -> PromptTemplate {
    let body = match variant {
        PosterVariant::FantasyStorm => {
            "TYPE: Food Poster - Fantasy Storm.\n\
             VISUAL TONE: Chaotic, Fiery, Hyper-dynamic, Appetizingly Dangerous.\n\
             LAYOUT: Deep dark smoky atmosphere with volcanic orange glow from below. Central vortex composition; a massive tornado of {food} spiraling upwards.\n\
             MAIN IMAGE: A swirling tornado structure made of {food} intertwining with streams of fire/sauce.\n\
             EFFECTS: Ingredients caught in the wind vortex, explosive powder bursts, hot shimmering oil droplets scattering like sparks, flying glowing embers, thick spicy dark smoke.\n\
             LIGHTING: Dramatic under-lighting (lava glow) casting deep shadows + sharp orange rim light.\n\
             COLORS: Primary #FF3300, Secondary #FF8C00, Dark #0F0F0F."
        }
        PosterVariant::RefreshmentExplosion => {
            "TYPE: Beverage Poster - Refreshment Explosion.\n\
             VISUAL TONE: Warm Golden/Cool Blue (depending on food), Hyper-Refreshing, Explosive, High-Speed Photography.\n\
             LAYOUT: Blurred nature/plantation background (Golden Hour or Icy bokeh). Dynamic diagonal composition. The {food} cuts through a chaotic vortex of liquid and ice.\n\
             MAIN IMAGE: The {food} flying diagonally, creating a massive splash/inferno of liquid.\n\
             EFFECTS: Translucent liquid glowing like gold/crystal, Crystal clear ice cubes colliding in mid-air creating frosty mist, Heavy condensation droplets on product, Micro-bubbles inside the liquid splash.\n\
             LIGHTING: Strong backlighting passing through the liquid making it glow.\n\
             COLORS: Matches the drink color (e.g. Gold/Amber or Blue/Green)."
        }
        PosterVariant::EpicMacroLandscape => {
            "TYPE: Food Poster - Epic Macro Landscape.\n\
             VISUAL TONE: Majestic, Hyper-detailed, Mouth-watering, Golden-Hour Warmth.\n\
             LAYOUT: Blurred warm luxury bokeh background. Low-angle 'Ant-eye view' looking up at a massive towering {food} that is snapping/breaking in half.\n\
             MAIN IMAGE: A giant {food} snapping dramatically in the center like a breaking mountain cliff. Inner texture visible on the flying chunks.\n\
             EFFECTS: Whole ingredients (nuts/choc chips) flying out from the core like meteors, A shockwave of fine powder/crumbs exploding outward, Sharp rough textures on broken edges, Motion blur on smaller particles.\n\
             LIGHTING: Backlit by a warm 'Golden Hour' sun, creating cinematic rim lights.\n\
             COLORS: Rich Browns, Golds, Warm Accents."
        }
        PosterVariant::MacroProductBurst => {
            "TYPE: Food Poster - Macro Product Burst.\n\
             VISUAL TONE: Indulgent, Rich, Warm, High-speed Liquid Motion, Luxurious.\n\
             LAYOUT: Dark vignette background to make the product pop. Center explosion composition.\n\
             MAIN IMAGE: A single {food} piece cracking open dramatically at the center. From the cracks, a massive explosion of filling/liquid bursts outwards.\n\
             EFFECTS: Fragments of the product mixing with the liquid/cream, Stretchy sticky texture strings flying dramatically, Thick melted droplets suspended in air, Soft swirling sweet steam/mist.\n\
             LIGHTING: Warm golden studio lighting creating rich specular highlights.\n\
             COLORS: Gold, Caramel, Dark Brown, Vibrant product colors."
        }
    };
    PromptTemplate::new("poster-variant", body)
}

/// Assemble the full prompt for one pack style.
///
/// The poster style swaps in a category-specific layout concept plus a
/// mandatory typography instruction; every other style wraps its base
/// template in the photographer framing and a text/no-text instruction.
pub fn build_style_prompt(
    style: FoodStyle,
    product_name: &str,
    context: &FoodContext,
) -> Result<String, TemplateError> {
    let ctx = TemplateContext::new()
        .set("food", product_name)
        .set("keywords", context.keywords.clone());

    if style == FoodStyle::PosterPromo {
        let variant = poster_variant(context.category, &context.flavor);
        let concept = poster_variant_template(variant).render(&ctx)?;
        return Ok(format!(
            "Bertindaklah sebagai desainer poster makanan profesional 8K.\n\
             Product: {product_name}.\n\
             Generate Image based on this JSON-Style Concept:\n{concept}\n\n\
             TYPOGRAPHY INSTRUCTION (MANDATORY):\n\
             Add a BOLD, STYLISH TITLE overlay: \"{}\".\n\
             Add a price tag/badge if appropriate (e.g. \"15K\" or \"PROMO\").\n\
             Font style must match the Visual Tone (e.g. Distressed/Fire for Spicy, Elegant/Serif for Sweet, Bold/Sans for Drink).\n\
             Ensure text is integrated into the design but readable.",
            context.creative_title
        ));
    }

    let processed = style.base_template().render(&ctx)?;
    let text_instruction = if style.needs_text_overlay() {
        format!(
            "ANDA WAJIB MENAMBAHKAN TEKS/TIPOGRAFI ESTETIK PADA GAMBAR. \
             Karena makanan ini terdeteksi sebagai {}, gunakan kata kunci seperti: \"{}\" atau nama makanan \"{product_name}\". \
             Pastikan teks sesuai dengan nuansa rasa (Manis=Playful/Elegant, Pedas=Bold/Fiery).",
            context.flavor, context.keywords
        )
    } else {
        "JANGAN tambahkan teks pada gambar. Biarkan gambar bersih tanpa tulisan.".to_string()
    };

    Ok(format!(
        "Bertindaklah sebagai fotografer makanan profesional. Ubah foto makanan ini menjadi level profesional. \
         Objek: {product_name}. Deteksi Rasa: {}.\n\
         Style: {processed}.\n\
         {text_instruction}\n\
         Pastikan makanan utama tetap menjadi fokus.",
        context.flavor
    ))
}

/// Prompt for the per-image video concept call: a JSON object with a
/// `visual` prompt and an Indonesian `script`.
pub fn video_context_prompt(style: FoodStyle, product_name: &str, flavor: &str) -> String {
    let with_model = style == FoodStyle::WithModel;
    let visual_hint = if with_model {
        "Model eating, facial expressions."
    } else {
        "Slow motion macro shot, texture details."
    };
    let script_hint = if with_model {
        "Dialog between Model and Friend (Indonesian)."
    } else {
        "Voiceover script (Indonesian)."
    };
    format!(
        "You are an expert AI Video Prompt Engineer.\n\
         Create a JSON object with \"visual\" and \"script\".\n\
         Context: A {} photo of {product_name} ({flavor}).\n\n\
         1. \"visual\": Hyper-realistic 8K video prompt. {visual_hint}\n\
         2. \"script\": {script_hint}\n\
         Return raw JSON.",
        style.name()
    )
}
