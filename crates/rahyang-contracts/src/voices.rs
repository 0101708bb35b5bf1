//! Prebuilt TTS voice catalog with gender/style filtering.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Voice {
    pub name: &'static str,
    pub gender: &'static str,
    pub style: &'static str,
    pub description: &'static str,
}

pub const VOICE_CATALOG: &[Voice] = &[
    Voice { name: "Achernar", gender: "Wanita", style: "Narator", description: "Lembut, Halus" },
    Voice { name: "Charon", gender: "Pria", style: "Narator", description: "Informatif, Stabil" },
    Voice { name: "Erinome", gender: "Wanita", style: "Pendidik", description: "Jelas, Bersih" },
    Voice { name: "Iapetus", gender: "Pria", style: "Pendidik", description: "Jelas, Berwibawa" },
    Voice { name: "Kore", gender: "Pria", style: "Meyakinkan", description: "Tegas, Profesional" },
    Voice { name: "Sulafat", gender: "Netral", style: "Meyakinkan", description: "Hangat, Ramah" },
    Voice { name: "Puck", gender: "Wanita", style: "Pelatih", description: "Upbeat, Semangat" },
    Voice { name: "Zephyr", gender: "Netral", style: "Pelatih", description: "Energik, Cerah" },
    Voice { name: "Sadachbia", gender: "Wanita", style: "Motivator", description: "Bersemangat, Hidup" },
    Voice { name: "Fenrir", gender: "Pria", style: "Motivator", description: "Penuh Gairah, Semangat" },
    Voice { name: "Vindemiatrix", gender: "Wanita", style: "Ekspresif", description: "Lembut, Menarik, Drama" },
    Voice { name: "Algenib", gender: "Pria", style: "Ekspresif", description: "Serak, Dalam, Drama" },
];

pub fn find_voice(name: &str) -> Option<&'static Voice> {
    VOICE_CATALOG
        .iter()
        .find(|voice| voice.name.eq_ignore_ascii_case(name))
}

/// Map a UI-facing gender filter label onto the catalog value. `Semua` and
/// unknown labels pass through unchanged (unknowns simply match nothing).
pub fn normalize_gender(label: &str) -> &str {
    match label {
        "Laki-laki" => "Pria",
        "Perempuan" => "Wanita",
        other => other,
    }
}

/// Map a UI-facing style filter label onto the catalog value.
pub fn normalize_style(label: &str) -> &str {
    match label {
        "Pendidik/Pengajar" => "Pendidik",
        "Meyakinkan/Profesional" => "Meyakinkan",
        "Pelatih/Ceria" => "Pelatih",
        "Ekspresif secara Emosional" => "Ekspresif",
        other => other,
    }
}

const WILDCARD: &str = "Semua";

/// Filter the catalog; either filter may be `Semua` (or empty) to match
/// everything.
pub fn filter_voices(gender: &str, style: &str) -> Vec<&'static Voice> {
    let gender = normalize_gender(gender);
    let style = normalize_style(style);
    VOICE_CATALOG
        .iter()
        .filter(|voice| {
            let gender_match = gender.is_empty() || gender == WILDCARD || voice.gender == gender;
            let style_match = style.is_empty() || style == WILDCARD || voice.style == style;
            gender_match && style_match
        })
        .collect()
}
