//! Veo prompt crafting: structured subject/field inputs assembled into an
//! Indonesian working prompt and an English model-facing prompt.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Select,
}

/// One labelled input field of the crafting form. Select fields carry their
/// `(value, label)` option table; the value is what goes into the English
/// prompt, the label into the Indonesian one.
#[derive(Debug, Clone, Copy)]
pub struct VeoField {
    pub key: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub options: &'static [(&'static str, &'static str)],
}

pub const VEO_FIELDS: &[VeoField] = &[
    VeoField {
        key: "action",
        label: "Aksi/Tindakan (Keseluruhan)",
        kind: FieldKind::Text,
        options: &[],
    },
    VeoField {
        key: "expression",
        label: "Ekspresi (Umum)",
        kind: FieldKind::Text,
        options: &[],
    },
    VeoField {
        key: "place",
        label: "Tempat",
        kind: FieldKind::Text,
        options: &[],
    },
    VeoField {
        key: "time",
        label: "Waktu (Pilihan)",
        kind: FieldKind::Select,
        options: &[
            ("Bright Daylight", "Siang Hari yang Cerah"),
            ("Golden Hour Sunset", "Sore Hari Emas (Golden Hour)"),
            ("Foggy Misty Dawn", "Subuh Berkabut"),
            ("Deep Night, Ambient Light", "Malam Hari, Cahaya Sekitar"),
        ],
    },
    VeoField {
        key: "camera_motion",
        label: "Gerakan Kamera (EN/ID)",
        kind: FieldKind::Select,
        options: &[
            ("Static Shot", "Static Shot (Bidikan Statis)"),
            ("Pan", "Pan (Geser Horizontal)"),
            ("Tilt", "Tilt (Geser Vertikal)"),
            ("Dolly", "Dolly (Maju/Mundur)"),
            ("Truck", "Trucking (Geser Samping)"),
            ("Pedestal", "Pedestal (Naik/Turun)"),
            ("Roll", "Roll (Gulingan Kamera)"),
            ("Zoom In", "Zoom In (Perbesar)"),
            ("Zoom Out", "Zoom Out (Perkecil)"),
            ("Crane Shot", "Crane Shot (Bidikan Derek)"),
            ("3D Rotation", "3D Rotation (Rotasi 3D)"),
            ("Handheld Camera", "Handheld Camera (Genggam)"),
            ("Tracking Shot", "Tracking Shot (Bidikan Pelacakan)"),
        ],
    },
    VeoField {
        key: "lighting",
        label: "Pencahayaan",
        kind: FieldKind::Select,
        options: &[
            ("Dramatic Side Lighting", "Cahaya Samping Dramatis"),
            ("Soft Natural Light", "Cahaya Alami yang Lembut"),
            ("High-Key, Bright Lighting", "High-Key (Sangat Terang)"),
            ("Low-Key, Dark Contrast", "Low-Key (Kontras Gelap)"),
            ("Colored Studio Lighting", "Pencahayaan Studio Berwarna"),
        ],
    },
    VeoField {
        key: "video_style",
        label: "Gaya Video",
        kind: FieldKind::Select,
        options: &[
            ("Cinematic Photorealistic", "Fotorealistik Sinematik"),
            ("Studio Ghibli Anime", "Gaya Anime Studio Ghibli"),
            ("Cyberpunk Concept Art", "Seni Konsep Cyberpunk"),
            ("Retro VHS, Film Grain", "Retro VHS, Berbutir"),
            ("Oil Painting Style", "Gaya Lukisan Cat Minyak"),
        ],
    },
    VeoField {
        key: "video_vibe",
        label: "Suasana Video",
        kind: FieldKind::Select,
        options: &[
            ("Mysterious and Tense", "Misterius dan Menegangkan"),
            ("Fun and Cheerful", "Menyenangkan dan Ceria"),
            ("Melancholic and Poetic", "Melankolis dan Puitis"),
            ("Epic and Grand", "Epik dan Kolosal"),
            ("Calm and Serene", "Tenang dan Damai"),
        ],
    },
    VeoField {
        key: "sound_music",
        label: "Suara atau Musik (SFX)",
        kind: FieldKind::Text,
        options: &[],
    },
    VeoField {
        key: "additional_details",
        label: "Detail Tambahan",
        kind: FieldKind::Text,
        options: &[],
    },
];

pub fn field(key: &str) -> Option<&'static VeoField> {
    VEO_FIELDS.iter().find(|field| field.key == key)
}

/// Indonesian label for a select value; falls back to the raw value, then
/// to a "not specified" marker.
pub fn option_label(key: &str, value: &str) -> String {
    if value.is_empty() {
        return "Tidak Ditentukan".to_string();
    }
    field(key)
        .and_then(|field| {
            field
                .options
                .iter()
                .find(|(option_value, _)| *option_value == value)
                .map(|(_, label)| label.to_string())
        })
        .unwrap_or_else(|| value.to_string())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Subject {
    pub description: String,
    pub dialogue: String,
}

#[derive(Debug, Clone, Default)]
pub struct VeoPromptInputs {
    pub subjects: Vec<Subject>,
    pub values: BTreeMap<String, String>,
}

impl VeoPromptInputs {
    fn value(&self, key: &str) -> &str {
        self.values.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn has_subject(&self) -> bool {
        self.subjects
            .iter()
            .any(|subject| !subject.description.trim().is_empty())
    }

    /// Working prompt in Indonesian, with labelled technical details.
    pub fn assemble_indonesian(&self) -> String {
        let descriptions = self
            .subjects
            .iter()
            .enumerate()
            .map(|(index, subject)| {
                let description = if subject.description.trim().is_empty() {
                    "Tidak dideskripsikan"
                } else {
                    subject.description.as_str()
                };
                format!("Subjek {}: {description}", index + 1)
            })
            .collect::<Vec<_>>()
            .join("; ");

        let dialogues = self
            .subjects
            .iter()
            .enumerate()
            .filter(|(_, subject)| !subject.dialogue.trim().is_empty())
            .map(|(index, subject)| format!("Subjek {} berkata: \"{}\"", index + 1, subject.dialogue))
            .collect::<Vec<_>>()
            .join(". ");

        let action = if self.value("action").is_empty() {
            "melakukan suatu aksi"
        } else {
            self.value("action")
        };
        let expression = match self.value("expression") {
            "" => String::new(),
            text => format!(", dengan ekspresi {text}"),
        };
        let place = match self.value("place") {
            "" => String::new(),
            text => format!(" {text}"),
        };
        let time = match self.value("time") {
            "" => String::new(),
            value => format!(" ({})", option_label("time", value)),
        };

        let mut out = format!(
            "Adegan menampilkan {} subjek. {descriptions}. Aksi: {action}{expression}{place}.",
            self.subjects.len()
        );
        out.push_str("\n\nDetail Teknis:");
        out.push_str(&format!("\n- Waktu: {time}"));
        for key in ["camera_motion", "lighting", "video_style", "video_vibe"] {
            let label = field(key).map(|field| field.label).unwrap_or(key);
            let heading = label.split(" (").next().unwrap_or(label);
            out.push_str(&format!(
                "\n- {heading}: {}",
                option_label(key, self.value(key))
            ));
        }
        if !self.value("sound_music").is_empty() {
            out.push_str(&format!(
                "\n\nSuara/Musik (SFX): {}.",
                self.value("sound_music")
            ));
        }
        if !dialogues.is_empty() {
            out.push_str(&format!("\n\nDialog Karakter: {dialogues}"));
        }
        if !self.value("additional_details").is_empty() {
            out.push_str(&format!(
                "\n\nDetail Tambahan: {}.",
                self.value("additional_details")
            ));
        }
        out
    }

    /// Compact English prompt for the video model: subjects + action +
    /// place, then comma-joined modifiers, closing with the quality boost.
    pub fn assemble_english(&self) -> String {
        let subject_list = self
            .subjects
            .iter()
            .filter(|subject| !subject.description.trim().is_empty())
            .map(|subject| subject.description.clone())
            .collect::<Vec<_>>()
            .join(" and ");

        let dialogue_list = self
            .subjects
            .iter()
            .filter(|subject| !subject.dialogue.trim().is_empty())
            .map(|subject| format!("character says \"{}\"", subject.dialogue))
            .collect::<Vec<_>>()
            .join(", then ");

        let core = [
            if subject_list.is_empty() {
                "Multiple subjects".to_string()
            } else {
                subject_list
            },
            self.value("action").to_string(),
            self.value("place").to_string(),
        ]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

        let mut modifiers = Vec::new();
        if !self.value("expression").is_empty() {
            modifiers.push(format!("with an {} expression", self.value("expression")));
        }
        for key in [
            "time",
            "lighting",
            "video_style",
            "video_vibe",
            "camera_motion",
            "additional_details",
        ] {
            if !self.value(key).is_empty() {
                modifiers.push(self.value(key).to_string());
            }
        }
        modifiers.push("highly detailed, cinematic, high quality, 8K".to_string());

        let mut out = format!("{core}, {}", modifiers.join(", "));
        if !self.value("sound_music").is_empty() {
            out.push_str(&format!(" (Sound Design: {})", self.value("sound_music")));
        }
        if !dialogue_list.is_empty() {
            out.push_str(&format!(" (Dialogue: {dialogue_list})"));
        }
        out.trim().to_string()
    }
}
