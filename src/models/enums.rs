use serde::{Deserialize, Serialize};

use super::ModelError;

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = ModelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(ModelError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// Closed keyword taxonomy: a `str_enum!` whose variants also carry their
/// ordered trigger phrases (lowercase).
///
/// Variants must be declared in alphabetical order of their codes; the derived
/// `Ord` is what keeps category sets sorted by code.
macro_rules! taxonomy_enum {
    ($name:ident { $($variant:ident => $s:literal [$($trigger:literal),+ $(,)?]),+ $(,)? }) => {
        str_enum!($name { $($variant => $s),+ });

        impl Category for $name {
            const ALL: &'static [Self] = &[$(Self::$variant),+];

            fn code(self) -> &'static str {
                self.as_str()
            }

            fn triggers(self) -> &'static [&'static str] {
                match self {
                    $(Self::$variant => &[$($trigger),+]),+
                }
            }
        }
    };
}

/// A category of a closed keyword taxonomy.
pub trait Category: Copy + Ord + std::fmt::Debug + 'static {
    /// Every category, in code order.
    const ALL: &'static [Self];

    /// Canonical snake_case code.
    fn code(self) -> &'static str;

    /// Trigger phrases in match-preference order.
    fn triggers(self) -> &'static [&'static str];
}

taxonomy_enum!(TreatmentCategory {
    Chiropractic => "chiropractic" ["chiropractic", "chiro"],
    HomeExercise => "home_exercise" ["home exercise", "home exercises"],
    Injection => "injection" ["epidural", "steroid injection", "esi", "injection"],
    Nsaids => "nsaids" ["nsaid", "ibuprofen", "naproxen", "diclofenac"],
    Pt => "pt" ["physical therapy", "pt"],
    Steroid => "steroid" ["oral steroid", "prednisone", "methylprednisolone"],
});

taxonomy_enum!(RedFlagCategory {
    Cancer => "cancer" ["history of cancer", "malignancy", "unexplained weight loss"],
    CaudaEquina => "cauda_equina" ["urinary retention", "saddle anesthesia", "bowel or bladder", "incontinence"],
    FractureTrauma => "fracture_trauma" ["trauma", "fell", "fall", "motor vehicle", "fracture"],
    Infection => "infection" ["fever", "iv drug use", "discitis", "osteomyelitis", "infection"],
    ProgressiveNeuroDeficit => "progressive_neuro_deficit" ["progressive weakness", "worsening weakness", "foot drop"],
});

str_enum!(ExtractionMode {
    Baseline => "baseline",
    Llm => "llm",
    LlmFallbackBaseline => "llm_fallback_baseline",
    LlmRefused => "llm_refused",
});

str_enum!(EvidenceSource {
    Note => "note",
    Policy => "policy",
});

// Declaration order is the order fields appear in evidence maps.
str_enum!(FactField {
    SymptomsDurationWeeks => "symptoms_duration_weeks",
    ConservativeCareWeeks => "conservative_care_weeks",
    Treatments => "treatments",
    RedFlags => "red_flags",
});

impl FactField {
    pub const ALL: [FactField; 4] = [
        Self::SymptomsDurationWeeks,
        Self::ConservativeCareWeeks,
        Self::Treatments,
        Self::RedFlags,
    ];
}

str_enum!(CriterionStatus {
    Met => "MET",
    NotMet => "NOT_MET",
    Unknown => "UNKNOWN",
});

str_enum!(CriterionId {
    RedFlags => "C1_RED_FLAGS",
    ConservativeCare => "C2_CONSERVATIVE_CARE",
});
