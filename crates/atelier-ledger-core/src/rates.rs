//! The rate table: every billable operation and its fixed credit cost.
//!
//! Operations are static configuration compiled into the binary. The set is
//! closed: an identifier outside the table is a caller bug surfaced at the
//! parse boundary, never a runtime condition a user sees. Lookups are total
//! const functions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category of a billable operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Music generation and audio processing.
    Music,
    /// Still image generation.
    Image,
    /// Video generation and editing.
    Video,
    /// Conversational AI.
    Chat,
    /// Real-time audio sessions.
    LiveAudio,
    /// Design studio tools.
    Design,
}

impl Category {
    /// Stable identifier used in serialized metadata and query parameters.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Music => "music",
            Self::Image => "image",
            Self::Video => "video",
            Self::Chat => "chat",
            Self::LiveAudio => "live_audio",
            Self::Design => "design",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when an operation identifier is not in the rate table.
///
/// This is a programming error on the caller's side (the key set is closed
/// and compile-time known); at the HTTP boundary it maps to a 400, and it
/// never reaches a billing path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown operation: {0}")]
pub struct UnknownOperation(pub String);

/// One table, five total lookups. Each row: variant, wire name, credit cost,
/// category, display name.
macro_rules! rate_table {
    ($( $variant:ident => ($key:literal, $cost:literal, $category:ident, $label:literal) ),+ $(,)?) => {
        /// A billable operation with a fixed credit cost.
        ///
        /// Wire names (`music_generate_v5`, `image_ultra`, ...) are the
        /// platform's operation identifiers and are stable across releases.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum Operation {
            $(
                #[doc = $label]
                #[serde(rename = $key)]
                $variant,
            )+
        }

        impl Operation {
            /// Every operation in the table.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Credit cost of the operation.
            #[must_use]
            pub const fn cost(self) -> i64 {
                match self {
                    $(Self::$variant => $cost,)+
                }
            }

            /// Category the operation belongs to.
            #[must_use]
            pub const fn category(self) -> Category {
                match self {
                    $(Self::$variant => Category::$category,)+
                }
            }

            /// Human-readable display name.
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)+
                }
            }

            /// Stable wire identifier.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $key,)+
                }
            }
        }

        impl FromStr for Operation {
            type Err = UnknownOperation;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($key => Ok(Self::$variant),)+
                    other => Err(UnknownOperation(other.to_string())),
                }
            }
        }
    };
}

rate_table! {
    // Music generation (all model versions share one price)
    MusicGenerateV3 => ("music_generate_v3", 6, Music, "Generate Music (V3)"),
    MusicGenerateV3_5 => ("music_generate_v3_5", 6, Music, "Generate Music (V3.5)"),
    MusicGenerateV4 => ("music_generate_v4", 6, Music, "Generate Music (V4)"),
    MusicGenerateV4_5 => ("music_generate_v4_5", 6, Music, "Generate Music (V4.5)"),
    MusicGenerateV4_5Plus => ("music_generate_v4_5plus", 6, Music, "Generate Music (V4.5 Plus)"),
    MusicGenerateV5 => ("music_generate_v5", 6, Music, "Generate Music (V5)"),
    MusicAddInstrumental => ("music_add_instrumental", 6, Music, "Add Instrumental"),
    MusicAddVocals => ("music_add_vocals", 6, Music, "Add Vocals"),
    MusicExtend => ("music_extend", 6, Music, "Extend Track"),
    MusicCover => ("music_cover", 6, Music, "Create Cover"),
    MusicSeparateVocals => ("music_separate_vocals", 5, Music, "Separate Vocals (2-stem)"),
    MusicSplitStemFull => ("music_split_stem_full", 50, Music, "Full Stem Split (12-stem)"),
    MusicConvertWav => ("music_convert_wav", 1, Music, "Convert to WAV"),
    MusicGenerateMidi => ("music_generate_midi", 1, Music, "Generate MIDI"),

    // Image generation
    ImageFast => ("image_fast", 15, Image, "Image Fast (1K)"),
    ImageStandard => ("image_standard", 25, Image, "Image Standard (2K)"),
    ImageUltra => ("image_ultra", 35, Image, "Image Ultra (4K)"),
    Image3 => ("image_3", 10, Image, "Image Economy"),
    ImageGemini => ("image_gemini", 4, Image, "Image Legacy"),

    // Video generation and editing
    VideoGen4_5s => ("video_gen4_5s", 20, Video, "Video Gen-4 (5s)"),
    VideoGen4_10s => ("video_gen4_10s", 40, Video, "Video Gen-4 (10s)"),
    VideoGen4Aleph5s => ("video_gen4_aleph_5s", 60, Video, "Video Gen-4 Aleph (5s)"),
    ImageToVideo5s => ("image_to_video_5s", 18, Video, "Image to Video (5s)"),
    ImageToVideo10s => ("image_to_video_10s", 35, Video, "Image to Video (10s)"),
    VideoToVideo => ("video_to_video", 50, Video, "AI Video Edit"),
    ActTwo => ("act_two", 35, Video, "Character Animation"),
    Gen3Alpha5s => ("gen3_alpha_5s", 18, Video, "Video Economy (5s)"),
    Gen3Alpha10s => ("gen3_alpha_10s", 35, Video, "Video Economy (10s)"),
    VideoUpscale5s => ("video_upscale_5s", 10, Video, "Video Upscale (5s)"),
    VideoUpscale10s => ("video_upscale_10s", 20, Video, "Video Upscale (10s)"),

    // Chat
    ChatBasic => ("chat_basic", 0, Chat, "Basic Chat"),
    ChatAdvanced => ("chat_advanced", 1, Chat, "Advanced Chat"),

    // Live audio
    LiveAudio1Min => ("live_audio_1min", 3, LiveAudio, "Live Audio (1 min)"),
    LiveAudio5Min => ("live_audio_5min", 13, LiveAudio, "Live Audio (5 min)"),

    // Design studio
    DesignGenerateImage => ("design_generate_image", 4, Design, "Design: Generate Image"),
    DesignGenerateLogo => ("design_generate_logo", 6, Design, "Design: Generate Logo"),
    DesignGenerateIcon => ("design_generate_icon", 4, Design, "Design: Generate Icon"),
    DesignGeneratePattern => ("design_generate_pattern", 4, Design, "Design: Generate Pattern"),
    DesignGenerateSvg => ("design_generate_svg", 6, Design, "Design: Generate SVG"),
    DesignEditImage => ("design_edit_image", 5, Design, "Design: Edit Image"),
    DesignRemoveBackground => ("design_remove_background", 5, Design, "Design: Remove Background"),
    DesignUpscaleImage => ("design_upscale_image", 6, Design, "Design: Upscale"),
    DesignGenerateVariations => ("design_generate_variations", 8, Design, "Design: 3 Variations"),
    DesignAnalyzeImage => ("design_analyze_image", 2, Design, "Design: Analyze Image"),
    DesignExtractColors => ("design_extract_colors", 2, Design, "Design: Color Palette"),
    DesignTrends => ("design_trends", 3, Design, "Design: Trend Search"),
    DesignAssistant => ("design_assistant", 1, Design, "Design: Assistant"),
    DesignExportPng => ("design_export_png", 0, Design, "Design: Export PNG"),
    DesignExportSvg => ("design_export_svg", 0, Design, "Design: Export SVG"),
}

impl Operation {
    /// Whether the operation costs nothing and bypasses balance checks.
    #[must_use]
    pub const fn is_free(self) -> bool {
        self.cost() == 0
    }

    /// All free operations in the table.
    #[must_use]
    pub fn free_operations() -> Vec<Self> {
        Self::ALL.iter().copied().filter(|op| op.is_free()).collect()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn costs_match_rate_table() {
        assert_eq!(Operation::MusicGenerateV5.cost(), 6);
        assert_eq!(Operation::MusicSplitStemFull.cost(), 50);
        assert_eq!(Operation::ImageUltra.cost(), 35);
        assert_eq!(Operation::VideoGen4_10s.cost(), 40);
        assert_eq!(Operation::VideoGen4Aleph5s.cost(), 60);
        assert_eq!(Operation::ChatAdvanced.cost(), 1);
        assert_eq!(Operation::LiveAudio5Min.cost(), 13);
        assert_eq!(Operation::DesignGenerateVariations.cost(), 8);
    }

    #[test]
    fn costs_are_non_negative() {
        for op in Operation::ALL {
            assert!(op.cost() >= 0, "{op} has a negative cost");
        }
    }

    #[test]
    fn free_operations_are_exactly_the_zero_cost_ones() {
        let free = Operation::free_operations();
        assert_eq!(
            free,
            vec![
                Operation::ChatBasic,
                Operation::DesignExportPng,
                Operation::DesignExportSvg,
            ]
        );
        assert!(free.iter().all(|op| op.is_free()));
    }

    #[test]
    fn categories() {
        assert_eq!(Operation::MusicExtend.category(), Category::Music);
        assert_eq!(Operation::ImageFast.category(), Category::Image);
        assert_eq!(Operation::ActTwo.category(), Category::Video);
        assert_eq!(Operation::ChatBasic.category(), Category::Chat);
        assert_eq!(Operation::LiveAudio1Min.category(), Category::LiveAudio);
        assert_eq!(Operation::DesignTrends.category(), Category::Design);
    }

    #[test]
    fn wire_name_roundtrip_for_every_operation() {
        for op in Operation::ALL {
            let parsed: Operation = op.as_str().parse().unwrap();
            assert_eq!(parsed, *op);
        }
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&Operation::VideoGen4_10s).unwrap();
        assert_eq!(json, "\"video_gen4_10s\"");
        let back: Operation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Operation::VideoGen4_10s);
    }

    #[test]
    fn unknown_operation_fails_fast() {
        let err = "music_generate_v99".parse::<Operation>().unwrap_err();
        assert_eq!(err, UnknownOperation("music_generate_v99".to_string()));
    }

    #[test]
    fn table_covers_all_categories() {
        for cat in [
            Category::Music,
            Category::Image,
            Category::Video,
            Category::Chat,
            Category::LiveAudio,
            Category::Design,
        ] {
            assert!(Operation::ALL.iter().any(|op| op.category() == cat));
        }
    }
}
