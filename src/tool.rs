use std::fmt;

use ratatui::style::Color;
use serde::{Deserialize, Serialize};

/// The closed set of AI tools the launcher knows how to supervise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolKind {
    TextGeneration,
    Companion,
    LocalLlm,
    VoiceConversion,
}

impl ToolKind {
    pub const ALL: [ToolKind; 4] = [
        ToolKind::TextGeneration,
        ToolKind::Companion,
        ToolKind::LocalLlm,
        ToolKind::VoiceConversion,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            ToolKind::TextGeneration => "text-generation",
            ToolKind::Companion => "companion",
            ToolKind::LocalLlm => "local-llm",
            ToolKind::VoiceConversion => "voice-conversion",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ToolKind::TextGeneration => "Text Generation",
            ToolKind::Companion => "Companion",
            ToolKind::LocalLlm => "Local LLM",
            ToolKind::VoiceConversion => "Voice Conversion",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            ToolKind::TextGeneration => "✎",
            ToolKind::Companion => "♥",
            ToolKind::LocalLlm => "◆",
            ToolKind::VoiceConversion => "♪",
        }
    }

    pub fn accent(self) -> Color {
        match self {
            ToolKind::TextGeneration => Color::Cyan,
            ToolKind::Companion => Color::Magenta,
            ToolKind::LocalLlm => Color::Green,
            ToolKind::VoiceConversion => Color::Yellow,
        }
    }

    /// Script name used when the config does not name one for this tool.
    pub fn default_script(self) -> &'static str {
        match self {
            ToolKind::TextGeneration => "start_text_generation.bat",
            ToolKind::Companion => "start_companion.bat",
            ToolKind::LocalLlm => "start_local_llm.bat",
            ToolKind::VoiceConversion => "start_voice_conversion.bat",
        }
    }

    pub fn parse(raw: &str) -> Option<ToolKind> {
        let normalized = raw.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        ToolKind::ALL.into_iter().find(|kind| {
            normalized == kind.slug()
                || normalized == kind.label().to_ascii_lowercase().replace(' ', "-")
                || normalized == kind.alias()
        })
    }

    fn alias(self) -> &'static str {
        match self {
            ToolKind::TextGeneration => "toola",
            ToolKind::Companion => "toolb",
            ToolKind::LocalLlm => "toolc",
            ToolKind::VoiceConversion => "toold",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}
