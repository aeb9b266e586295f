//! Text-to-speech providers.

mod gtts;
mod piper;
mod sarvam;

pub use gtts::GttsSpeech;
pub use piper::PiperSpeech;
pub use sarvam::SarvamSpeech;

/// Longest narration any backend accepts in one request.
pub const MAX_TTS_CHARS: usize = 5000;

/// Languages with a mapped voice.
pub const SUPPORTED_LANGUAGES: &[&str] = &["en", "hi", "ta", "te"];

/// Guesses the narration language from the first Indic script found.
pub fn detect_language(text: &str) -> &'static str {
    for c in text.chars() {
        match c as u32 {
            0x0900..=0x097F => return "hi",
            0x0B80..=0x0BFF => return "ta",
            0x0C00..=0x0C7F => return "te",
            _ => {}
        }
    }
    "en"
}

/// Resolves the configured language setting for a given narration.
pub fn resolve_language(configured: &str, text: &str) -> String {
    if configured.eq_ignore_ascii_case("auto") || configured.is_empty() {
        detect_language(text).to_string()
    } else {
        configured.to_ascii_lowercase()
    }
}

/// Cuts `text` to at most [`MAX_TTS_CHARS`] characters on a char boundary.
pub fn truncate_text(text: &str) -> &str {
    match text.char_indices().nth(MAX_TTS_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_language() {
        assert_eq!(detect_language("Plants make sugar."), "en");
        assert_eq!(detect_language("प्रकाश संश्लेषण"), "hi");
        assert_eq!(detect_language("ஒளிச்சேர்க்கை"), "ta");
        assert_eq!(detect_language("కిరణజన్య సంయోగక్రియ"), "te");
        assert_eq!(detect_language(""), "en");
    }

    #[test]
    fn test_detect_language_first_indic_script_wins() {
        assert_eq!(detect_language("Intro: ஒளி and प्रकाश"), "ta");
    }

    #[test]
    fn test_resolve_language() {
        assert_eq!(resolve_language("auto", "प्रकाश"), "hi");
        assert_eq!(resolve_language("TA", "hello"), "ta");
        assert_eq!(resolve_language("", "hello"), "en");
    }

    #[test]
    fn test_truncate_text() {
        let short = "hello";
        assert_eq!(truncate_text(short), short);

        let long = "अ".repeat(MAX_TTS_CHARS + 10);
        let cut = truncate_text(&long);
        assert_eq!(cut.chars().count(), MAX_TTS_CHARS);
    }
}
