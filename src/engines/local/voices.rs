use std::sync::LazyLock;

use regex::Regex;

use super::Voice;
use crate::settings::to_speech_lang_code;

/// Name tokens that usually mark a female-presenting voice.
static FEMALE_VOICE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(female|femin|mulher|maria|helena|luciana|vitoria|camila|ana|sofia|isabela|paula|sabrina)",
    )
    .expect("female voice pattern is valid")
});

pub fn is_female_voice(voice: &Voice) -> bool {
    FEMALE_VOICE_PATTERN.is_match(&voice.name)
}

/// Does `voice` speak `language_code`? Exact tag, bare base language, or same base.
pub fn voice_matches_language(voice: &Voice, language_code: &str) -> bool {
    let voice_lang = voice.lang.to_lowercase();
    let target = to_speech_lang_code(language_code).to_lowercase();
    let base = target.split('-').next().unwrap_or_default();

    voice_lang == target || voice_lang == base || voice_lang.starts_with(&format!("{base}-"))
}

/// Pick the voice to use for `language_code`.
///
/// Order: the explicit id if present in the catalog, then a female voice in
/// the language, then any voice in the language, then the Portuguese
/// preference (female `pt-BR`, female `pt*`, first `pt-BR`, first `pt*`), then a
/// female voice in any language. `None` means the engine default for the
/// language tag.
pub fn select_voice<'a>(
    catalog: &'a [Voice],
    explicit_id: Option<&str>,
    language_code: &str,
) -> Option<&'a Voice> {
    if let Some(voice) = explicit_id.and_then(|id| catalog.iter().find(|v| v.id == id)) {
        return Some(voice);
    }

    let mut in_language = catalog
        .iter()
        .filter(|v| voice_matches_language(v, language_code));
    let first_in_language = in_language.clone().next();

    in_language
        .find(|v| is_female_voice(v))
        .or(first_in_language)
        .or_else(|| preferred_portuguese_voice(catalog))
        .or_else(|| catalog.iter().find(|v| is_female_voice(v)))
}

fn preferred_portuguese_voice(catalog: &[Voice]) -> Option<&Voice> {
    let brazilian = || {
        catalog
            .iter()
            .filter(|v| v.lang.replace('_', "-").eq_ignore_ascii_case("pt-BR"))
    };
    let portuguese = || {
        catalog
            .iter()
            .filter(|v| v.lang.to_ascii_lowercase().starts_with("pt"))
    };

    brazilian()
        .find(|v| is_female_voice(v))
        .or_else(|| portuguese().find(|v| is_female_voice(v)))
        .or_else(|| brazilian().next())
        .or_else(|| portuguese().next())
}
