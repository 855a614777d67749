use crate::source::MediaInfo;

/// Keywords that mark a title or description as music
pub const DEFAULT_MUSIC_KEYWORDS: &[&str] = &[
    "music",
    "song",
    "audio",
    "track",
    "remix",
    "album",
    "official audio",
];

/// Decide from metadata alone whether a link is music.
///
/// A category mentioning "music" wins outright; otherwise the lowercased
/// title and description are searched for any keyword.
pub fn looks_like_music<S: AsRef<str>>(info: &MediaInfo, keywords: &[S]) -> bool {
    let mentions_music = |text: &str| text.to_lowercase().contains("music");

    if info.categories.iter().any(|category| mentions_music(category)) {
        return true;
    }

    if info.category.as_deref().is_some_and(mentions_music) {
        return true;
    }

    let title = info.title.as_deref().unwrap_or_default().to_lowercase();
    let description = info.description.as_deref().unwrap_or_default().to_lowercase();

    keywords
        .iter()
        .map(|keyword| keyword.as_ref().to_lowercase())
        .filter(|keyword| !keyword.is_empty())
        .any(|keyword| title.contains(&keyword) || description.contains(&keyword))
}
