use crate::error::{ErrorKind, Result};
use crate::{Catalog, Manifest};
use chorale_storage::AssetUrl;
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::collections::btree_set::Iter;

/// The full set of asset URLs the cache should hold after a pass.
///
/// Recomputed from scratch on every synchronization and never persisted.
/// Ordered lexicographically, so passes fetch assets in a stable order and
/// logs are reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredSet {
    urls: BTreeSet<AssetUrl>,
}
impl DesiredSet {
    pub fn contains(&self, url: &AssetUrl) -> bool {
        self.urls.contains(url)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, AssetUrl> {
        self.urls.iter()
    }

    pub fn to_vec(&self) -> Vec<AssetUrl> {
        self.urls.iter().cloned().collect()
    }
}
impl<'a> IntoIterator for &'a DesiredSet {
    type Item = &'a AssetUrl;
    type IntoIter = Iter<'a, AssetUrl>;
    fn into_iter(self) -> Self::IntoIter {
        self.urls.iter()
    }
}
impl FromIterator<AssetUrl> for DesiredSet {
    fn from_iter<T: IntoIterator<Item = AssetUrl>>(iter: T) -> Self {
        Self { urls: iter.into_iter().collect() }
    }
}

/// Percent-encode whitespace and control characters the way a browser would
/// before requesting the URL, so filenames like `Amazing Grace.mp4` still make
/// valid keys. Everything else is passed through untouched.
fn encode_filename(name: &str) -> Cow<'_, str> {
    if !name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Cow::Borrowed(name);
    }
    let mut encoded = String::with_capacity(name.len() + 8);
    for c in name.chars() {
        if c.is_whitespace() || c.is_control() {
            let mut buf = [0; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                encoded.push_str(&format!("%{byte:02X}"));
            }
        } else {
            encoded.push(c);
        }
    }
    Cow::Owned(encoded)
}

fn normalize_base(base: &str) -> Result<&str> {
    let trimmed = base.trim_end_matches('/');
    if trimmed.is_empty() || trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
        exn::bail!(ErrorKind::InvalidBase(base.to_string()));
    }
    Ok(trimmed)
}

/// Expand a catalog and a manifest into the desired set of asset URLs.
///
/// - every chapter of every book: `{audio_base}/{audio_prefix}_{padded}.mp3`
/// - every manifest entry: `{video_base}/{filename}`
///
/// Trailing slashes on either base are ignored. Whitespace in manifest
/// filenames is percent-encoded, blank entries are skipped with a warning and
/// duplicate entries collapse into one URL.
///
/// # Errors
///
/// Fails if either base is unusable, or if both bases are the same (audio and
/// video URLs must live in distinct namespaces).
///
/// ```
/// use chorale_catalog::{BookEntry, Catalog, Manifest, build};
///
/// let catalog = Catalog::new([BookEntry::new("Psalms", 150, "PSA")]).unwrap();
/// let manifest = Manifest::new(["hymn-001.mp4"]);
/// let desired = build(&catalog, &manifest, "https://cdn.example/audio/", "https://cdn.example/video").unwrap();
/// assert_eq!(desired.len(), 151);
/// assert!(desired.iter().any(|url| url.as_str() == "https://cdn.example/audio/PSA_007.mp3"));
/// assert!(desired.iter().any(|url| url.as_str() == "https://cdn.example/video/hymn-001.mp4"));
/// ```
pub fn build(catalog: &Catalog, manifest: &Manifest, audio_base: &str, video_base: &str) -> Result<DesiredSet> {
    let audio_base = normalize_base(audio_base)?;
    let video_base = normalize_base(video_base)?;
    if audio_base == video_base {
        exn::bail!(ErrorKind::NamespaceCollision(audio_base.to_string()));
    }

    let mut urls = BTreeSet::new();
    for book in catalog {
        for filename in book.audio_filenames() {
            // Infallible in practice: prefixes are validated by Catalog::new
            // and padded chapter numbers are ASCII digits.
            match AssetUrl::new(format!("{audio_base}/{filename}")) {
                Ok(url) => _ = urls.insert(url),
                Err(e) => tracing::warn!(book = %book.name, error = %e, "Skipping unusable audio URL"),
            }
        }
    }
    for name in manifest.iter() {
        if name.trim().is_empty() {
            tracing::warn!("Skipping blank manifest entry");
            continue;
        }
        let url = match AssetUrl::new(format!("{video_base}/{}", encode_filename(name))) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(entry = name, error = %e, "Skipping manifest entry that can't be used as a cache key");
                continue;
            },
        };
        if !urls.insert(url) {
            tracing::debug!(entry = name, "Duplicate manifest entry");
        }
    }
    Ok(DesiredSet { urls })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BookEntry;
    use rstest::rstest;

    const AUDIO: &str = "https://cdn.example.org/audio";
    const VIDEO: &str = "https://cdn.example.org/video";

    fn small_catalog() -> Catalog {
        Catalog::new([
            BookEntry::new("Ruth", 4, "RUT"),
            BookEntry::new("Psalms", 150, "PSA"),
            BookEntry::new("Jude", 1, "JUD"),
        ])
        .unwrap()
    }

    fn has(set: &DesiredSet, url: &str) -> bool {
        set.iter().any(|u| u.as_str() == url)
    }

    #[test]
    fn test_padding_rule_in_urls() {
        let desired = build(&small_catalog(), &Manifest::default(), AUDIO, VIDEO).unwrap();
        assert!(has(&desired, "https://cdn.example.org/audio/PSA_007.mp3"));
        assert!(has(&desired, "https://cdn.example.org/audio/PSA_150.mp3"));
        assert!(has(&desired, "https://cdn.example.org/audio/RUT_04.mp3"));
        assert!(has(&desired, "https://cdn.example.org/audio/JUD_01.mp3"));
        assert!(!has(&desired, "https://cdn.example.org/audio/PSA_07.mp3"));
        assert!(!has(&desired, "https://cdn.example.org/audio/RUT_004.mp3"));
    }

    #[test]
    fn test_set_completeness() {
        let catalog = Catalog::bible();
        let manifest = Manifest::new((1..=40).map(|n| format!("hymn-{n:03}.mp4")));
        let desired = build(&catalog, &manifest, AUDIO, VIDEO).unwrap();
        for book in &catalog {
            let prefix = format!("{AUDIO}/{}_", book.audio_prefix);
            let count = desired.iter().filter(|url| url.as_str().starts_with(&prefix)).count();
            assert_eq!(count, usize::from(book.chapters), "{}", book.name);
        }
        let videos = desired.iter().filter(|url| url.as_str().starts_with(VIDEO)).count();
        assert_eq!(videos, manifest.len());
        // No duplicates: the set size is exactly the sum of its parts.
        assert_eq!(desired.len(), catalog.total_chapters() + manifest.len());
    }

    #[rstest]
    #[case("https://cdn.example.org/audio/", "https://cdn.example.org/video//")]
    #[case("https://cdn.example.org/audio", "https://cdn.example.org/video")]
    fn test_trailing_slashes_ignored(#[case] audio: &str, #[case] video: &str) {
        let manifest = Manifest::new(["a.mp4"]);
        let desired = build(&small_catalog(), &manifest, audio, video).unwrap();
        assert!(has(&desired, "https://cdn.example.org/audio/RUT_01.mp3"));
        assert!(has(&desired, "https://cdn.example.org/video/a.mp4"));
    }

    #[test]
    fn test_duplicate_manifest_entries_collapse() {
        let manifest = Manifest::new(["a.mp4", "a.mp4", "b.mp4"]);
        let desired = build(&Catalog::default(), &manifest, AUDIO, VIDEO).unwrap();
        assert_eq!(desired.len(), 2);
    }

    #[test]
    fn test_blank_manifest_entries_skipped() {
        let manifest = Manifest::new(["", "   ", "ok.mp4"]);
        let desired = build(&Catalog::default(), &manifest, AUDIO, VIDEO).unwrap();
        assert_eq!(desired.to_vec(), vec![AssetUrl::new(format!("{VIDEO}/ok.mp4")).unwrap()]);
    }

    #[rstest]
    #[case("Amazing Grace.mp4", "Amazing%20Grace.mp4")]
    #[case("tab\there.mp4", "tab%09here.mp4")]
    #[case("no-space.mp4", "no-space.mp4")]
    #[case("Âme.mp4", "Âme.mp4")]
    fn test_encode_filename(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(encode_filename(input), expected);
    }

    #[rstest]
    #[case("", VIDEO)]
    #[case(AUDIO, "/")]
    #[case("https://cdn.example.org/my audio", VIDEO)]
    fn test_invalid_base(#[case] audio: &str, #[case] video: &str) {
        let err = build(&small_catalog(), &Manifest::default(), audio, video).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidBase(_)));
    }

    #[test]
    fn test_namespace_collision() {
        let err = build(&small_catalog(), &Manifest::default(), AUDIO, "https://cdn.example.org/audio/").unwrap_err();
        assert!(matches!(&*err, ErrorKind::NamespaceCollision(_)));
    }

    #[test]
    fn test_build_is_deterministic() {
        let manifest = Manifest::new(["z.mp4", "a.mp4"]);
        let first = build(&small_catalog(), &manifest, AUDIO, VIDEO).unwrap();
        let second = build(&small_catalog(), &manifest, AUDIO, VIDEO).unwrap();
        assert_eq!(first, second);
    }
}
