use crate::error::{ErrorKind, Result};

const AUDIO_EXTENSION: &str = "mp3";
/// Chapters are zero-padded to at least this many digits.
const MIN_WIDTH: u8 = 2;

/// Zero-pad a chapter number to `width` digits.
///
/// Numbers wider than `width` are never truncated.
///
/// ```
/// use chorale_catalog::pad_chapter;
/// assert_eq!(pad_chapter(7, 2), "07");
/// assert_eq!(pad_chapter(7, 3), "007");
/// assert_eq!(pad_chapter(150, 3), "150");
/// ```
pub fn pad_chapter(chapter: u16, width: u8) -> String {
    format!("{chapter:0width$}", width = usize::from(width))
}

fn digits(n: u16) -> u8 {
    match n {
        0..=9 => 1,
        10..=99 => 2,
        100..=999 => 3,
        1000..=9999 => 4,
        _ => 5,
    }
}

/// A single book of the catalog.
///
/// Each book expands to one audio asset per chapter, named
/// `{audio_prefix}_{padded chapter}.mp3`. The padding width is part of the
/// entry rather than derived from the book's name: by default it's two digits,
/// or as many digits as the chapter count needs when that's more (the one book
/// with 150 chapters gets three).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BookEntry {
    pub name: String,
    /// Number of chapters, always at least 1.
    pub chapters: u16,
    pub audio_prefix: String,
    width: u8,
}
impl BookEntry {
    /// Create a book with the default padding width for its chapter count.
    pub fn new(name: impl Into<String>, chapters: u16, audio_prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chapters,
            audio_prefix: audio_prefix.into(),
            width: MIN_WIDTH.max(digits(chapters)),
        }
    }

    /// Override the padding width.
    ///
    /// Fails if the width can't represent the highest chapter number, since
    /// the remote naming convention would then be ambiguous.
    pub fn with_width(mut self, width: u8) -> Result<Self> {
        if width < digits(self.chapters) {
            exn::bail!(ErrorKind::InvalidWidth { width, chapters: self.chapters });
        }
        self.width = width;
        Ok(self)
    }

    pub fn width(&self) -> u8 {
        self.width
    }

    /// Audio filename for one chapter (1-based).
    ///
    /// ```
    /// use chorale_catalog::BookEntry;
    /// let psalms = BookEntry::new("Psalms", 150, "PSA");
    /// assert_eq!(psalms.audio_filename(7), "PSA_007.mp3");
    /// let genesis = BookEntry::new("Genesis", 50, "GEN");
    /// assert_eq!(genesis.audio_filename(7), "GEN_07.mp3");
    /// ```
    pub fn audio_filename(&self, chapter: u16) -> String {
        format!("{}_{}.{AUDIO_EXTENSION}", self.audio_prefix, pad_chapter(chapter, self.width))
    }

    /// Iterate the audio filenames of every chapter, in order.
    pub fn audio_filenames(&self) -> impl Iterator<Item = String> + '_ {
        (1..=self.chapters).map(|chapter| self.audio_filename(chapter))
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            exn::bail!(ErrorKind::InvalidBook("empty name".to_string()));
        }
        if self.chapters == 0 {
            exn::bail!(ErrorKind::InvalidBook(format!("{} has no chapters", self.name)));
        }
        if self.audio_prefix.is_empty()
            || self.audio_prefix.chars().any(|c| c == '/' || c.is_whitespace() || c.is_control())
        {
            exn::bail!(ErrorKind::InvalidBook(format!("{} has unusable audio prefix {:?}", self.name, self.audio_prefix)));
        }
        if self.width < digits(self.chapters) {
            exn::bail!(ErrorKind::InvalidWidth { width: self.width, chapters: self.chapters });
        }
        Ok(())
    }
}
