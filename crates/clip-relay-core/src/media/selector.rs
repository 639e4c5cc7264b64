//! Output selector: a video quality ceiling or audio-only.
//!
//! The same value drives the button label, the callback payload and the
//! backend format directive, each through its own accessor.

use std::fmt;
use std::str::FromStr;

/// Wire form of the audio-only selector
const AUDIO_WIRE: &str = "mp3";

/// The user's chosen output form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Selector {
    /// Best video at or below `height` merged with best audio
    Video {
        /// Height ceiling in pixels
        height: u32,
    },
    /// Best audio transcoded to MP3
    AudioOnly,
}

/// Kind of media produced by a selector, which picks the upload method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Uploaded with `send_video`
    Video,
    /// Uploaded with `send_audio`
    Audio,
}

impl MediaKind {
    /// File extension of the produced file
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Video => "mp4",
            Self::Audio => "mp3",
        }
    }
}

impl Selector {
    /// Human-readable label, e.g. `720p` or `MP3`
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Video { height } => format!("{height}p"),
            Self::AudioOnly => "MP3".to_string(),
        }
    }

    /// Form used inside callback payloads; never contains `|`
    #[must_use]
    pub fn wire(&self) -> String {
        match self {
            Self::Video { height } => format!("{height}p"),
            Self::AudioOnly => AUDIO_WIRE.to_string(),
        }
    }

    /// Media kind produced for this selector
    #[must_use]
    pub const fn kind(&self) -> MediaKind {
        match self {
            Self::Video { .. } => MediaKind::Video,
            Self::AudioOnly => MediaKind::Audio,
        }
    }

    /// Whether this is the audio-only selector
    #[must_use]
    pub const fn is_audio(&self) -> bool {
        matches!(self, Self::AudioOnly)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Rejected selector text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown selector: {0}")]
pub struct UnknownSelector(pub String);

impl FromStr for Selector {
    type Err = UnknownSelector;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        if lower == AUDIO_WIRE || lower == "audio" {
            return Ok(Self::AudioOnly);
        }
        lower
            .strip_suffix('p')
            .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|digits| digits.parse::<u32>().ok())
            .filter(|height| *height > 0)
            .map(|height| Self::Video { height })
            .ok_or_else(|| UnknownSelector(s.to_string()))
    }
}

/// Normalize an option list: video heights descending without duplicates,
/// followed by exactly one audio-only entry.
///
/// Never returns an empty list.
#[must_use]
pub fn finalize_options(heights: impl IntoIterator<Item = u32>) -> Vec<Selector> {
    let mut heights: Vec<u32> = heights.into_iter().filter(|h| *h > 0).collect();
    heights.sort_unstable_by(|a, b| b.cmp(a));
    heights.dedup();

    let mut options: Vec<Selector> = heights
        .into_iter()
        .map(|height| Selector::Video { height })
        .collect();
    options.push(Selector::AudioOnly);
    options
}
