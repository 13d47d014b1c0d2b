use serde::{Deserialize, Serialize};

const MIB: u64 = 1024 * 1024;

/// Destination class of an upload.
///
/// Selects the storage namespace and per-kind validation limits; the
/// chunking protocol itself is identical for all kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UploadKind {
    #[serde(rename = "video")]
    Video,
    #[serde(rename = "thumbnail")]
    Thumbnail,
    #[serde(rename = "channel-image")]
    ChannelImage,
}

impl UploadKind {
    /// Route segment used in the chunk endpoint path.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Thumbnail => "thumbnail",
            Self::ChannelImage => "channel-image",
        }
    }

    /// Storage namespace the assembled artifact is placed under.
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Video => "videos",
            Self::Thumbnail => "thumbnails",
            Self::ChannelImage => "channels",
        }
    }

    /// Maximum declared total file size accepted for this kind.
    pub fn max_file_size(&self) -> u64 {
        match self {
            Self::Video => 500 * MIB,
            Self::Thumbnail => 5 * MIB,
            Self::ChannelImage => 2 * MIB,
        }
    }

    /// Maximum size of a single chunk payload for this kind.
    pub fn max_chunk_size(&self) -> u64 {
        match self {
            Self::Video => 10 * MIB,
            Self::Thumbnail => 2 * MIB,
            Self::ChannelImage => MIB,
        }
    }

    /// Accepted MIME pattern for this kind.
    pub fn accepted_types(&self) -> &'static str {
        match self {
            Self::Video => "video/*",
            Self::Thumbnail | Self::ChannelImage => "image/*",
        }
    }

    /// Extension used when the client file name carries none.
    pub fn default_extension(&self) -> &'static str {
        match self {
            Self::Video => "mp4",
            Self::Thumbnail | Self::ChannelImage => "jpg",
        }
    }
}

impl std::fmt::Display for UploadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UploadKind {
    type Err = UnknownUploadKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(Self::Video),
            "thumbnail" => Ok(Self::Thumbnail),
            "channel-image" => Ok(Self::ChannelImage),
            other => Err(UnknownUploadKind(other.to_string())),
        }
    }
}

/// Error for an unrecognized upload kind route segment.
#[derive(Debug, thiserror::Error)]
#[error("unknown upload kind: {0}")]
pub struct UnknownUploadKind(pub String);
