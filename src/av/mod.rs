//! Core media types shared by the demux boundary, the scheduler and consumers.

mod packet;
mod sample;

pub use packet::*;
pub use sample::*;

/// Compressed media formats a source can surface as a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MediaFormat {
    H264,
    H265,
    VP8,
    VP9,
    AV1,
    MPEG4,
    MJPEG,
    AAC,
    OPUS,
    MP3,
    AC3,
    FLAC,
    PCM,
}

/// The kind of elementary stream a track carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Video,
    Audio,
    Data,
    Subtitle,
}

/// Demuxer codec identifiers (the common demuxer numbering) and the format each maps to.
/// Anything absent here is an unsupported track.
static CODEC_TABLE: &[(u32, MediaFormat)] = &[
    (7, MediaFormat::MJPEG),
    (12, MediaFormat::MPEG4),
    (27, MediaFormat::H264),
    (139, MediaFormat::VP8),
    (167, MediaFormat::VP9),
    (173, MediaFormat::H265),
    (226, MediaFormat::AV1),
    (0x10000, MediaFormat::PCM),
    (0x15001, MediaFormat::MP3),
    (0x15002, MediaFormat::AAC),
    (0x15003, MediaFormat::AC3),
    (0x1500c, MediaFormat::FLAC),
    (0x1503c, MediaFormat::OPUS),
];

/// Demuxer media type codes. Attachments (4) and unknown (-1) are not tracks.
static MEDIA_TYPE_TABLE: &[(i32, MediaType)] = &[
    (0, MediaType::Video),
    (1, MediaType::Audio),
    (2, MediaType::Data),
    (3, MediaType::Subtitle),
];

impl MediaFormat {
    /// Looks up the format for a demuxer codec identifier.
    pub fn from_codec_id(codec_id: u32) -> Option<Self> {
        CODEC_TABLE
            .iter()
            .find(|(id, _)| *id == codec_id)
            .map(|(_, format)| *format)
    }
}

impl MediaType {
    /// Looks up the media type for a demuxer media type code.
    pub fn from_code(code: i32) -> Option<Self> {
        MEDIA_TYPE_TABLE
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, media_type)| *media_type)
    }
}

/// Describes the codec side of a track.
pub trait CodecData: Send + Sync {
    fn media_format(&self) -> MediaFormat;
    fn media_type(&self) -> MediaType;
    fn extra_data(&self) -> Option<&[u8]>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_lookup() {
        assert_eq!(MediaFormat::from_codec_id(27), Some(MediaFormat::H264));
        assert_eq!(MediaFormat::from_codec_id(86018), Some(MediaFormat::AAC));
        assert_eq!(MediaFormat::from_codec_id(86076), Some(MediaFormat::OPUS));
        // mov_text timed text is not a track we render
        assert_eq!(MediaFormat::from_codec_id(94213), None);
        assert_eq!(MediaFormat::from_codec_id(173), Some(MediaFormat::H265));
    }

    #[test]
    fn test_media_type_lookup() {
        assert_eq!(MediaType::from_code(0), Some(MediaType::Video));
        assert_eq!(MediaType::from_code(3), Some(MediaType::Subtitle));
        assert_eq!(MediaType::from_code(4), None);
        assert_eq!(MediaType::from_code(-1), None);
        assert_eq!(MediaType::from_code(1), Some(MediaType::Audio));
    }
}
