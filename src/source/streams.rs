use crate::av::{CodecData, MediaFormat, MediaType, Packet};
use crate::format::StreamInfo;
use crate::time::RationalTime;
use crate::{PlayoutError, Result};
use bytes::Bytes;
use log::debug;
use std::collections::BTreeSet;

/// A track the source plays, fixed at open time.
#[derive(Debug, Clone)]
pub struct StreamDescriptor {
    /// Demuxer stream index.
    pub index: usize,
    pub media_format: MediaFormat,
    pub media_type: MediaType,
    /// Duration of one packet timestamp tick.
    pub timebase: RationalTime,
    /// First valid presentation time; the timebase zero point when unknown.
    pub start_time: RationalTime,
    /// `start_time` in ticks, used as the rewind target.
    pub start_ticks: i64,
    /// Whether the container reported `start_time`.
    pub start_known: bool,
    pub extradata: Option<Bytes>,
}

impl StreamDescriptor {
    /// Builds a descriptor, or `None` for a codec or media type we do not surface.
    pub fn from_info(info: &StreamInfo) -> Option<Self> {
        let media_format = MediaFormat::from_codec_id(info.codec_id)?;
        let media_type = MediaType::from_code(info.media_type)?;
        let start_ticks = info.start_time.unwrap_or(0);

        Some(Self {
            index: info.index,
            media_format,
            media_type,
            timebase: info.timebase,
            start_time: RationalTime::from_ticks(start_ticks, info.timebase),
            start_ticks,
            start_known: info.start_time.is_some(),
            extradata: info.extradata.clone().filter(|data| !data.is_empty()),
        })
    }

    /// Stream-local `(pts, dts)` of a packet.
    ///
    /// A missing pts falls back to the timebase zero point, a missing dts to the pts.
    pub fn translate(&self, packet: &Packet) -> (RationalTime, RationalTime) {
        let pts = match packet.pts {
            Some(ticks) => RationalTime::from_ticks(ticks, self.timebase),
            None => RationalTime::zero(self.timebase.scale()),
        };
        let dts = match packet.dts {
            Some(ticks) => RationalTime::from_ticks(ticks, self.timebase),
            None => pts,
        };
        (pts, dts)
    }
}

impl CodecData for StreamDescriptor {
    fn media_format(&self) -> MediaFormat {
        self.media_format
    }

    fn media_type(&self) -> MediaType {
        self.media_type
    }

    fn extra_data(&self) -> Option<&[u8]> {
        self.extradata.as_deref()
    }
}

/// The retained tracks of an opened source.
#[derive(Debug, Clone)]
pub struct StreamTable {
    streams: Vec<StreamDescriptor>,
    earliest_start: RationalTime,
}

impl StreamTable {
    /// Keeps every stream with a known codec and media type.
    ///
    /// Fails with [`PlayoutError::Unsupported`] when nothing is left.
    pub fn build(infos: &[StreamInfo]) -> Result<Self> {
        let streams: Vec<StreamDescriptor> = infos
            .iter()
            .filter_map(|info| {
                let descriptor = StreamDescriptor::from_info(info);
                if descriptor.is_none() {
                    debug!(
                        "dropping stream {} (codec {}, media type {})",
                        info.index, info.codec_id, info.media_type
                    );
                }
                descriptor
            })
            .collect();

        let earliest_start = streams
            .iter()
            .map(|s| s.start_time)
            .min()
            .ok_or_else(|| {
                PlayoutError::Unsupported(format!("none of {} streams is playable", infos.len()))
            })?;

        Ok(Self {
            streams,
            earliest_start,
        })
    }

    pub fn get(&self, index: usize) -> Option<&StreamDescriptor> {
        self.streams.iter().find(|s| s.index == index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StreamDescriptor> {
        self.streams.iter()
    }

    pub fn as_slice(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Smallest start time across tracks; where a playthrough begins.
    pub fn earliest_start(&self) -> RationalTime {
        self.earliest_start
    }

    pub fn formats(&self) -> BTreeSet<MediaFormat> {
        self.streams.iter().map(|s| s.media_format).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn video() -> StreamInfo {
        StreamInfo::new(0, 27, 0, RationalTime::new(1, 90000))
            .with_start_time(9000)
            .with_extradata(vec![0x67u8, 0x42])
    }

    fn audio() -> StreamInfo {
        StreamInfo::new(1, 86018, 1, RationalTime::new(1, 48000)).with_extradata(Vec::<u8>::new())
    }

    fn timed_text() -> StreamInfo {
        StreamInfo::new(2, 94213, 3, RationalTime::new(1, 1000))
    }

    #[test]
    fn test_unsupported_streams_are_dropped() {
        let table = StreamTable::build(&[video(), audio(), timed_text()]).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.get(2).is_none());
        assert_eq!(
            table.formats().into_iter().collect::<Vec<_>>(),
            vec![MediaFormat::H264, MediaFormat::AAC]
        );
    }

    #[test]
    fn test_no_playable_stream_is_unsupported() {
        let err = StreamTable::build(&[timed_text()]).unwrap_err();
        assert!(matches!(err, PlayoutError::Unsupported(_)));
        assert!(matches!(StreamTable::build(&[]), Err(PlayoutError::Unsupported(_))));
    }

    #[test]
    fn test_descriptor_fields() {
        let table = StreamTable::build(&[video(), audio()]).unwrap();

        let v = table.get(0).unwrap();
        assert_eq!(v.start_time, RationalTime::new(1, 10));
        assert!(v.start_known);
        assert_eq!(v.extra_data(), Some(&[0x67, 0x42][..]));

        let a = table.get(1).unwrap();
        assert_eq!(a.start_time, RationalTime::zero(48000));
        assert!(!a.start_known);
        assert_eq!(a.extradata, None, "empty extradata is not kept");

        assert_eq!(table.earliest_start(), RationalTime::ZERO);
    }

    #[test]
    fn test_translate_fallbacks() {
        let table = StreamTable::build(&[video()]).unwrap();
        let v = table.get(0).unwrap();

        let (pts, dts) = v.translate(&Packet::new(vec![1u8]).with_pts(93000).with_dts(90000));
        assert_eq!(pts, RationalTime::new(93000, 90000));
        assert_eq!(dts, RationalTime::new(1, 1));

        let (pts, dts) = v.translate(&Packet::new(vec![1u8]).with_pts(45000));
        assert_eq!(dts, pts);

        let (pts, dts) = v.translate(&Packet::new(vec![1u8]));
        assert_eq!(pts, RationalTime::ZERO);
        assert_eq!(dts, RationalTime::ZERO);
        assert_eq!(pts.scale(), 90000);
    }
}
