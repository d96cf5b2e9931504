use ffmpeg_next::Rational;

/// Sample flag bits as hosts pass them in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SampleFlags(u32);

impl SampleFlags {
    pub const KEY_FRAME: SampleFlags = SampleFlags(1);
    pub const CODEC_CONFIG: SampleFlags = SampleFlags(2);
    pub const END_OF_STREAM: SampleFlags = SampleFlags(4);
    pub const PARTIAL_FRAME: SampleFlags = SampleFlags(8);

    pub const fn empty() -> Self {
        SampleFlags(0)
    }

    /// Keeps unknown bits; they are carried but never forwarded.
    pub const fn from_bits(bits: u32) -> Self {
        SampleFlags(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: SampleFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_key(self) -> bool {
        self.contains(Self::KEY_FRAME)
    }
}

impl std::ops::BitOr for SampleFlags {
    type Output = SampleFlags;

    fn bitor(self, rhs: SampleFlags) -> SampleFlags {
        SampleFlags(self.0 | rhs.0)
    }
}

/// One encoded sample as handed to [`crate::muxer::Muxer::write_sample`].
///
/// `pts` is in the target stream's time base. The data is only borrowed for
/// the duration of the write.
#[derive(Debug, Clone, Copy)]
pub struct Sample<'a> {
    pub stream_index: usize,
    pub data: &'a [u8],
    pub pts: i64,
    pub flags: SampleFlags,
}

impl<'a> Sample<'a> {
    pub fn new(stream_index: usize, data: &'a [u8], pts: i64, flags: SampleFlags) -> Self {
        Self {
            stream_index,
            data,
            pts,
            flags,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Validated packet on its way into the engine.
#[derive(Debug, Clone, Copy)]
pub struct MuxPacket<'a> {
    pub stream_index: usize,
    pub data: &'a [u8],
    pub pts: i64,
    /// Time base `pts` is expressed in (the stream's declared time base).
    pub time_base: Rational,
    pub is_key: bool,
}
