//! libavformat-backed container engine.

use std::{
    ffi::{CStr, CString},
    os::raw::c_int,
    path::Path,
    ptr,
};

use ffmpeg_next::{
    Error, Packet, Rational, codec, encoder, ffi, format, media,
    packet::Flags as PacketFlags,
    util::error::{EINVAL, ENOMEM},
};

use crate::{
    engine::{CodecLookup, ContainerContext, ContainerEngine, EngineResult},
    packet::MuxPacket,
    stream::{CodecDescriptor, StreamDescriptor, StreamParams},
};

/// FFmpeg as the container engine and codec registry. Stateless; the process
/// wide libav registries are only read.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegEngine;

impl CodecLookup for FfmpegEngine {
    fn find_by_name(&self, name: &str) -> Option<CodecDescriptor> {
        let cname = CString::new(name).ok()?;
        let ptr = unsafe { ffi::avcodec_descriptor_get_by_name(cname.as_ptr()) };
        if ptr.is_null() {
            return None;
        }
        unsafe {
            let descriptor = &*ptr;
            Some(CodecDescriptor {
                name: CStr::from_ptr(descriptor.name).to_string_lossy().into_owned(),
                id: codec::Id::from(descriptor.id),
                medium: media::Type::from(descriptor.type_),
            })
        }
    }
}

impl ContainerEngine for FfmpegEngine {
    type Context = OutputContext;

    fn allocate_context(&self, format_name: &str, path: &Path) -> EngineResult<OutputContext> {
        OutputContext::alloc(format_name, path)
    }
}

/// libav sizes buffers with a C `int`.
fn buffer_size(len: usize) -> EngineResult<c_int> {
    c_int::try_from(len).map_err(|_| Error::Other { errno: EINVAL })
}

/// Output container whose I/O is opened separately from allocation.
///
/// `format::output` allocates and opens in one step, so the context is
/// allocated by hand and wrapped; everything after that goes through
/// ffmpeg-next. Dropping the handle closes the output if it is still open and
/// frees the context.
pub struct OutputContext {
    inner: format::context::Output,
    path: CString,
    output_open: bool,
}

// The handle is the only owner of the context and is never shared.
unsafe impl Send for OutputContext {}

impl OutputContext {
    fn alloc(format_name: &str, path: &Path) -> EngineResult<Self> {
        let format = CString::new(format_name).map_err(|_| Error::Other { errno: EINVAL })?;
        let path = path
            .to_str()
            .and_then(|p| CString::new(p).ok())
            .ok_or(Error::Other { errno: EINVAL })?;

        let mut ptr = ptr::null_mut();
        let err = unsafe {
            ffi::avformat_alloc_output_context2(
                &mut ptr,
                ptr::null_mut(),
                format.as_ptr(),
                path.as_ptr(),
            )
        };
        if err < 0 {
            return Err(Error::from(err));
        }
        if ptr.is_null() {
            return Err(Error::Bug);
        }
        Ok(Self {
            inner: unsafe { format::context::Output::wrap(ptr) },
            path,
            output_open: false,
        })
    }

    /// Formats flagged `NO_FILE` manage their own I/O.
    fn needs_file(&self) -> bool {
        !self.inner.format().flags().contains(format::Flags::NO_FILE)
    }

    /// Codec parameters for `stream`, with the codec config copied into
    /// padded extradata owned by the parameters.
    fn parameters(stream: &StreamDescriptor) -> EngineResult<codec::Parameters> {
        let mut params = codec::Parameters::new();
        let config = stream.config();
        unsafe {
            let par = params.as_mut_ptr();
            (*par).codec_type = stream.codec().medium.into();
            (*par).codec_id = stream.codec().id.into();
            (*par).bit_rate = stream.bit_rate();

            if !config.is_empty() {
                let size = buffer_size(config.len())?;
                let padded = config.len() + ffi::AV_INPUT_BUFFER_PADDING_SIZE as usize;
                let buf = ffi::av_mallocz(padded) as *mut u8;
                if buf.is_null() {
                    return Err(Error::Other { errno: ENOMEM });
                }
                ptr::copy_nonoverlapping(config.as_ptr(), buf, config.len());
                (*par).extradata = buf;
                (*par).extradata_size = size;
            }

            match *stream.params() {
                StreamParams::Video { width, height, .. } => {
                    (*par).width = width as c_int;
                    (*par).height = height as c_int;
                }
                StreamParams::Audio {
                    channels,
                    sample_rate,
                } => {
                    (*par).sample_rate = sample_rate as c_int;
                    ffi::av_channel_layout_default(&mut (*par).ch_layout, channels as c_int);
                }
            }
        }
        Ok(params)
    }
}

impl ContainerContext for OutputContext {
    fn open_output(&mut self) -> EngineResult<()> {
        if self.output_open {
            return Ok(());
        }
        if self.needs_file() {
            let err = unsafe {
                ffi::avio_open(
                    &mut (*self.inner.as_mut_ptr()).pb,
                    self.path.as_ptr(),
                    ffi::AVIO_FLAG_WRITE as c_int,
                )
            };
            if err < 0 {
                log::error!("failed to open {:?}", self.path);
                return Err(Error::from(err));
            }
        }
        self.output_open = true;
        Ok(())
    }

    fn is_output_open(&self) -> bool {
        self.output_open
    }

    fn write_header(&mut self) -> EngineResult<()> {
        self.inner.write_header().inspect_err(|e| {
            log::error!("failed to write stream header: {}", e);
        })
    }

    fn new_stream_slot(&mut self, descriptor: &StreamDescriptor) -> EngineResult<usize> {
        let params = Self::parameters(descriptor)?;
        let mut stream = self
            .inner
            .add_stream(encoder::find(descriptor.codec().id))
            .inspect_err(|e| log::error!("failed to allocate new stream: {}", e))?;
        stream.set_parameters(params);
        stream.set_time_base(descriptor.time_base());
        if let StreamParams::Video { frame_rate, .. } = *descriptor.params() {
            stream.set_avg_frame_rate(Rational::new(frame_rate as i32, 1));
        }
        Ok(stream.index())
    }

    fn write_interleaved_packet(&mut self, packet: MuxPacket<'_>) -> EngineResult<()> {
        buffer_size(packet.data.len())?;
        let out_time_base = self
            .inner
            .stream(packet.stream_index)
            .ok_or(Error::StreamNotFound)?
            .time_base();

        let mut av_packet = Packet::copy(packet.data);
        av_packet.set_stream(packet.stream_index);
        // Samples arrive in decode order with a single timestamp.
        av_packet.set_pts(Some(packet.pts));
        av_packet.set_dts(Some(packet.pts));
        av_packet.set_position(-1);
        if packet.is_key {
            av_packet.set_flags(PacketFlags::KEY);
        }
        av_packet.rescale_ts(packet.time_base, out_time_base);
        av_packet.write_interleaved(&mut self.inner)
    }

    fn write_trailer(&mut self) -> EngineResult<()> {
        self.inner.write_trailer().inspect_err(|e| {
            log::error!("failed to write trailer: {}", e);
        })
    }

    fn close_output(&mut self) -> EngineResult<()> {
        if !self.output_open {
            return Ok(());
        }
        self.output_open = false;
        if self.needs_file() {
            let err = unsafe { ffi::avio_closep(&mut (*self.inner.as_mut_ptr()).pb) };
            if err < 0 {
                return Err(Error::from(err));
            }
        }
        Ok(())
    }
}

impl Drop for OutputContext {
    fn drop(&mut self) {
        if let Err(e) = self.close_output() {
            log::warn!("close output on drop failed: {}", e);
        }
    }
}
