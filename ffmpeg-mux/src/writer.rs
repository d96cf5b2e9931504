use crate::{
    engine::{CodecLookup, ContainerContext},
    error::{EngineOp, MuxError, Result, translate},
    packet::{MuxPacket, Sample},
    stream::StreamRegistry,
};

/// Validates `sample` against the registry and forwards it to the engine's
/// interleaving writer.
///
/// Timestamps are passed through untouched: the writer does not check
/// per-stream monotonicity, and whatever the engine decides about an
/// out-of-order timestamp is reported as-is.
pub fn write_sample<C, L>(
    context: &mut C,
    registry: &mut StreamRegistry<L>,
    sample: Sample<'_>,
) -> Result<()>
where
    C: ContainerContext,
    L: CodecLookup,
{
    let stream = registry.get(sample.stream_index).ok_or_else(|| {
        MuxError::invalid_argument(format!(
            "stream index {} is not declared ({} streams)",
            sample.stream_index,
            registry.len()
        ))
    })?;

    let packet = MuxPacket {
        stream_index: stream.index(),
        data: sample.data,
        pts: sample.pts,
        time_base: stream.time_base(),
        is_key: sample.flags.is_key(),
    };

    if let Err(e) = context.write_interleaved_packet(packet) {
        log::error!(
            "write sample failed: stream={} pts={} size={}: {}",
            sample.stream_index,
            sample.pts,
            sample.size(),
            e
        );
        return Err(translate(
            EngineOp::WriteInterleaved {
                stream_index: sample.stream_index,
            },
            "",
            e,
        ));
    }

    registry.record_write(sample.stream_index, sample.size(), sample.pts);
    Ok(())
}
