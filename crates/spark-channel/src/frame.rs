//! 线上成帧：每段负载前置 4 字节主机字节序长度头，除此之外不做任何成帧。

use spark_channel_buffer::ChannelBuffer;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ChannelError;

/// 长度头字节数。
pub const HEADER_LEN: usize = 4;

pub(crate) const READ_HEADER: &str = "read header";
pub(crate) const READ_PAYLOAD: &str = "read payload";
pub(crate) const DRAIN_PAYLOAD: &str = "drain payload";
pub(crate) const WRITE_FRAME: &str = "write frame";
pub(crate) const SHUTDOWN: &str = "shutdown";
pub(crate) const FLUSH: &str = "flush";

pub fn encode_header(len: u32) -> [u8; HEADER_LEN] {
    len.to_ne_bytes()
}

pub fn decode_header(header: [u8; HEADER_LEN]) -> u32 {
    u32::from_ne_bytes(header)
}

/// 负载长度必须能装进长度头。
pub(crate) fn checked_len(len: u64) -> Result<u32, ChannelError> {
    u32::try_from(len).map_err(|_| ChannelError::PayloadTooLarge { len })
}

/// 收包目标：带适配器的缓冲，或无适配器的定长视图。
pub(crate) enum RecvTarget<'a> {
    Adapter(&'a mut dyn ChannelBuffer),
    Fixed(&'a mut [u8]),
}

/// 按宣告长度准备目标区间。
///
/// - 适配器尺寸不等时尝试 `resize`，被拒绝即 `ResizeRejected`；
/// - 定长视图必须与宣告长度相等，否则 `LengthMismatch` 且目标不被触碰。
fn prepare(target: RecvTarget<'_>, announced: u32) -> Result<&mut [u8], ChannelError> {
    let wanted = u64::from(announced);
    match target {
        RecvTarget::Fixed(dest) => {
            if dest.len() as u64 != wanted {
                return Err(ChannelError::LengthMismatch {
                    expected: dest.len() as u64,
                    announced,
                });
            }
            Ok(dest)
        }
        RecvTarget::Adapter(buffer) => {
            let kind = buffer.kind();
            if buffer.size() != wanted && !buffer.resize(wanted) {
                return Err(ChannelError::ResizeRejected {
                    announced,
                    buffer: kind,
                });
            }
            buffer
                .data_mut()
                .ok_or(ChannelError::BufferNotWritable { buffer: kind })
        }
    }
}

pub(crate) async fn read_header<R>(reader: &mut R) -> Result<u32, ChannelError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    reader
        .read_exact(&mut header)
        .await
        .map_err(|err| ChannelError::stream(READ_HEADER, err))?;
    Ok(decode_header(header))
}

/// 丢弃 `len` 字节负载，保证协议不匹配后流仍然成帧。
pub(crate) async fn drain<R>(reader: &mut R, len: u32) -> Result<(), ChannelError>
where
    R: AsyncRead + Unpin,
{
    let wanted = u64::from(len);
    let copied = tokio::io::copy(&mut (&mut *reader).take(wanted), &mut tokio::io::sink())
        .await
        .map_err(|err| ChannelError::stream(DRAIN_PAYLOAD, err))?;
    if copied < wanted {
        return Err(ChannelError::stream(
            DRAIN_PAYLOAD,
            io::Error::from(io::ErrorKind::UnexpectedEof),
        ));
    }
    Ok(())
}

/// 超过上限的长度头直接排空并失败，避免按对端宣告值无界分配。
pub(crate) async fn reject_oversized<R>(reader: &mut R, announced: u32, limit: u32) -> Result<(), ChannelError>
where
    R: AsyncRead + Unpin,
{
    if announced <= limit {
        return Ok(());
    }
    drain(reader, announced).await?;
    Err(ChannelError::FrameTooLarge {
        len: announced,
        limit,
    })
}

/// 读取长度头之后的负载。协议不匹配只影响本操作，流失败需由调用方级联。
pub(crate) async fn read_payload<R>(
    reader: &mut R,
    target: RecvTarget<'_>,
    announced: u32,
) -> Result<u64, ChannelError>
where
    R: AsyncRead + Unpin,
{
    let dest = match prepare(target, announced) {
        Ok(dest) => dest,
        Err(mismatch) => {
            drain(reader, announced).await?;
            return Err(mismatch);
        }
    };
    reader
        .read_exact(dest)
        .await
        .map_err(|err| ChannelError::stream(READ_PAYLOAD, err))?;
    Ok(u64::from(announced))
}

/// 依次写出长度头与负载并刷新。
pub(crate) async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<u64, ChannelError>
where
    W: AsyncWrite + Unpin,
{
    let len = checked_len(payload.len() as u64)?;
    writer
        .write_all(&encode_header(len))
        .await
        .map_err(|err| ChannelError::stream(WRITE_FRAME, err))?;
    writer
        .write_all(payload)
        .await
        .map_err(|err| ChannelError::stream(WRITE_FRAME, err))?;
    writer
        .flush()
        .await
        .map_err(|err| ChannelError::stream(FLUSH, err))?;
    Ok(u64::from(len))
}
