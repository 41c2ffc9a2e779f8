//! Data-phase framing.
//!
//! ```text
//! Frame = Length[2] ‖ AEAD(Block*)[Length]
//! Block = Type[1] ‖ Size[2] ‖ Data[Size]
//! ```
//!
//! Each direction has its own cipher, so the writer half and the reader half
//! of an established stream can live on different tasks. A padding block, if
//! present, must be the last block of its frame.

use bytes::{BufMut, BytesMut};
use i2p_crypto::noise::TAG_LEN;
use i2p_crypto::{ReceivingCipher, SendingCipher};
use rand::RngCore;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::Ntcp2Error;

/// Largest encrypted frame, as bounded by the 2-byte length.
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;
/// Largest plaintext that fits a frame.
pub const MAX_FRAME_PAYLOAD: usize = MAX_FRAME_LEN - TAG_LEN;
pub const BLOCK_HEADER_SIZE: usize = 3;
/// Largest data a single block can carry inside one frame.
pub const MAX_BLOCK_DATA: usize = MAX_FRAME_PAYLOAD - BLOCK_HEADER_SIZE;

pub const BLOCK_DATE_TIME: u8 = 0;
pub const BLOCK_OPTIONS: u8 = 1;
pub const BLOCK_ROUTER_INFO: u8 = 2;
pub const BLOCK_MESSAGE: u8 = 3;
pub const BLOCK_TERMINATION: u8 = 4;
/// Raw stream bytes. Uses the experimental type range.
pub const BLOCK_STREAM: u8 = 224;
pub const BLOCK_PADDING: u8 = 254;

/// Termination reason codes.
pub mod reason {
    pub const NORMAL_CLOSE: u8 = 0;
    pub const AEAD_FAILURE: u8 = 4;
    pub const PAYLOAD_FORMAT_ERROR: u8 = 10;
    pub const QUEUE_OVERFLOW: u8 = 11;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// Sender's clock, seconds since the epoch.
    DateTime(u32),
    Options(Vec<u8>),
    RouterInfo { flags: u8, data: Vec<u8> },
    /// An opaque application message.
    Message(Vec<u8>),
    Termination { valid_frames: u64, reason: u8 },
    Stream(Vec<u8>),
    /// Random padding of the given length. Content is never inspected.
    Padding(usize),
    /// A block type this implementation skips.
    Unknown { kind: u8, data: Vec<u8> },
}

impl Block {
    pub fn kind(&self) -> u8 {
        match self {
            Block::DateTime(_) => BLOCK_DATE_TIME,
            Block::Options(_) => BLOCK_OPTIONS,
            Block::RouterInfo { .. } => BLOCK_ROUTER_INFO,
            Block::Message(_) => BLOCK_MESSAGE,
            Block::Termination { .. } => BLOCK_TERMINATION,
            Block::Stream(_) => BLOCK_STREAM,
            Block::Padding(_) => BLOCK_PADDING,
            Block::Unknown { kind, .. } => *kind,
        }
    }

    fn data_len(&self) -> usize {
        match self {
            Block::DateTime(_) => 4,
            Block::Options(data)
            | Block::Message(data)
            | Block::Stream(data)
            | Block::Unknown { data, .. } => data.len(),
            Block::RouterInfo { data, .. } => 1 + data.len(),
            Block::Termination { .. } => 9,
            Block::Padding(len) => *len,
        }
    }

    /// Bytes this block occupies in a frame, header included.
    pub fn encoded_len(&self) -> usize {
        BLOCK_HEADER_SIZE + self.data_len()
    }

    fn write(&self, buf: &mut BytesMut) -> Result<(), Ntcp2Error> {
        let size = self.data_len();
        if size > MAX_BLOCK_DATA {
            return Err(Ntcp2Error::TooLarge {
                context: "block",
                declared: size,
                max: MAX_BLOCK_DATA,
            });
        }
        buf.put_u8(self.kind());
        buf.put_u16(size as u16);
        match self {
            Block::DateTime(secs) => buf.put_u32(*secs),
            Block::Options(data)
            | Block::Message(data)
            | Block::Stream(data)
            | Block::Unknown { data, .. } => buf.put_slice(data),
            Block::RouterInfo { flags, data } => {
                buf.put_u8(*flags);
                buf.put_slice(data);
            }
            Block::Termination {
                valid_frames,
                reason,
            } => {
                buf.put_u64(*valid_frames);
                buf.put_u8(*reason);
            }
            Block::Padding(len) => {
                let start = buf.len();
                buf.resize(start + len, 0);
                rand::thread_rng().fill_bytes(&mut buf[start..]);
            }
        }
        Ok(())
    }
}

pub fn encode_blocks(blocks: &[Block]) -> Result<Vec<u8>, Ntcp2Error> {
    let mut buf = BytesMut::with_capacity(blocks.iter().map(Block::encoded_len).sum());
    for block in blocks {
        block.write(&mut buf)?;
    }
    Ok(buf.to_vec())
}

pub fn decode_blocks(mut data: &[u8]) -> Result<Vec<Block>, Ntcp2Error> {
    const CONTEXT: &str = "frame";

    let mut blocks = Vec::new();
    while !data.is_empty() {
        if matches!(blocks.last(), Some(Block::Padding(_))) {
            return Err(Ntcp2Error::protocol(CONTEXT, "block after padding"));
        }
        if data.len() < BLOCK_HEADER_SIZE {
            return Err(Ntcp2Error::protocol(CONTEXT, "truncated block header"));
        }
        let kind = data[0];
        let size = usize::from(u16::from_be_bytes([data[1], data[2]]));
        let rest = &data[BLOCK_HEADER_SIZE..];
        if size > rest.len() {
            return Err(Ntcp2Error::protocol(
                CONTEXT,
                format!("block {} declares {} bytes, {} remain", kind, size, rest.len()),
            ));
        }
        let (body, next) = rest.split_at(size);
        data = next;

        let block = match kind {
            BLOCK_DATE_TIME => {
                let secs: [u8; 4] = body
                    .try_into()
                    .map_err(|_| Ntcp2Error::protocol(CONTEXT, "date time block size"))?;
                Block::DateTime(u32::from_be_bytes(secs))
            }
            BLOCK_OPTIONS => Block::Options(body.to_vec()),
            BLOCK_ROUTER_INFO => {
                let (flags, ri) = body
                    .split_first()
                    .ok_or_else(|| Ntcp2Error::protocol(CONTEXT, "empty router info block"))?;
                Block::RouterInfo {
                    flags: *flags,
                    data: ri.to_vec(),
                }
            }
            BLOCK_MESSAGE => Block::Message(body.to_vec()),
            BLOCK_TERMINATION => {
                if body.len() < 9 {
                    return Err(Ntcp2Error::protocol(CONTEXT, "termination block size"));
                }
                let mut frames = [0u8; 8];
                frames.copy_from_slice(&body[..8]);
                Block::Termination {
                    valid_frames: u64::from_be_bytes(frames),
                    reason: body[8],
                }
            }
            BLOCK_STREAM => Block::Stream(body.to_vec()),
            BLOCK_PADDING => Block::Padding(size),
            kind => Block::Unknown {
                kind,
                data: body.to_vec(),
            },
        };
        blocks.push(block);
    }
    Ok(blocks)
}

/// Writes encrypted frames to one half of an established stream.
pub struct FrameWriter<W> {
    io: W,
    cipher: SendingCipher,
    frames_sent: u64,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(io: W, cipher: SendingCipher) -> Self {
        Self {
            io,
            cipher,
            frames_sent: 0,
        }
    }

    pub async fn write_blocks(&mut self, blocks: &[Block]) -> Result<(), Ntcp2Error> {
        let payload = encode_blocks(blocks)?;
        if payload.len() > MAX_FRAME_PAYLOAD {
            return Err(Ntcp2Error::TooLarge {
                context: "frame",
                declared: payload.len(),
                max: MAX_FRAME_PAYLOAD,
            });
        }
        let ciphertext = self.cipher.encrypt(&payload)?;

        let mut frame = Vec::with_capacity(2 + ciphertext.len());
        frame.extend_from_slice(&(ciphertext.len() as u16).to_be_bytes());
        frame.extend_from_slice(&ciphertext);
        self.io.write_all(&frame).await?;
        self.io.flush().await?;
        self.frames_sent += 1;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), Ntcp2Error> {
        self.io.shutdown().await?;
        Ok(())
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }
}

/// Reads and decrypts frames from one half of an established stream.
pub struct FrameReader<R> {
    io: R,
    cipher: ReceivingCipher,
    frames_received: u64,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(io: R, cipher: ReceivingCipher) -> Self {
        Self {
            io,
            cipher,
            frames_received: 0,
        }
    }

    /// Next frame's blocks, or `None` when the peer closed cleanly between
    /// frames.
    pub async fn read_frame(&mut self) -> Result<Option<Vec<Block>>, Ntcp2Error> {
        let mut len = [0u8; 2];
        match self.io.read_exact(&mut len).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let len = usize::from(u16::from_be_bytes(len));
        if len < TAG_LEN {
            return Err(Ntcp2Error::protocol(
                "frame",
                format!("length {} shorter than the tag", len),
            ));
        }

        let mut ciphertext = vec![0u8; len];
        self.io.read_exact(&mut ciphertext).await?;
        let payload = self.cipher.decrypt(&ciphertext)?;
        self.frames_received += 1;
        decode_blocks(&payload).map(Some)
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_encode_and_decode() {
        let blocks = vec![
            Block::DateTime(1_700_000_000),
            Block::RouterInfo {
                flags: 0,
                data: vec![1, 2, 3],
            },
            Block::Message(b"hello".to_vec()),
            Block::Stream(vec![9; 40]),
            Block::Termination {
                valid_frames: 12,
                reason: reason::NORMAL_CLOSE,
            },
            Block::Unknown {
                kind: 200,
                data: vec![7],
            },
            Block::Padding(17),
        ];
        let bytes = encode_blocks(&blocks).unwrap();
        assert_eq!(bytes.len(), blocks.iter().map(Block::encoded_len).sum::<usize>());
        assert_eq!(decode_blocks(&bytes).unwrap(), blocks);
    }

    #[test]
    fn overrunning_block_rejected() {
        let mut bytes = encode_blocks(&[Block::Message(vec![0; 10])]).unwrap();
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(
            decode_blocks(&bytes),
            Err(Ntcp2Error::Protocol { .. })
        ));
        assert!(decode_blocks(&[BLOCK_MESSAGE, 0]).is_err());
    }

    #[test]
    fn padding_must_be_last() {
        let bytes = encode_blocks(&[Block::Padding(2), Block::Message(vec![1])]).unwrap();
        assert!(decode_blocks(&bytes).is_err());
    }

    #[test]
    fn malformed_fixed_blocks_rejected() {
        assert!(decode_blocks(&[BLOCK_DATE_TIME, 0, 3, 1, 2, 3]).is_err());
        assert!(decode_blocks(&[BLOCK_TERMINATION, 0, 1, 0]).is_err());
        assert!(decode_blocks(&[BLOCK_ROUTER_INFO, 0, 0]).is_err());
    }

    #[test]
    fn oversize_block_rejected() {
        let block = Block::Message(vec![0; MAX_BLOCK_DATA + 1]);
        assert!(matches!(
            encode_blocks(&[block]),
            Err(Ntcp2Error::TooLarge { context: "block", .. })
        ));
    }
}
