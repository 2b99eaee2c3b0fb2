// Length-delimited framing and the one-frame-per-call decoder used by
// subscription streams.
use bytes::{Buf, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use std::future::Future;
use tokio::io::{AsyncRead, AsyncReadExt};

pub const MAGIC: u32 = 0x41524d31; // "ARM1"
pub const VERSION: u16 = 1;

/// Default safety cap for any single frame. `LengthDelimitedReader`
/// allocates a buffer sized by the declared length, so the cap bounds what
/// an untrusted peer can make us allocate.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

pub type Result<T> = std::result::Result<T, CodecError>;

#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    /// Clean end of stream: no more frames, nothing went wrong. Callers
    /// distinguish this from real failures by variant match only.
    #[error("stream shutdown")]
    Shutdown,
    #[error("invalid magic number")]
    InvalidMagic,
    #[error("unsupported version {0}")]
    UnsupportedVersion(u16),
    /// The stream ended or the input ran out inside a frame.
    #[error("incomplete frame")]
    Incomplete,
    #[error("frame of {length} bytes exceeds cap of {cap} bytes")]
    FrameTooLarge { length: usize, cap: usize },
    #[error("read frame: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to deserialize frame payload: {0}")]
    Deserialize(serde_json::Error),
}

impl CodecError {
    /// True for the clean end-of-stream sentinel.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, CodecError::Shutdown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub magic: u32,
    pub version: u16,
    pub length: u32,
}

impl FrameHeader {
    pub const LEN: usize = 10;

    // Create a header with the current protocol constants.
    pub fn new(length: u32) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            length,
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        // Always encode in network byte order for portability.
        buf.extend_from_slice(&self.magic.to_be_bytes());
        buf.extend_from_slice(&self.version.to_be_bytes());
        buf.extend_from_slice(&self.length.to_be_bytes());
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        // Validate the header before we trust the length.
        if buf.remaining() < Self::LEN {
            return Err(CodecError::Incomplete);
        }
        let magic = buf.get_u32();
        if magic != MAGIC {
            return Err(CodecError::InvalidMagic);
        }
        let version = buf.get_u16();
        if version != VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }
        let length = buf.get_u32();
        Ok(Self {
            magic,
            version,
            length,
        })
    }
}

/// Encodes one payload as a length-delimited frame.
///
/// ```
/// use armada_codec::{encode_frame, FrameHeader};
///
/// let frame = encode_frame(b"hello").expect("frame");
/// assert_eq!(frame.len(), FrameHeader::LEN + 5);
/// ```
pub fn encode_frame(payload: &[u8]) -> Result<Bytes> {
    let length = u32::try_from(payload.len()).map_err(|_| CodecError::FrameTooLarge {
        length: payload.len(),
        cap: u32::MAX as usize,
    })?;
    let mut buf = BytesMut::with_capacity(FrameHeader::LEN + payload.len());
    FrameHeader::new(length).encode(&mut buf);
    buf.extend_from_slice(payload);
    Ok(buf.freeze())
}

/// Produces one opaque frame per call.
///
/// The last frame and end-of-stream may arrive together, so non-empty bytes
/// may accompany a terminal error. Once a terminal error has been returned
/// the reader is not called again.
pub trait FrameReader {
    fn read_frame(&mut self) -> impl Future<Output = (Bytes, Option<CodecError>)> + Send;
}

/// Unmarshals one frame payload into a caller-supplied target, fully
/// overwriting it on success.
pub type UnmarshalFn<T> = Box<dyn FnMut(&Bytes, &mut T) -> Result<()> + Send>;

/// Unmarshal function for JSON-encoded frame payloads.
pub fn json_unmarshal<T: DeserializeOwned>() -> impl FnMut(&Bytes, &mut T) -> Result<()> + Send {
    |bytes, target| {
        *target = serde_json::from_slice(bytes).map_err(CodecError::Deserialize)?;
        Ok(())
    }
}

/// Turns a sequence of opaque frames into a sequence of typed values, one
/// frame per `decode` call.
///
/// ```
/// use armada_codec::{CodecError, Decoder, FrameReader};
/// use bytes::Bytes;
///
/// struct OneFrame(Option<Bytes>);
///
/// impl FrameReader for OneFrame {
///     async fn read_frame(&mut self) -> (Bytes, Option<CodecError>) {
///         match self.0.take() {
///             Some(bytes) => (bytes, None),
///             None => (Bytes::new(), Some(CodecError::Shutdown)),
///         }
///     }
/// }
///
/// let rt = tokio::runtime::Builder::new_current_thread().build().expect("rt");
/// rt.block_on(async {
///     let reader = OneFrame(Some(Bytes::from_static(b"\"hi\"")));
///     let mut decoder = Decoder::new(reader, armada_codec::json_unmarshal::<String>());
///     let mut value = String::new();
///     decoder.decode(&mut value).await.expect("decode");
///     assert_eq!(value, "hi");
///     let err = decoder.decode(&mut value).await.expect_err("shutdown");
///     assert!(err.is_shutdown());
/// });
/// ```
pub struct Decoder<R, T> {
    reader: R,
    unmarshal: UnmarshalFn<T>,
}

impl<R: FrameReader + Send, T> Decoder<R, T> {
    pub fn new(
        reader: R,
        unmarshal: impl FnMut(&Bytes, &mut T) -> Result<()> + Send + 'static,
    ) -> Self {
        Self {
            reader,
            unmarshal: Box::new(unmarshal),
        }
    }

    /// Decodes the next frame into `target`.
    ///
    /// Reads exactly one frame. If the frame carried bytes they are
    /// unmarshaled into `target` even when the reader signalled end-of-stream
    /// in the same call, so a final "last chunk + stream closed" read still
    /// yields one more value. An unmarshal failure takes precedence over any
    /// reader error signalled in the same call. If no bytes were produced,
    /// `target` is left untouched and the reader error (if any) is forwarded
    /// verbatim.
    pub async fn decode(&mut self, target: &mut T) -> Result<()> {
        let (bytes, source_err) = self.reader.read_frame().await;
        if !bytes.is_empty() {
            (self.unmarshal)(&bytes, target)?;
        }
        match source_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// `FrameReader` over any byte stream carrying length-delimited frames.
pub struct LengthDelimitedReader<S> {
    stream: S,
    max_frame_bytes: usize,
}

impl<S: AsyncRead + Unpin + Send> LengthDelimitedReader<S> {
    pub fn new(stream: S) -> Self {
        Self::with_max_frame_bytes(stream, DEFAULT_MAX_FRAME_BYTES)
    }

    pub fn with_max_frame_bytes(stream: S, max_frame_bytes: usize) -> Self {
        Self {
            stream,
            max_frame_bytes,
        }
    }
}

impl<S: AsyncRead + Unpin + Send> FrameReader for LengthDelimitedReader<S> {
    async fn read_frame(&mut self) -> (Bytes, Option<CodecError>) {
        let mut header_bytes = [0u8; FrameHeader::LEN];
        match read_full(&mut self.stream, &mut header_bytes).await {
            ReadFull::Ok => {}
            // EOF exactly at a frame boundary is the clean shutdown.
            ReadFull::Eof => return (Bytes::new(), Some(CodecError::Shutdown)),
            ReadFull::Short => return (Bytes::new(), Some(CodecError::Incomplete)),
            ReadFull::Err(err) => return (Bytes::new(), Some(CodecError::Io(err))),
        }
        let header = match FrameHeader::decode(&header_bytes) {
            Ok(header) => header,
            Err(err) => return (Bytes::new(), Some(err)),
        };
        let length = header.length as usize;
        // Enforce the cap before allocating.
        if length > self.max_frame_bytes {
            let err = CodecError::FrameTooLarge {
                length,
                cap: self.max_frame_bytes,
            };
            return (Bytes::new(), Some(err));
        }
        // The allocation moves into the returned Bytes, so each frame gets
        // its own buffer.
        let mut payload = BytesMut::zeroed(length);
        match read_full(&mut self.stream, &mut payload[..]).await {
            ReadFull::Ok => {}
            ReadFull::Eof | ReadFull::Short => return (Bytes::new(), Some(CodecError::Incomplete)),
            ReadFull::Err(err) => return (Bytes::new(), Some(CodecError::Io(err))),
        }
        (payload.freeze(), None)
    }
}

enum ReadFull {
    Ok,
    /// End of stream before the first byte of `buf`.
    Eof,
    /// End of stream partway through `buf`.
    Short,
    Err(std::io::Error),
}

async fn read_full<S: AsyncRead + Unpin>(stream: &mut S, buf: &mut [u8]) -> ReadFull {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]).await {
            Ok(0) if filled == 0 => return ReadFull::Eof,
            Ok(0) => return ReadFull::Short,
            Ok(n) => filled += n,
            Err(err) => return ReadFull::Err(err),
        }
    }
    ReadFull::Ok
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let header = FrameHeader::new(42);
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), FrameHeader::LEN);
        let decoded = FrameHeader::decode(&buf).expect("decode");
        assert_eq!(decoded, header);
    }

    #[test]
    fn decode_rejects_invalid_magic() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&0xDEADBEEFu32.to_be_bytes());
        buf.extend_from_slice(&VERSION.to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes());
        let err = FrameHeader::decode(&buf).expect_err("invalid magic");
        assert!(matches!(err, CodecError::InvalidMagic));
    }

    #[test]
    fn decode_rejects_unsupported_version() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&MAGIC.to_be_bytes());
        buf.extend_from_slice(&0xFFFFu16.to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes());
        let err = FrameHeader::decode(&buf).expect_err("unsupported version");
        assert!(matches!(err, CodecError::UnsupportedVersion(0xFFFF)));
    }

    #[test]
    fn decode_rejects_incomplete_header() {
        let err = FrameHeader::decode(b"short").expect_err("incomplete");
        assert!(matches!(err, CodecError::Incomplete));
    }

    #[test]
    fn encode_frame_prefixes_header() {
        let frame = encode_frame(b"payload").expect("frame");
        let header = FrameHeader::decode(&frame).expect("header");
        assert_eq!(header.length, 7);
        assert_eq!(&frame[FrameHeader::LEN..], b"payload");
    }

    #[tokio::test]
    async fn reader_yields_frames_then_shutdown() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&encode_frame(b"one").expect("frame"));
        bytes.extend_from_slice(&encode_frame(b"two").expect("frame"));
        let mut reader = LengthDelimitedReader::new(std::io::Cursor::new(bytes));
        let (frame, err) = reader.read_frame().await;
        assert_eq!(frame, Bytes::from_static(b"one"));
        assert!(err.is_none());
        let (frame, err) = reader.read_frame().await;
        assert_eq!(frame, Bytes::from_static(b"two"));
        assert!(err.is_none());
        let (frame, err) = reader.read_frame().await;
        assert!(frame.is_empty());
        assert!(matches!(err, Some(CodecError::Shutdown)));
    }

    #[tokio::test]
    async fn reader_rejects_truncated_header() {
        let frame = encode_frame(b"payload").expect("frame");
        let bytes = frame[..FrameHeader::LEN - 2].to_vec();
        let mut reader = LengthDelimitedReader::new(std::io::Cursor::new(bytes));
        let (frame, err) = reader.read_frame().await;
        assert!(frame.is_empty());
        assert!(matches!(err, Some(CodecError::Incomplete)));
    }

    #[tokio::test]
    async fn reader_rejects_truncated_payload() {
        let frame = encode_frame(b"payload").expect("frame");
        let bytes = frame[..frame.len() - 3].to_vec();
        let mut reader = LengthDelimitedReader::new(std::io::Cursor::new(bytes));
        let (frame, err) = reader.read_frame().await;
        assert!(frame.is_empty());
        assert!(matches!(err, Some(CodecError::Incomplete)));
    }

    #[tokio::test]
    async fn reader_rejects_oversize_frame() {
        let frame = encode_frame(&[0u8; 64]).expect("frame");
        let mut reader =
            LengthDelimitedReader::with_max_frame_bytes(std::io::Cursor::new(frame.to_vec()), 16);
        let (frame, err) = reader.read_frame().await;
        assert!(frame.is_empty());
        assert!(matches!(
            err,
            Some(CodecError::FrameTooLarge { length: 64, cap: 16 })
        ));
    }
}
