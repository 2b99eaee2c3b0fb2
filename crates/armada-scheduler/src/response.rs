// The per-cycle event stream handed back by a successful subscribe call.
use armada_codec::{CodecError, Decoder, LengthDelimitedReader, json_unmarshal};
use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::config::runtime_config;
use crate::events::Event;

/// Live event stream for one registration cycle.
///
/// Any resources backing the stream are released when the value is dropped,
/// which happens exactly once per cycle on every controller exit path.
#[async_trait]
pub trait Response: Send {
    /// Decodes the next pushed event into `event`. A non-empty frame may
    /// arrive together with a terminal stream error; `event` is filled
    /// either way, so callers see the final value even as the stream ends.
    async fn decode_event(&mut self, event: &mut Event) -> Result<(), CodecError>;
}

/// `Response` over any framed byte stream, e.g. the body of a long-lived
/// streaming HTTP response.
pub struct FramedResponse<S> {
    decoder: Decoder<LengthDelimitedReader<S>, Event>,
}

impl<S: AsyncRead + Unpin + Send> FramedResponse<S> {
    pub fn new(stream: S) -> Self {
        let reader =
            LengthDelimitedReader::with_max_frame_bytes(stream, runtime_config().max_frame_bytes);
        Self {
            decoder: Decoder::new(reader, json_unmarshal::<Event>()),
        }
    }
}

#[async_trait]
impl<S: AsyncRead + Unpin + Send> Response for FramedResponse<S> {
    async fn decode_event(&mut self, event: &mut Event) -> Result<(), CodecError> {
        self.decoder.decode(event).await
    }
}
