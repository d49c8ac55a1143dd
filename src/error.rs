use thiserror::Error;

/// Failures reported by a decoder engine.
///
/// None of these are fatal to the controller: they are forwarded to the
/// listener as a message and the playback state is left alone.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unable to query device decoders for {codec}")]
    QueryingDecoders { codec: String },

    #[error("no decoder available for {mime}")]
    NoDecoder { mime: String },

    #[error("unable to instantiate decoder {name}")]
    InstantiatingDecoder { name: String },

    #[error("audio output unavailable: {0}")]
    Output(String),

    #[error("stream request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("stream returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("decoder failure: {0}")]
    Codec(#[from] symphonia::core::errors::Error),

    #[error("{0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_message_is_verbatim() {
        let err = EngineError::Decode("decoder X unavailable".to_string());
        assert_eq!(err.to_string(), "decoder X unavailable");
    }

    #[test]
    fn test_decoder_init_messages() {
        let err = EngineError::NoDecoder { mime: "audio/mpeg".to_string() };
        assert_eq!(err.to_string(), "no decoder available for audio/mpeg");

        let err = EngineError::InstantiatingDecoder { name: "mp3".to_string() };
        assert_eq!(err.to_string(), "unable to instantiate decoder mp3");

        let err = EngineError::QueryingDecoders { codec: "CodecType(4096)".to_string() };
        assert_eq!(err.to_string(), "unable to query device decoders for CodecType(4096)");
    }
}
