//! Share/persist encoding of [`PlaygroundState`].
//!
//! `JSON {f, c, v}` → zlib → base64url without padding. The same string goes
//! into the URL fragment and into local storage.

use std::io::{self, Read, Write};

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use playground_common::{HydrationError, PlaygroundState};

/// URL-safe alphabet; emits no padding, accepts it either way.
const FRAGMENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encode `state` in its canonical shareable form.
///
/// # Errors
///
/// Returns an error only if compression fails.
pub fn encode(state: &PlaygroundState) -> io::Result<String> {
    let json = serde_json::to_vec(state).map_err(io::Error::other)?;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(&json)?;
    let compressed = encoder.finish()?;

    Ok(FRAGMENT.encode(compressed))
}

/// Decode a string produced by [`encode`]. A leading `#` is ignored.
///
/// # Errors
///
/// Returns a [`HydrationError`] naming the stage that rejected the input.
pub fn decode(text: &str) -> Result<PlaygroundState, HydrationError> {
    let text = text.trim();
    let text = text.strip_prefix('#').unwrap_or(text);
    if text.is_empty() {
        return Err(HydrationError::Absent);
    }

    let compressed = FRAGMENT.decode(text).map_err(|e| HydrationError::Encoding {
        reason: e.to_string(),
    })?;

    let mut json = Vec::new();
    ZlibDecoder::new(compressed.as_slice())
        .read_to_end(&mut json)
        .map_err(|e| HydrationError::Inflate {
            reason: e.to_string(),
        })?;

    serde_json::from_slice(&json).map_err(|e| HydrationError::Parse {
        reason: e.to_string(),
    })
}
