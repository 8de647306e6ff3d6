use crate::errors::WropenError;
use encoding_rs::Encoding;

/// Look up a WHATWG charset label (`utf-8`, `latin1`, `shift_jis`, ...).
///
/// Labels follow the WHATWG Encoding Standard, so `latin1` and `iso-8859-1` name
/// windows-1252, not ISO-8859-1.
pub fn resolve_encoding(label: &str) -> Result<&'static Encoding, WropenError> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| WropenError::UnknownEncoding(label.to_string()))
}

/// Encode `text` with the charset named by `label`.
///
/// Fails with `Encode` when the charset cannot represent some character of `text`,
/// and for charsets encoding_rs can only decode (UTF-16LE/BE, `replacement`).
pub fn encode_text(text: &str, label: &str) -> Result<Vec<u8>, WropenError> {
    let encoding = resolve_encoding(label)?;
    if encoding.output_encoding() != encoding {
        return Err(WropenError::Encode(format!(
            "{} is decode-only and cannot encode replies",
            encoding.name()
        )));
    }
    let (bytes, _, had_unmappable) = encoding.encode(text);
    if had_unmappable {
        return Err(WropenError::Encode(format!(
            "{text:?} has characters {} cannot represent",
            encoding.name()
        )));
    }
    Ok(bytes.into_owned())
}
