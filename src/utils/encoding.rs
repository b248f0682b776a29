//! Character-set handling for receiver response bodies
//!
//! Older receiver firmwares answer with ISO-8859-1 bodies, sometimes without
//! declaring it. Decoding strategy:
//! 1. `Content-Type` declares UTF-8: pass through.
//! 2. `Content-Type` declares ISO-8859-1/latin1: convert byte-wise.
//! 3. No usable declaration: if any byte is >= 0x80 and the buffer is not
//!    valid UTF-8, treat it as latin-1; otherwise pass through.

/// Decode a response body into a `String` honouring the declared charset.
pub fn decode_body(bytes: &[u8], content_type: Option<&str>) -> String {
    let declared = content_type.map(|ct| ct.to_ascii_lowercase());

    if let Some(ct) = &declared {
        if ct.contains("utf-8") || ct.contains("utf8") {
            return String::from_utf8_lossy(bytes).into_owned();
        }
        if ct.contains("iso-8859-1") || ct.contains("latin1") || ct.contains("latin-1") {
            return latin1_to_utf8(bytes);
        }
    }

    if bytes.iter().any(|b| *b >= 0x80) && std::str::from_utf8(bytes).is_err() {
        return latin1_to_utf8(bytes);
    }

    String::from_utf8_lossy(bytes).into_owned()
}

/// Byte-wise latin-1 to UTF-8 conversion.
///
/// Every latin-1 byte maps to the Unicode code point of the same value, so
/// `b as char` yields exactly the two-byte UTF-8 sequence for bytes >= 0x80.
pub fn latin1_to_utf8(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_declared_passes_through() {
        let body = "Küche".as_bytes();
        assert_eq!(
            decode_body(body, Some("application/json; charset=utf-8")),
            "Küche"
        );
    }

    #[test]
    fn latin1_declared_is_converted() {
        // "Küche" in latin-1: K 0xFC c h e
        let body = [0x4B, 0xFC, 0x63, 0x68, 0x65];
        assert_eq!(
            decode_body(&body, Some("text/html; charset=ISO-8859-1")),
            "Küche"
        );
    }

    #[test]
    fn undeclared_latin1_is_sniffed() {
        let body = [0x4B, 0xFC, 0x63, 0x68, 0x65];
        assert_eq!(decode_body(&body, None), "Küche");
    }

    #[test]
    fn undeclared_valid_utf8_passes_through() {
        let body = "Küche".as_bytes();
        assert_eq!(decode_body(body, None), "Küche");
    }

    #[test]
    fn plain_ascii_is_untouched() {
        assert_eq!(decode_body(b"News at Six", None), "News at Six");
    }
}
