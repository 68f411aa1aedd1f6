//! Charset recovery for column bytes that are not plain UTF-8.
//!
//! MySQL hands row values over as raw bytes in the column's declared
//! charset. UTF-32BE and UTF-16BE columns would otherwise arrive as
//! NUL-riddled garbage, so this module converts them; anything it cannot
//! make sense of passes through untouched. The apply path never drops an
//! event over charset trouble.

/// How many leading bytes the zero-byte heuristics inspect.
const PROBE_LEN: usize = 100;

/// Decode raw column bytes into UTF-8 text.
///
/// Returns `None` when the bytes should be kept as-is (binary data, or a
/// decode failure); the caller then carries the raw bytes through
/// unchanged.
pub fn decode_bytes(raw: &[u8], declared: Option<&str>) -> Option<String> {
    if raw.is_empty() {
        return Some(String::new());
    }

    let zeros = zero_ratio(raw);

    // Fast path: already valid UTF-8 with few embedded NULs.
    if zeros < 0.10
        && let Ok(text) = std::str::from_utf8(raw)
    {
        return Some(text.to_owned());
    }

    let declared_utf32 = matches!(declared, Some("utf32") | Some("utf32be"));
    if declared_utf32 || zeros > 0.25 {
        if let Some(text) = decode_utf32be(raw) {
            return Some(text);
        }
    }

    decode_utf16be(raw)
}

fn zero_ratio(raw: &[u8]) -> f64 {
    let probe = &raw[..raw.len().min(PROBE_LEN)];
    let zeros = probe.iter().filter(|b| **b == 0).count();
    zeros as f64 / probe.len() as f64
}

fn decode_utf32be(raw: &[u8]) -> Option<String> {
    if raw.len() % 4 != 0 {
        return None;
    }

    let mut out = String::with_capacity(raw.len() / 4);
    for chunk in raw.chunks_exact(4) {
        let cp = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        if cp == 0 {
            // terminating U+0000
            continue;
        }
        if cp > 0x10FFFF || (0xD800..=0xDFFF).contains(&cp) {
            return None;
        }
        out.push(char::from_u32(cp)?);
    }
    Some(out)
}

fn decode_utf16be(raw: &[u8]) -> Option<String> {
    if raw.len() % 2 != 0 {
        return None;
    }

    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
        .collect();

    let trimmed = match units.last() {
        Some(0) => &units[..units.len() - 1],
        _ => &units[..],
    };

    String::from_utf16(trimmed).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_utf8_passes_through_byte_identical() {
        let input = "héllo wörld";
        assert_eq!(
            decode_bytes(input.as_bytes(), None).as_deref(),
            Some(input)
        );
    }

    #[test]
    fn empty_input_is_empty_string() {
        assert_eq!(decode_bytes(b"", Some("utf32")).as_deref(), Some(""));
    }

    #[test]
    fn utf32be_by_declared_charset() {
        // "AB" in UTF-32BE
        let raw = [0x00, 0x00, 0x00, 0x41, 0x00, 0x00, 0x00, 0x42];
        assert_eq!(decode_bytes(&raw, Some("utf32")).as_deref(), Some("AB"));
    }

    #[test]
    fn utf32be_by_zero_heuristic_without_declaration() {
        let raw = [0x00, 0x00, 0x00, 0x41, 0x00, 0x00, 0x00, 0x42];
        assert_eq!(decode_bytes(&raw, None).as_deref(), Some("AB"));
    }

    #[test]
    fn utf32be_skips_terminating_nul() {
        let raw = [0x00, 0x00, 0x00, 0x41, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(decode_bytes(&raw, Some("utf32be")).as_deref(), Some("A"));
    }

    #[test]
    fn utf32be_rejects_surrogate_code_points() {
        // 0xD800 is a lone surrogate; decode must fall through to raw
        let raw = [0x00, 0x00, 0xD8, 0x00];
        assert_eq!(decode_bytes(&raw, Some("utf32")), None);
    }

    #[test]
    fn utf32be_rejects_out_of_range_code_points() {
        let raw = [0x00, 0x11, 0x00, 0x00];
        assert_eq!(decode_bytes(&raw, Some("utf32")), None);
    }

    #[test]
    fn utf16be_fallback() {
        // "Hi" in UTF-16BE: enough zeros to leave the fast path, not
        // enough for the UTF-32 heuristic on odd-length-for-4 input
        let raw = [0x00, 0x48, 0x00, 0x69, 0x00, 0x21];
        assert_eq!(decode_bytes(&raw, None).as_deref(), Some("Hi!"));
    }

    #[test]
    fn utf16be_surrogate_pair() {
        // U+1F600 as a UTF-16BE surrogate pair, terminated
        let raw = [0xD8, 0x3D, 0xDE, 0x00, 0x00, 0x00];
        assert_eq!(decode_bytes(&raw, None).as_deref(), Some("\u{1F600}"));
    }

    #[test]
    fn undecodable_bytes_return_none() {
        // invalid UTF-8, not UTF-32/UTF-16 shaped
        let raw = [0xFF, 0x00, 0xFE, 0x00, 0x00];
        assert_eq!(decode_bytes(&raw, None), None);
    }
}
