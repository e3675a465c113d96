//! Encoding-normalized text reading.
//!
//! Cue sheets and descriptor files in the wild arrive as UTF-8 with or
//! without a BOM, or in a legacy regional encoding (typically GBK). Callers
//! always receive valid Unicode.

use std::io;
use std::path::Path;

use chardetng::EncodingDetector;
use encoding_rs::GBK;
use tracing::debug;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Read a text file, transparently handling a UTF-8 BOM, plain UTF-8, and a
/// legacy single/double-byte fallback encoding.
pub fn read_text_file(path: &Path) -> io::Result<String> {
    let data = std::fs::read(path)?;
    decode_text(&data, path)
}

fn decode_text(data: &[u8], path: &Path) -> io::Result<String> {
    if let Some(stripped) = data.strip_prefix(UTF8_BOM) {
        debug!("detected UTF-8 BOM in {}", path.display());
        return String::from_utf8(stripped.to_vec())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e));
    }

    if let Ok(text) = std::str::from_utf8(data) {
        return Ok(text.to_string());
    }

    // Not UTF-8: sniff the legacy encoding, defaulting to GBK.
    let mut detector = EncodingDetector::new();
    detector.feed(data, true);
    let encoding = detector.guess(None, true);
    let encoding = if encoding == encoding_rs::UTF_8 {
        GBK
    } else {
        encoding
    };
    debug!(
        "decoding {} as {}",
        path.display(),
        encoding.name()
    );

    let (text, _, had_errors) = encoding.decode(data);
    if had_errors {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "failed to decode {} as {}",
                path.display(),
                encoding.name()
            ),
        ));
    }
    Ok(text.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_plain_utf8_through() {
        let text = decode_text("TITLE \"专辑\"".as_bytes(), Path::new("a.cue")).unwrap();
        assert_eq!(text, "TITLE \"专辑\"");
    }

    #[test]
    fn strips_utf8_bom() {
        let mut data = UTF8_BOM.to_vec();
        data.extend_from_slice(b"FILE \"album.wav\" WAVE");
        let text = decode_text(&data, Path::new("a.cue")).unwrap();
        assert_eq!(text, "FILE \"album.wav\" WAVE");
    }

    #[test]
    fn decodes_gbk_fallback() {
        // "笨小孩" in GBK
        let data: &[u8] = &[0xB1, 0xBF, 0xD0, 0xA1, 0xBA, 0xA2];
        let text = decode_text(data, Path::new("Info.txt")).unwrap();
        assert_eq!(text, "笨小孩");
    }
}
