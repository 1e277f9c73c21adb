use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use pmexplain_common::errors::*;
use std::io::Read;
use xz2::read::XzDecoder;

#[derive(Debug, PartialEq, Eq)]
pub enum CompressedWith {
    Gzip,
    Bzip2,
    // update_excuses.yaml.xz
    Xz,
    Zstd,
    Unknown,
}

pub fn detect_compression(bytes: &[u8]) -> CompressedWith {
    let mime = tree_magic_mini::from_u8(bytes);
    debug!("Detected mimetype for cached excuses: {:?}", mime);

    match mime {
        "application/gzip" => CompressedWith::Gzip,
        "application/x-bzip" | "application/x-bzip2" => CompressedWith::Bzip2,
        "application/x-xz" => CompressedWith::Xz,
        "application/zstd" => CompressedWith::Zstd,
        _ => CompressedWith::Unknown,
    }
}

fn stream<'a>(comp: &CompressedWith, bytes: &'a [u8]) -> Result<Box<dyn Read + 'a>> {
    match comp {
        CompressedWith::Gzip => Ok(Box::new(GzDecoder::new(bytes))),
        CompressedWith::Bzip2 => Ok(Box::new(BzDecoder::new(bytes))),
        CompressedWith::Xz => Ok(Box::new(XzDecoder::new(bytes))),
        CompressedWith::Zstd => Ok(Box::new(zstd::Decoder::new(bytes)?)),
        CompressedWith::Unknown => Ok(Box::new(bytes)),
    }
}

/// Excuse report text, whatever the mirror compressed it with
pub fn decompress(bytes: &[u8]) -> Result<String> {
    let comp = detect_compression(bytes);
    let mut text = String::new();
    stream(&comp, bytes)?
        .read_to_string(&mut text)
        .with_context(|| anyhow!("Failed to decompress excuses ({:?})", comp))?;
    debug!("Decompressed excuses to {} bytes", text.len());
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_encoding::BASE64;

    const REPORT: &str = "sources:\n- source: foo\n";

    #[test]
    fn plain_yaml() {
        assert_eq!(detect_compression(REPORT.as_bytes()), CompressedWith::Unknown);
        assert_eq!(decompress(REPORT.as_bytes()).unwrap(), REPORT);
    }

    #[test]
    fn gzip_report() {
        let bytes = BASE64
            .decode(b"H4sIAAAAAAACAyvOLy1KTi224tJVKAYzrRTS8vO5AOP3QYkXAAAA")
            .unwrap();
        assert_eq!(detect_compression(&bytes), CompressedWith::Gzip);
        assert_eq!(decompress(&bytes).unwrap(), REPORT);
    }

    #[test]
    fn bzip2_report() {
        let bytes = BASE64
            .decode(b"QlpoOTFBWSZTWSaRf68AAApZgAAQQAIAEAsAmgAgACEqGmYoIBppopb7UUGNzDwreHxdyRThQkCaRf68")
            .unwrap();
        assert_eq!(detect_compression(&bytes), CompressedWith::Bzip2);
        assert_eq!(decompress(&bytes).unwrap(), REPORT);
    }

    #[test]
    fn xz_report() {
        let bytes = BASE64.decode(b"/Td6WFoAAATm1rRGAgAhARYAAAB0L+WjAQAWc291cmNlczoKLSBzb3VyY2U6IGZvbwoAAI8xLpw+TVJ2AAEvF4EISbEftvN9AQAAAAAEWVo=").unwrap();
        assert_eq!(detect_compression(&bytes), CompressedWith::Xz);
        assert_eq!(decompress(&bytes).unwrap(), REPORT);
    }

    #[test]
    fn zstd_report() {
        let bytes = BASE64
            .decode(b"KLUv/SAXuQAAc291cmNlczoKLSBzb3VyY2U6IGZvbwo=")
            .unwrap();
        assert_eq!(detect_compression(&bytes), CompressedWith::Zstd);
        assert_eq!(decompress(&bytes).unwrap(), REPORT);
    }

    #[test]
    fn not_utf8() {
        assert!(decompress(&[0x73, 0x6f, 0xc3, 0x28, 0x0a]).is_err());
    }
}
