//! Request body reading: content-encoding chain, size limits, and MIME
//! matching (§4.2 "Body read" / "Size limits" / "MIME match").

use std::io::Read;

use bytes::Bytes;

use crate::error::XrpcErrorKind;

/// One token of a `Content-Encoding` chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Gzip,
    Deflate,
    Brotli,
}

/// Parse a `Content-Encoding` header value into an ordered list of codings,
/// dropping `identity` tokens. Order is preserved as written on the wire;
/// callers decompress right-to-left per §4.2.
pub fn parse_content_encoding(header: &str) -> Result<Vec<ContentEncoding>, XrpcErrorKind> {
    let mut out = Vec::new();
    for tok in header.split(',') {
        let tok = tok.trim();
        if tok.is_empty() || tok.eq_ignore_ascii_case("identity") {
            continue;
        }
        let enc = match_encoding(tok)?;
        out.push(enc);
    }
    Ok(out)
}

fn match_encoding(tok: &str) -> Result<ContentEncoding, XrpcErrorKind> {
    if tok.eq_ignore_ascii_case("gzip") {
        Ok(ContentEncoding::Gzip)
    } else if tok.eq_ignore_ascii_case("deflate") {
        Ok(ContentEncoding::Deflate)
    } else if tok.eq_ignore_ascii_case("br") {
        Ok(ContentEncoding::Brotli)
    } else {
        Err(XrpcErrorKind::invalid_request(
            "unsupported content-encoding",
        ))
    }
}

/// Decompress `raw` through the given encoding chain, right to left (the
/// outermost encoding, listed last, is removed last), checking the running
/// size against `blob_limit` after every stage.
pub fn decode_content_encoding(
    raw: Bytes,
    encodings: &[ContentEncoding],
    blob_limit: usize,
) -> Result<Bytes, XrpcErrorKind> {
    let mut current = raw;
    for enc in encodings.iter().rev() {
        current = decompress_one(current, *enc)?;
        if current.len() > blob_limit {
            return Err(XrpcErrorKind::PayloadTooLarge {
                message: Some("request entity too large".into()),
            });
        }
    }
    Ok(current)
}

fn decompress_one(input: Bytes, enc: ContentEncoding) -> Result<Bytes, XrpcErrorKind> {
    let mut out = Vec::new();
    match enc {
        ContentEncoding::Gzip => {
            let mut dec = flate2::read::GzDecoder::new(&input[..]);
            dec.read_to_end(&mut out)
                .map_err(|e| XrpcErrorKind::invalid_request(format!("bad gzip body: {e}")))?;
        }
        ContentEncoding::Deflate => {
            let mut dec = flate2::read::ZlibDecoder::new(&input[..]);
            dec.read_to_end(&mut out)
                .map_err(|e| XrpcErrorKind::invalid_request(format!("bad deflate body: {e}")))?;
        }
        ContentEncoding::Brotli => {
            let mut dec = brotli::Decompressor::new(&input[..], 4096);
            dec.read_to_end(&mut out)
                .map_err(|e| XrpcErrorKind::invalid_request(format!("bad brotli body: {e}")))?;
        }
    }
    Ok(Bytes::from(out))
}

/// Enforce the `Content-Length` pre-check (§4.2 "Size limits"): if present
/// and larger than `blob_limit`, reject before reading any body bytes.
pub fn check_content_length(content_length: Option<u64>, blob_limit: u64) -> Result<(), XrpcErrorKind> {
    if let Some(len) = content_length {
        if len > blob_limit {
            return Err(XrpcErrorKind::PayloadTooLarge {
                message: Some("request entity too large".into()),
            });
        }
    }
    Ok(())
}

/// A declared input/output encoding, as carried on a method definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclaredEncoding {
    Any,
    Json,
    Text(String),
    Other(String),
}

impl DeclaredEncoding {
    pub fn parse(mime: &str) -> Self {
        let base = strip_mime_params(mime).to_ascii_lowercase();
        if base == "*/*" {
            Self::Any
        } else if base == "application/json" {
            Self::Json
        } else if let Some(sub) = base.strip_prefix("text/") {
            Self::Text(sub.to_string())
        } else {
            Self::Other(base)
        }
    }
}

/// Strip `; charset=...`-style parameters and return the bare base type.
pub fn strip_mime_params(mime: &str) -> &str {
    mime.split(';').next().unwrap_or(mime).trim()
}

/// Match an incoming `Content-Type` against a method's declared input
/// encoding (§4.2 "MIME match"): exact match, declared `*/*`, or declared
/// `application/json` satisfied by any `.../...json`-shaped actual type.
pub fn mime_matches(declared: &DeclaredEncoding, actual: &str) -> bool {
    let actual_base = strip_mime_params(actual).to_ascii_lowercase();
    match declared {
        DeclaredEncoding::Any => true,
        DeclaredEncoding::Json => actual_base == "application/json" || actual_base.ends_with("json"),
        DeclaredEncoding::Text(sub) => actual_base == format!("text/{sub}"),
        DeclaredEncoding::Other(base) => actual_base == *base,
    }
}

/// Require a `Content-Type` to be present whenever a body is present, per
/// §4.2: "A present body with missing content-type produces InvalidRequest".
pub fn require_content_type(body_present: bool, content_type: Option<&str>) -> Result<(), XrpcErrorKind> {
    if body_present && content_type.is_none() {
        return Err(XrpcErrorKind::invalid_request(
            "Request encoding (Content-Type) required but not provided",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_chain_dropping_identity() {
        let encs = parse_content_encoding("gzip, identity, deflate, identity, identity").unwrap();
        assert_eq!(encs, vec![ContentEncoding::Gzip, ContentEncoding::Deflate]);
    }

    #[test]
    fn rejects_unknown_encoding_token() {
        assert!(parse_content_encoding("bzip2").is_err());
    }

    #[test]
    fn content_length_precheck_rejects_before_reading() {
        assert!(check_content_length(Some(10_000), 5000).is_err());
        assert!(check_content_length(Some(4000), 5000).is_ok());
        assert!(check_content_length(None, 5000).is_ok());
    }

    #[test]
    fn mime_match_rules() {
        assert!(mime_matches(&DeclaredEncoding::Any, "application/octet-stream"));
        assert!(mime_matches(
            &DeclaredEncoding::Json,
            "application/json; charset=utf-8"
        ));
        assert!(mime_matches(&DeclaredEncoding::Text("plain".into()), "text/plain"));
        assert!(!mime_matches(&DeclaredEncoding::Json, "text/plain"));
    }

    #[test]
    fn gzip_then_deflate_round_trip() {
        use flate2::Compression;
        use flate2::write::{DeflateEncoder, GzEncoder};
        use std::io::Write;

        let original = b"hello world, this is a payload";
        let mut gz = GzEncoder::new(Vec::new(), Compression::default());
        gz.write_all(original).unwrap();
        let gzipped = gz.finish().unwrap();

        let mut defl = DeflateEncoder::new(Vec::new(), Compression::default());
        defl.write_all(&gzipped).unwrap();
        let double = defl.finish().unwrap();

        // wire order: deflate(gzip(bytes)) -> Content-Encoding: gzip, deflate
        let encs = vec![ContentEncoding::Gzip, ContentEncoding::Deflate];
        let decoded = decode_content_encoding(Bytes::from(double), &encs, 1 << 20).unwrap();
        assert_eq!(decoded.as_ref(), original);
    }

    #[test]
    fn oversized_intermediate_stage_is_rejected() {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use std::io::Write;

        let original = vec![0u8; 2048];
        let mut gz = GzEncoder::new(Vec::new(), Compression::default());
        gz.write_all(&original).unwrap();
        let gzipped = gz.finish().unwrap();

        let encs = vec![ContentEncoding::Gzip];
        let err = decode_content_encoding(Bytes::from(gzipped), &encs, 100).unwrap_err();
        assert!(matches!(err, XrpcErrorKind::PayloadTooLarge { .. }));
    }
}
