use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;
use url::Url;

use crate::error::{Error, Result};

pub fn parse_url(input: &str) -> Result<Url> {
    let invalid = |reason: String| Error::InvalidUrl {
        input: input.to_string(),
        reason,
    };
    let url = Url::parse(input).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(format!("unsupported scheme {:?}", other))),
    }
}

/// Last path segment of the URL, still percent-encoded.
pub fn get_filename_from_url(url: &Url) -> String {
    if let Some(segments) = url.path_segments() {
        if let Some(filename) = segments.last() {
            if !filename.is_empty() {
                return filename.to_string();
            }
        }
    }

    // Fallback if no filename found in path
    format!("download_{}", uuid::Uuid::new_v4())
}

/// Extension of `name` including the dot. `.tar.*` archives keep both parts.
fn extension_of(name: &str) -> Option<String> {
    let path = Path::new(name);
    let ext = path.extension()?.to_str()?;
    let inner = path
        .file_stem()
        .map(Path::new)
        .and_then(Path::extension)
        .and_then(|e| e.to_str());
    match inner {
        Some(tar) if tar.eq_ignore_ascii_case("tar") => Some(format!(".{}.{}", tar, ext)),
        _ => Some(format!(".{}", ext)),
    }
}

/// Picks the output filename: `output` when given (trailing dots trimmed, the
/// URL's extension added if it has none), otherwise the URL basename.
/// The result is URL-decoded.
pub fn output_file_name(url: &Url, output: Option<&str>) -> Result<String> {
    let basename = get_filename_from_url(url);

    let name = match output.map(|o| o.trim_end_matches('.')) {
        Some(requested) if !requested.is_empty() => {
            if Path::new(requested).extension().is_some() {
                requested.to_string()
            } else {
                format!("{}{}", requested, extension_of(&basename).unwrap_or_default())
            }
        }
        _ => basename,
    };

    decode_file_name(&name)
}

/// Query-style unescaping: `%XX` sequences and `+` as a space.
pub fn decode_file_name(name: &str) -> Result<String> {
    let invalid = |reason: &str| Error::InvalidUrl {
        input: name.to_string(),
        reason: reason.to_string(),
    };

    let bytes = name.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let escape = bytes.get(i + 1..i + 3).unwrap_or_default();
            if escape.len() != 2 || !escape.iter().all(u8::is_ascii_hexdigit) {
                return Err(invalid("malformed percent escape"));
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    let spaced = name.replace('+', " ");
    let decoded = percent_decode_str(&spaced)
        .decode_utf8()
        .map_err(|_| invalid("decoded name is not UTF-8"))?;

    if decoded.is_empty() || decoded.contains('/') || decoded.contains('\\') {
        return Err(invalid("not a usable file name"));
    }
    Ok(decoded.into_owned())
}

/// The home directory when it can be found, otherwise the working directory.
pub fn default_output_dir() -> PathBuf {
    dirs::home_dir()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        parse_url(s).unwrap()
    }

    #[test]
    fn basename_is_decoded() {
        let name = output_file_name(&url("https://host/files/hello%20world.bin"), None).unwrap();
        assert_eq!(name, "hello world.bin");
    }

    #[test]
    fn query_string_is_not_part_of_the_name() {
        let name = output_file_name(&url("https://host/a/b.iso?token=1"), None).unwrap();
        assert_eq!(name, "b.iso");
    }

    #[test]
    fn trailing_dot_takes_compound_extension() {
        let u = url("https://host/dl/source.tar.gz");
        assert_eq!(output_file_name(&u, Some("archive.")).unwrap(), "archive.tar.gz");
    }

    #[test]
    fn output_without_extension_borrows_the_url_extension() {
        let u = url("https://host/dl/video.mp4");
        assert_eq!(output_file_name(&u, Some("movie")).unwrap(), "movie.mp4");
        assert_eq!(output_file_name(&u, Some("movie...")).unwrap(), "movie.mp4");
    }

    #[test]
    fn output_with_extension_is_kept() {
        let u = url("https://host/dl/video.mp4");
        assert_eq!(output_file_name(&u, Some("clip.mkv")).unwrap(), "clip.mkv");
    }

    #[test]
    fn output_name_is_decoded_too() {
        let u = url("https://host/dl/x.zip");
        assert_eq!(output_file_name(&u, Some("my+file%21")).unwrap(), "my file!.zip");
    }

    #[test]
    fn empty_path_falls_back_to_generated_name() {
        let name = output_file_name(&url("https://host/"), None).unwrap();
        assert!(name.starts_with("download_"), "{name}");
    }

    #[test]
    fn malformed_escapes_are_rejected() {
        assert!(matches!(decode_file_name("bad%zzname"), Err(Error::InvalidUrl { .. })));
        assert!(matches!(decode_file_name("trailing%4"), Err(Error::InvalidUrl { .. })));
        assert!(matches!(decode_file_name("%ff%fe"), Err(Error::InvalidUrl { .. })));
        assert!(matches!(decode_file_name("a%2Fb"), Err(Error::InvalidUrl { .. })));
    }

    #[test]
    fn unsupported_urls_are_rejected() {
        assert!(matches!(parse_url("not a url"), Err(Error::InvalidUrl { .. })));
        assert!(matches!(parse_url("ftp://host/file"), Err(Error::InvalidUrl { .. })));
    }
}
