//! Local file naming for downloaded resources

use url::Url;

const FALLBACK_NAME: &str = "file";

/// Picks the on-disk name for a download in `slot`.
///
/// Preference order: `Content-Disposition` filename, then the last URL path
/// segment. The result is always prefixed with the slot index so files of
/// the same task never collide.
pub fn local_name(slot: usize, url: &str, content_disposition: Option<&str>) -> String {
    let base = content_disposition
        .and_then(parse_content_disposition)
        .or_else(|| name_from_url(url))
        .map(|name| sanitize(&name))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_NAME.to_string());

    format!("{slot}_{base}")
}

/// Extracts the filename from a `Content-Disposition` header value.
///
/// Handles `filename="a.pdf"`, `filename=a.pdf` and the RFC 5987
/// `filename*=UTF-8''a%20b.pdf` form, preferring the latter.
pub fn parse_content_disposition(header: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for param in header.split(';').skip(1) {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                extended = value
                    .split_once("''")
                    .and_then(|(_, encoded)| percent_decode(encoded));
            }
            "filename" => {
                let unquoted = value
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .unwrap_or(value);
                if !unquoted.is_empty() {
                    plain = Some(unquoted.to_string());
                }
            }
            _ => {}
        }
    }

    extended.filter(|name| !name.is_empty()).or(plain)
}

fn name_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.next_back()?;
    let decoded = percent_decode(segment)?;
    (!decoded.is_empty()).then_some(decoded)
}

fn percent_decode(value: &str) -> Option<String> {
    urlencoding::decode(value).ok().map(|decoded| decoded.into_owned())
}

/// Replaces characters that are unsafe in file names on common filesystems
/// and strips leading dots so a name can never point outside its directory.
pub fn sanitize(name: &str) -> String {
    let mapped: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    mapped.trim().trim_start_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_from_url_path() {
        assert_eq!(local_name(0, "http://host/docs/a.pdf", None), "0_a.pdf");
        assert_eq!(local_name(2, "http://host/c.pdf?x=1", None), "2_c.pdf");
        assert_eq!(local_name(1, "http://host/my%20scan.jpg", None), "1_my scan.jpg");
    }

    #[test]
    fn test_content_disposition_wins() {
        let name = local_name(1, "http://host/download.pdf", Some(r#"attachment; filename="report.pdf""#));
        assert_eq!(name, "1_report.pdf");

        let name = local_name(0, "http://host/x.pdf", Some("attachment; filename=plain.pdf"));
        assert_eq!(name, "0_plain.pdf");
    }

    #[test]
    fn test_rfc5987_filename_preferred() {
        let header = r#"attachment; filename="fallback.pdf"; filename*=UTF-8''na%C3%AFve.pdf"#;
        assert_eq!(parse_content_disposition(header).as_deref(), Some("naïve.pdf"));
    }

    #[test]
    fn test_traversal_is_neutralized() {
        let name = local_name(0, "http://host/a.pdf", Some(r#"attachment; filename="../../etc/passwd""#));
        assert_eq!(name, "0__.._etc_passwd");
        assert!(!name.contains('/'));
    }

    #[test]
    fn test_fallback_when_nothing_usable() {
        assert_eq!(local_name(0, "http://host/", None), "0_file");
        assert_eq!(local_name(1, "http://host/a.pdf", Some("inline")), "1_a.pdf");
    }
}
