//! The `artifact://` URI scheme.
//!
//! Two forms: `artifact://ref/<ref>` and `artifact://name/<pathEscape(name)>`.
//! Name equality is always on the raw, unescaped name; callers must take care
//! not to double-escape when round-tripping a name through a URI.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactUri {
    Ref(String),
    Name(String),
}

#[derive(Debug, thiserror::Error)]
pub enum UriError {
    #[error("unsupported URI scheme: expected \"artifact\"")]
    UnsupportedScheme,
    #[error("malformed artifact URI: {0}")]
    Malformed(String),
}

impl ArtifactUri {
    pub fn for_ref(r: impl Into<String>) -> Self {
        ArtifactUri::Ref(r.into())
    }

    pub fn for_name(name: impl Into<String>) -> Self {
        ArtifactUri::Name(name.into())
    }

    /// Parse `artifact://<host>/<value>` where host is `ref` or `name`.
    pub fn parse(raw: &str) -> Result<Self, UriError> {
        let rest = raw
            .strip_prefix("artifact://")
            .ok_or(UriError::UnsupportedScheme)?;
        let (host, value) = rest
            .split_once('/')
            .ok_or_else(|| UriError::Malformed(raw.to_string()))?;
        if value.is_empty() {
            return Err(UriError::Malformed(raw.to_string()));
        }
        match host {
            "ref" => Ok(ArtifactUri::Ref(value.to_string())),
            "name" => {
                let decoded = percent_decode(value)
                    .map_err(|_| UriError::Malformed(raw.to_string()))?;
                Ok(ArtifactUri::Name(decoded))
            }
            other => Err(UriError::Malformed(format!("unknown host {other:?}"))),
        }
    }
}

impl fmt::Display for ArtifactUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactUri::Ref(r) => write!(f, "artifact://ref/{r}"),
            ArtifactUri::Name(n) => write!(f, "artifact://name/{}", percent_encode(n)),
        }
    }
}

/// Minimal percent-encoding: escapes everything but unreserved characters
/// and the path separator `/`, which artifact names may legitimately contain.
fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

fn percent_decode(s: &str) -> Result<String, std::string::FromUtf8Error> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(hex) = std::str::from_utf8(&bytes[i + 1..i + 3]) {
                if let Ok(v) = u8::from_str_radix(hex, 16) {
                    out.push(v);
                    i += 3;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_name_with_slash() {
        let uri = ArtifactUri::for_name("plan/task-123");
        let text = uri.to_string();
        let back = ArtifactUri::parse(&text).unwrap();
        assert_eq!(back, ArtifactUri::Name("plan/task-123".to_string()));
    }

    #[test]
    fn round_trips_ref() {
        let uri = ArtifactUri::for_ref("20260216T101019Z-aaaaaaaaaaaaaaaa");
        assert_eq!(uri.to_string(), "artifact://ref/20260216T101019Z-aaaaaaaaaaaaaaaa");
    }

    #[test]
    fn rejects_other_schemes() {
        assert!(matches!(
            ArtifactUri::parse("http://example/x"),
            Err(UriError::UnsupportedScheme)
        ));
    }

    #[test]
    fn encodes_space_and_percent() {
        let uri = ArtifactUri::for_name("a b%c");
        let text = uri.to_string();
        assert!(text.contains("%20"));
        let back = ArtifactUri::parse(&text).unwrap();
        assert_eq!(back, ArtifactUri::Name("a b%c".to_string()));
    }
}
