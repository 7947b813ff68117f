//! Local control endpoint addressing.
//!
//! Unix socket paths must stay under 104 bytes and Windows named pipes are a
//! bare file name under 256 characters. Component ids routinely exceed both,
//! so the file name is derived from a hash of the id:
//!
//! 1. SHA-256 of the id
//! 2. URL-safe base64 of the first 24 bytes (shorter than hex, filename safe)
//! 3. `.sock` suffix
//! 4. if the Unix URL is still too long, the fallback directory is used

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{UpgradeError, UpgradeResult};

/// Directory used when the requested one yields an over-long socket URL.
pub const SOCKET_FALLBACK_DIRECTORY: &str = "/tmp/elastic-agent";
/// Maximum Windows named pipe length.
pub const WINDOWS_NAMED_PIPE_MAX_LENGTH: usize = 256;
/// URL scheme for Windows named pipes.
pub const WINDOWS_SOCKET_SCHEME: &str = "npipe";
/// Socket URLs must be strictly shorter than this.
pub const UNIX_SOCKET_MAX_LENGTH: usize = 104;
/// URL scheme for Unix domain sockets.
pub const UNIX_SOCKET_SCHEME: &str = "unix";

const HASH_PREFIX_LEN: usize = 24;

/// Operating system family the endpoint is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetOs {
    /// Named pipes
    Windows,
    /// Unix domain sockets
    Unix,
}

impl TargetOs {
    /// Family of the running host.
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Unix
        }
    }

    /// Map an OS name such as `"windows"` or `"linux"`.
    pub fn from_os_name(name: &str) -> Self {
        if name == "windows" {
            Self::Windows
        } else {
            Self::Unix
        }
    }
}

/// Build the socket or named pipe URL for component `id`.
///
/// `dir` is ignored on Windows, where pipes live in a flat namespace.
/// Percent-escapes already present in `dir` are kept as written.
pub fn socket_url_with_fallback(id: &str, os: TargetOs, dir: &str) -> UpgradeResult<String> {
    let filename = socket_filename(id);
    match os {
        TargetOs::Windows => build_url(WINDOWS_SOCKET_SCHEME, "/", &filename),
        TargetOs::Unix => {
            let candidate = build_url(UNIX_SOCKET_SCHEME, dir, &filename)?;
            if candidate.len() < UNIX_SOCKET_MAX_LENGTH {
                Ok(candidate)
            } else {
                build_url(UNIX_SOCKET_SCHEME, SOCKET_FALLBACK_DIRECTORY, &filename)
            }
        }
    }
}

fn socket_filename(id: &str) -> String {
    let digest = Sha256::digest(id.as_bytes());
    let mut name = URL_SAFE.encode(&digest[..HASH_PREFIX_LEN]);
    name.push_str(".sock");
    name
}

fn build_url(scheme: &str, dir: &str, filename: &str) -> UpgradeResult<String> {
    let mut url = Url::parse(&format!("{scheme}:///"))
        .map_err(|e| UpgradeError::invalid(format!("bad endpoint scheme {scheme}: {e}")))?;
    url.set_path(&clean_join(dir, filename));
    Ok(url.into())
}

/// Rooted, lexically cleaned join of `dir` and `filename`.
fn clean_join(dir: &str, filename: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in dir.split('/').chain(std::iter::once(filename)) {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_is_32_chars_of_base64_plus_suffix() {
        let name = socket_filename("some-component-id");
        assert!(name.ends_with(".sock"));
        assert_eq!(name.len(), 32 + ".sock".len());
        assert!(!name.contains('/') && !name.contains('+'));
    }

    #[test]
    fn filename_is_deterministic_per_id() {
        assert_eq!(socket_filename("a"), socket_filename("a"));
        assert_ne!(socket_filename("a"), socket_filename("b"));
    }

    #[test]
    fn unix_url_uses_requested_dir_when_short() {
        let url = socket_url_with_fallback("id", TargetOs::Unix, "/var/run/agent").unwrap();
        let expected = format!("unix:///var/run/agent/{}", socket_filename("id"));
        assert_eq!(url, expected);
    }

    #[test]
    fn unix_url_falls_back_when_too_long() {
        let long_dir = format!("/opt/{}", "nested/".repeat(20));
        let url = socket_url_with_fallback("id", TargetOs::Unix, &long_dir).unwrap();
        let expected = format!(
            "unix://{SOCKET_FALLBACK_DIRECTORY}/{}",
            socket_filename("id")
        );
        assert_eq!(url, expected);
        assert!(url.len() < UNIX_SOCKET_MAX_LENGTH);
    }

    #[test]
    fn windows_url_ignores_dir() {
        let url = socket_url_with_fallback("id", TargetOs::Windows, "C:/ignored").unwrap();
        assert_eq!(url, format!("npipe:///{}", socket_filename("id")));
        assert!(url.len() < WINDOWS_NAMED_PIPE_MAX_LENGTH);
    }

    #[test]
    fn join_cleans_dot_segments() {
        assert_eq!(clean_join("/a/./b/../c/", "f"), "/a/c/f");
        assert_eq!(clean_join("relative", "f"), "/relative/f");
        assert_eq!(clean_join("/", "f"), "/f");
    }

    #[test]
    fn raw_bytes_are_escaped_once() {
        let url = socket_url_with_fallback("id", TargetOs::Unix, "/a b/c=d").unwrap();
        assert_eq!(url, format!("unix:///a%20b/c=d/{}", socket_filename("id")));
    }

    #[test]
    fn existing_escapes_are_not_escaped_again() {
        let url = socket_url_with_fallback("id", TargetOs::Unix, "/a%20b").unwrap();
        assert_eq!(url, format!("unix:///a%20b/{}", socket_filename("id")));
    }

    #[test]
    fn os_names_map_to_families() {
        assert_eq!(TargetOs::from_os_name("windows"), TargetOs::Windows);
        assert_eq!(TargetOs::from_os_name("darwin"), TargetOs::Unix);
        assert_eq!(TargetOs::from_os_name("linux"), TargetOs::Unix);
    }
}
