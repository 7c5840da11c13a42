//! Password auto-detection from Asterisk's `manager.conf`.

use std::fs;
use std::path::Path;

use crate::error::AmiError;

pub const DEFAULT_MANAGER_CONF: &str = "/etc/asterisk/manager.conf";

/// Returns the `secret` configured for `[username]` in manager.conf contents.
///
/// Comments start with `;`. Section headers may carry template suffixes such as
/// `[admin](!)`; only the bracketed name is compared. Both `secret = x` and
/// `secret => x` are accepted.
pub fn secret_from_manager_conf(contents: &str, username: &str) -> Option<String> {
    let mut in_section = false;

    for raw_line in contents.lines() {
        let line = raw_line.split(';').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix('[') {
            in_section = rest
                .split_once(']')
                .is_some_and(|(name, _)| name.trim() == username);
            continue;
        }
        if !in_section {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        if key.trim().eq_ignore_ascii_case("secret") {
            let value = value.strip_prefix('>').unwrap_or(value).trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }

    None
}

/// Reads `path` and looks up the secret for `username`.
pub fn detect_password(path: &Path, username: &str) -> Result<String, AmiError> {
    let contents = fs::read_to_string(path).map_err(|source| AmiError::config_read(path, source))?;
    secret_from_manager_conf(&contents, username).ok_or_else(|| AmiError::MissingPassword {
        username: username.to_string(),
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::{detect_password, secret_from_manager_conf};
    use crate::error::AmiError;

    const SAMPLE: &str = "\
[general]
enabled = yes
port = 5038

[relay](!) ; template marker
secret = template-secret

[admin]
; secret = commented
read = all
secret => s3cret ; trailing comment
write = all

[other]
secret = nope
";

    #[test]
    fn finds_secret_scoped_to_its_section() {
        assert_eq!(
            secret_from_manager_conf(SAMPLE, "admin").as_deref(),
            Some("s3cret")
        );
        assert_eq!(
            secret_from_manager_conf(SAMPLE, "other").as_deref(),
            Some("nope")
        );
        assert_eq!(
            secret_from_manager_conf(SAMPLE, "relay").as_deref(),
            Some("template-secret")
        );
    }

    #[test]
    fn unknown_user_has_no_secret() {
        assert!(secret_from_manager_conf(SAMPLE, "general").is_none());
        assert!(secret_from_manager_conf(SAMPLE, "ghost").is_none());
    }

    #[test]
    fn detect_password_reads_file_and_reports_missing_user() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(SAMPLE.as_bytes()).expect("write sample");

        assert_eq!(
            detect_password(file.path(), "admin").expect("admin secret"),
            "s3cret"
        );
        assert!(matches!(
            detect_password(file.path(), "ghost"),
            Err(AmiError::MissingPassword { .. })
        ));
    }

    #[test]
    fn detect_password_surfaces_read_errors() {
        let dir = tempfile::tempdir().expect("temp dir");
        let missing = dir.path().join("manager.conf");
        assert!(matches!(
            detect_password(&missing, "admin"),
            Err(AmiError::ConfigRead { .. })
        ));
    }
}
