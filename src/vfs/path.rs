//! Logical path helpers.

/// Lexically normalise a logical path.
///
/// Always returns an absolute path: repeated separators and `.` are dropped,
/// `..` pops a component (never above `/`), backslashes count as separators.
pub fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}

/// `path` equals `root` or lies below it. Both must be normalised.
pub fn is_within(path: &str, root: &str) -> bool {
    if root == "/" {
        return true;
    }
    path == root
        || (path.starts_with(root) && path.as_bytes().get(root.len()) == Some(&b'/'))
}

/// Drop every carriage return (browser textareas submit CRLF).
pub fn strip_cr(content: &[u8]) -> Vec<u8> {
    content.iter().copied().filter(|&b| b != b'\r').collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/store/ovms_config"), "/store/ovms_config");
        assert_eq!(normalize("//store///plugin/"), "/store/plugin");
        assert_eq!(normalize("/sd/../store/./ovms_config/x"), "/store/ovms_config/x");
        assert_eq!(normalize("/../../etc"), "/etc");
        assert_eq!(normalize("store\\ovms_config"), "/store/ovms_config");
        assert_eq!(normalize(""), "/");
    }

    #[test]
    fn test_is_within() {
        assert!(is_within("/store/ovms_config", "/store/ovms_config"));
        assert!(is_within("/store/ovms_config/wifi.ap", "/store/ovms_config"));
        assert!(!is_within("/store/ovms_config2", "/store/ovms_config"));
        assert!(!is_within("/sd", "/store"));
        assert!(is_within("/anything", "/"));
    }

    #[test]
    fn test_strip_cr() {
        assert_eq!(strip_cr(b"a\r\nb\r\n"), b"a\nb\n".to_vec());
        assert_eq!(strip_cr(b"plain"), b"plain".to_vec());
    }
}
