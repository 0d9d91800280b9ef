//! Secure-context check for the origin captures are uploaded to.

use url::{Host, Url};

/// True if `origin` is encrypted (`https`/`wss`) or a loopback host.
///
/// Anything that does not parse as a URL is insecure.
pub fn is_secure_origin(origin: &str) -> bool {
    let Ok(url) = Url::parse(origin) else {
        return false;
    };
    match url.scheme() {
        "https" | "wss" => true,
        "http" | "ws" => url.host().is_some_and(|host| is_loopback(&host)),
        _ => false,
    }
}

fn is_loopback(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(domain) => {
            let domain = domain.to_ascii_lowercase();
            domain == "localhost" || domain.ends_with(".localhost")
        }
        Host::Ipv4(addr) => addr.is_loopback(),
        Host::Ipv6(addr) => addr.is_loopback(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypted_origins_are_secure() {
        assert!(is_secure_origin("https://attendance.example.edu"));
        assert!(is_secure_origin("HTTPS://attendance.example.edu:8443/recognize"));
        assert!(is_secure_origin("wss://attendance.example.edu/live"));
    }

    #[test]
    fn test_loopback_http_is_secure() {
        assert!(is_secure_origin("http://localhost:5000"));
        assert!(is_secure_origin("http://127.0.0.1:5000/upload_photo"));
        assert!(is_secure_origin("http://[::1]:5000"));
        assert!(is_secure_origin("http://app.localhost"));
    }

    #[test]
    fn test_shorthand_loopback_address_is_normalized() {
        assert!(is_secure_origin("http://127.1:5000"));
        assert!(is_secure_origin("http://0x7f.0.0.1"));
    }

    #[test]
    fn test_remote_plaintext_is_insecure() {
        assert!(!is_secure_origin("http://attendance.example.edu"));
        assert!(!is_secure_origin("http://192.168.1.20:5000"));
        assert!(!is_secure_origin("http://localhost.example.edu"));
        assert!(!is_secure_origin("http://localhost@attendance.example.edu"));
    }

    #[test]
    fn test_malformed_origin_is_insecure() {
        assert!(!is_secure_origin("http://[::1"));
        assert!(!is_secure_origin("localhost:5000"));
        assert!(!is_secure_origin("ftp://localhost"));
        assert!(!is_secure_origin(""));
    }
}
