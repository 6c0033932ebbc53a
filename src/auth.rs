use crate::net::http_proto::{HttpRequest, HttpResponse};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Basic-auth gate. The expected header value is computed once; every request is
/// compared against it before routing.
#[derive(Clone, Debug)]
pub struct AuthGate {
    expected: Option<String>,
    realm: String,
}

impl AuthGate {
    pub fn new(user: &str, password: &str, required: bool, realm: &str) -> Self {
        let expected = required.then(|| basic_header_value(user, password));
        Self {
            expected,
            realm: realm.to_string(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.expected.is_some()
    }

    /// Exact string match of the `authorization` header; missing header compares as "".
    pub fn check(&self, req: &HttpRequest) -> bool {
        match &self.expected {
            None => true,
            Some(expected) => req.header("authorization").unwrap_or("") == expected,
        }
    }

    pub fn challenge(&self) -> HttpResponse {
        HttpResponse::unauthorized(&self.realm)
    }
}

/// `Basic base64(user:password)`
pub fn basic_header_value(user: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", user, password)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::http_proto::HttpMethod;

    fn request(auth: Option<&str>) -> HttpRequest {
        let mut req = HttpRequest::new(HttpMethod::Get, "/");
        if let Some(v) = auth {
            req.headers.insert("authorization".to_string(), v.to_string());
        }
        req
    }

    #[test]
    fn test_header_value() {
        assert_eq!(basic_header_value("admin", "admin"), "Basic YWRtaW46YWRtaW4=");
    }

    #[test]
    fn test_accepts_matching_credentials() {
        let gate = AuthGate::new("admin", "admin", true, "DEVCONSOLE");
        assert!(gate.check(&request(Some("Basic YWRtaW46YWRtaW4="))));
    }

    #[test]
    fn test_rejects_missing_or_wrong_credentials() {
        let gate = AuthGate::new("admin", "admin", true, "DEVCONSOLE");
        assert!(!gate.check(&request(None)));
        assert!(!gate.check(&request(Some("Basic Zm9vOmJhcg=="))));
        // exact match: no trimming or case folding of the scheme
        assert!(!gate.check(&request(Some("basic YWRtaW46YWRtaW4="))));
    }

    #[test]
    fn test_disabled_gate_allows_everything() {
        let gate = AuthGate::new("admin", "admin", false, "DEVCONSOLE");
        assert!(!gate.is_enabled());
        assert!(gate.check(&request(None)));
    }

    #[test]
    fn test_challenge_is_401_with_basic_realm() {
        let gate = AuthGate::new("a", "b", true, "DEVCONSOLE");
        let text = String::from_utf8(gate.challenge().to_bytes()).unwrap();
        assert!(text.starts_with("HTTP/1.1 401 Unauthorized\r\n"));
        assert!(text.contains("WWW-Authenticate: Basic realm=\"DEVCONSOLE\"\r\n"));
        assert!(text.ends_with("Auth required"));
    }
}
