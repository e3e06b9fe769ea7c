//! Partner SOAP `login` envelope and response parsing.

use std::sync::OnceLock;
use zeroize::Zeroizing;

/// Session established by a successful SOAP login.
pub(crate) struct LoginResult {
    pub(crate) session_id: Zeroizing<String>,
    pub(crate) server_url: String,
}

struct LoginPatterns {
    session_id: regex::Regex,
    server_url: regex::Regex,
    fault_string: regex::Regex,
    exception_code: regex::Regex,
}

impl LoginPatterns {
    fn instance() -> &'static Self {
        static PATTERNS: OnceLock<LoginPatterns> = OnceLock::new();
        PATTERNS.get_or_init(Self::compile)
    }

    fn compile() -> Self {
        Self {
            session_id: regex::Regex::new(r"<sessionId>([^<]+)</sessionId>")
                .expect("Invalid sessionId pattern"),
            server_url: regex::Regex::new(r"<serverUrl>([^<]+)</serverUrl>")
                .expect("Invalid serverUrl pattern"),
            fault_string: regex::Regex::new(r"<faultstring>([^<]*)</faultstring>")
                .expect("Invalid faultstring pattern"),
            exception_code: regex::Regex::new(r"<(?:sf:)?exceptionCode>([^<]*)</(?:sf:)?exceptionCode>")
                .expect("Invalid exceptionCode pattern"),
        }
    }
}

/// Builds the SOAP `login` envelope. The password already carries the security token.
pub(crate) fn login_envelope(username: &str, password_with_token: &str) -> Zeroizing<String> {
    Zeroizing::new(format!(
        concat!(
            r#"<?xml version="1.0" encoding="utf-8" ?>"#,
            r#"<env:Envelope xmlns:xsd="http://www.w3.org/2001/XMLSchema" "#,
            r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" "#,
            r#"xmlns:env="http://schemas.xmlsoap.org/soap/envelope/" "#,
            r#"xmlns:urn="urn:partner.soap.sforce.com">"#,
            r#"<env:Header><urn:CallOptions><urn:client>cdp-inventory</urn:client>"#,
            r#"<urn:defaultNamespace>sf</urn:defaultNamespace></urn:CallOptions></env:Header>"#,
            r#"<env:Body><n1:login xmlns:n1="urn:partner.soap.sforce.com">"#,
            r#"<n1:username>{}</n1:username><n1:password>{}</n1:password>"#,
            r#"</n1:login></env:Body></env:Envelope>"#
        ),
        xml_escape(username).as_str(),
        xml_escape(password_with_token).as_str()
    ))
}

/// Extracts the session id and server URL from a login response body.
pub(crate) fn parse_login_response(body: &str) -> Option<LoginResult> {
    let patterns = LoginPatterns::instance();
    let session_id = patterns.session_id.captures(body)?.get(1)?.as_str();
    let server_url = patterns.server_url.captures(body)?.get(1)?.as_str();

    Some(LoginResult {
        session_id: Zeroizing::new(xml_unescape(session_id)),
        server_url: xml_unescape(server_url),
    })
}

/// Extracts `exceptionCode: faultstring` from a SOAP fault body.
pub(crate) fn parse_fault(body: &str) -> Option<String> {
    let patterns = LoginPatterns::instance();
    let fault = patterns
        .fault_string
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| xml_unescape(m.as_str()));
    let code = patterns
        .exception_code
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    match (code, fault) {
        (Some(code), Some(fault)) if !fault.starts_with(&code) => Some(format!("{code}: {fault}")),
        (_, Some(fault)) => Some(fault),
        (Some(code), None) => Some(code),
        (None, None) => None,
    }
}

fn xml_escape(value: &str) -> Zeroizing<String> {
    let mut escaped = Zeroizing::new(String::with_capacity(value.len()));
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn xml_unescape(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
