use ipnet::IpNet;
use serde::Deserialize;

/// How the gate builds a caller identity from an incoming request (`[identity]`)
///
/// Token verification happens upstream; the verifier forwards the subject
/// and role claims in plain headers.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct IdentityConfig {
    /// Peers whose X-Forwarded-For and identity headers are trusted
    /// Supports CIDR notation: ["10.0.0.0/8", "::1/128"]
    /// Requests from other peers are treated as anonymous and keyed by socket address
    /// Default: loopback only
    #[serde(default = "default_trusted_proxies")]
    #[serde(deserialize_with = "deserialize_ip_networks")]
    pub trusted_proxies: Vec<IpNet>,
    /// Header carrying the verified subject
    /// Default: "x-auth-subject"
    #[serde(default = "default_subject_header")]
    pub subject_header: String,
    /// Header carrying comma-separated role claims
    /// Default: "x-auth-roles"
    #[serde(default = "default_roles_header")]
    pub roles_header: String,
    /// Header with the original request path when used as an auth subrequest
    /// Default: "x-original-uri"
    #[serde(default = "default_original_uri_header")]
    pub original_uri_header: String,
    /// Header with the original request method
    /// Default: "x-original-method"
    #[serde(default = "default_original_method_header")]
    pub original_method_header: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            trusted_proxies: default_trusted_proxies(),
            subject_header: default_subject_header(),
            roles_header: default_roles_header(),
            original_uri_header: default_original_uri_header(),
            original_method_header: default_original_method_header(),
        }
    }
}

/// Custom deserializer for IP networks that reports the offending entry
fn deserialize_ip_networks<'de, D>(deserializer: D) -> Result<Vec<IpNet>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let strings: Vec<String> = Vec::deserialize(deserializer)?;
    strings
        .into_iter()
        .map(|s| {
            s.parse::<IpNet>().map_err(|e| {
                serde::de::Error::custom(format!("Invalid IP network '{s}': {e}"))
            })
        })
        .collect()
}

fn default_trusted_proxies() -> Vec<IpNet> {
    vec![
        IpNet::from(std::net::IpAddr::from([127, 0, 0, 1])),
        IpNet::from(std::net::IpAddr::from(std::net::Ipv6Addr::LOCALHOST)),
    ]
}

fn default_subject_header() -> String {
    "x-auth-subject".to_string()
}

fn default_roles_header() -> String {
    "x-auth-roles".to_string()
}

fn default_original_uri_header() -> String {
    "x-original-uri".to_string()
}

fn default_original_method_header() -> String {
    "x-original-method".to_string()
}
