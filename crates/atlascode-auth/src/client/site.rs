use atlascode_core::DetailedSiteInfo;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::AUTHORIZATION;

/// Authorization a client sends with every request.
#[derive(Clone, PartialEq, Eq)]
pub enum Authorization {
    Bearer(String),
    Basic { username: String, password: String },
}

impl Authorization {
    /// Value of the `Authorization` header.
    pub fn header_value(&self) -> String {
        match self {
            Self::Bearer(token) => format!("Bearer {}", token),
            Self::Basic { username, password } => {
                format!("Basic {}", STANDARD.encode(format!("{}:{}", username, password)))
            }
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Bearer(_) => "bearer",
            Self::Basic { .. } => "basic",
        }
    }
}

impl std::fmt::Debug for Authorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Authorization({}, <redacted>)", self.scheme())
    }
}

/// Authenticated HTTP client for one site.
#[derive(Clone)]
pub struct SiteClient {
    site: DetailedSiteInfo,
    authorization: Authorization,
    http: reqwest::Client,
}

impl SiteClient {
    pub fn new(site: DetailedSiteInfo, authorization: Authorization, http: reqwest::Client) -> Self {
        Self {
            site,
            authorization,
            http,
        }
    }

    pub fn site(&self) -> &DetailedSiteInfo {
        &self.site
    }

    pub fn authorization(&self) -> &Authorization {
        &self.authorization
    }

    /// Request against the site's REST base, e.g. `request(GET, "api/2/myself")`.
    pub fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!(
            "{}/{}",
            self.site.base_api_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        self.http
            .request(method, url)
            .header(AUTHORIZATION, self.authorization.header_value())
    }
}

impl std::fmt::Debug for SiteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteClient")
            .field("site", &self.site.host)
            .field("authorization", &self.authorization)
            .finish()
    }
}
