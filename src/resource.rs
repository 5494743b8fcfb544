use url::Url;

/// Just a wrapper around the API base URL and the session credentials
#[derive(Clone)]
pub struct Resource {
    base_url: Url,
    session_uid: String,
    access_token: String,
}

impl Resource {
    pub fn new(base_url: Url, session_uid: String, access_token: String) -> Self {
        Self {
            base_url,
            session_uid,
            access_token,
        }
    }

    pub fn session_uid(&self) -> &str {
        &self.session_uid
    }
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Build the absolute URL for an API route
    pub fn route(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(path)
    }
}
