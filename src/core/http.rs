use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING};
use reqwest::Client;

/// `<launcher>/<version>` user agent shared by every outbound request.
pub fn user_agent(launcher_name: &str, launcher_version: &str) -> String {
    format!("{}/{}", launcher_name, launcher_version)
}

pub fn build_http_client(user_agent: &str) -> Result<Client, reqwest::Error> {
    let mut default_headers = HeaderMap::new();
    // Byte counts reported as progress must match the on-disk size.
    default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

    Client::builder()
        .user_agent(user_agent)
        .default_headers(default_headers)
        .build()
}
