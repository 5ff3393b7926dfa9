use url::Url;

// For argp::FromArgs
pub fn parse_url(value: &str) -> Result<Url, String> {
    Url::parse(value).map_err(|e| format!("invalid URL {value:?}: {e}"))
}
