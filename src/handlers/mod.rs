pub mod admin;
pub mod api;
pub mod qr;
pub mod redirect;

/// Query pairs as sent, repeated keys included.
pub type QueryPairs = Vec<(String, String)>;

/// Last value given for `name`. Scanning clients sometimes repeat keys;
/// the final occurrence wins instead of the request failing.
pub fn last_param(pairs: &[(String, String)], name: &str) -> Option<String> {
    pairs
        .iter()
        .rev()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.clone())
}
