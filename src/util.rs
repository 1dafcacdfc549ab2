use std::sync::LazyLock;

use regex::Regex;

// used to remove cred info from proxy url before printing
static AUTH_REGEX: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"//[^:/@]+(:[^@]+)?@").unwrap());

pub fn redact_proxy(proxy: &str) -> String {
  AUTH_REGEX.replace(proxy, "//<REDACTED>@").into_owned()
}

/// `Content-Disposition` value that survives non-ASCII file names: a plain
/// ASCII fallback plus the RFC 5987 encoded name.
pub fn attachment_disposition(file_name: &str) -> String {
  let fallback: String = file_name
    .chars()
    .map(|c| match c {
      '"' | '\\' => '_',
      c if c.is_ascii() && !c.is_ascii_control() => c,
      _ => '_',
    })
    .collect();

  let mut encoded = String::with_capacity(file_name.len());
  for byte in file_name.bytes() {
    match byte {
      b'A'..=b'Z'
      | b'a'..=b'z'
      | b'0'..=b'9'
      | b'-'
      | b'.'
      | b'_'
      | b'~' => encoded.push(byte as char),
      _ => encoded.push_str(&format!("%{byte:02X}")),
    }
  }

  format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}
