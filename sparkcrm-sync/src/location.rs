/// Navigable location
///
/// The guard reads the current path to decide access and navigates on
/// redirects; the edit resolver reads the `id` query parameter.
/// [`MemoryLocation`] keeps the location in-process with a history stack and
/// a `watch` channel so presentation code can react to navigation.
///
/// # Example
///
/// ```
/// use sparkcrm_sync::location::{Location, MemoryLocation};
///
/// let location = MemoryLocation::new("/tasks?id=42");
/// assert_eq!(location.path(), "/tasks");
/// assert_eq!(location.query("id").as_deref(), Some("42"));
///
/// location.navigate("/login");
/// assert_eq!(location.path(), "/login");
/// assert_eq!(location.query("id"), None);
/// ```

use std::sync::Mutex;
use tokio::sync::watch;

/// Navigable location contract
pub trait Location: Send + Sync {
    /// Path without query string
    fn path(&self) -> String;

    /// First value of a query parameter
    fn query(&self, key: &str) -> Option<String>;

    /// Replaces the current location (`target` may carry a query string)
    fn navigate(&self, target: &str);
}

/// In-process location with history
pub struct MemoryLocation {
    current: watch::Sender<String>,
    history: Mutex<Vec<String>>,
}

impl MemoryLocation {
    pub fn new(initial: &str) -> Self {
        let (current, _) = watch::channel(initial.to_string());
        MemoryLocation {
            current,
            history: Mutex::new(vec![initial.to_string()]),
        }
    }

    /// Full current target, path plus query
    pub fn href(&self) -> String {
        self.current.borrow().clone()
    }

    /// Every location visited, oldest first
    pub fn history(&self) -> Vec<String> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Goes back one entry; returns false at the start of history
    pub fn back(&self) -> bool {
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        if history.len() < 2 {
            return false;
        }

        history.pop();
        if let Some(previous) = history.last() {
            self.current.send_replace(previous.clone());
        }
        true
    }

    /// Notified on every navigation
    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.current.subscribe()
    }
}

impl Default for MemoryLocation {
    fn default() -> Self {
        Self::new(crate::routes::ROOT)
    }
}

impl Location for MemoryLocation {
    fn path(&self) -> String {
        split_target(&self.current.borrow()).0.to_string()
    }

    fn query(&self, key: &str) -> Option<String> {
        let href = self.current.borrow();
        parse_query(split_target(&href).1)
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    fn navigate(&self, target: &str) {
        if *self.current.borrow() == target {
            return;
        }

        tracing::debug!(from = %self.current.borrow().as_str(), to = %target, "Navigating");
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(target.to_string());
        self.current.send_replace(target.to_string());
    }
}

/// Splits `path?query#fragment` into path and query
fn split_target(target: &str) -> (&str, &str) {
    let target = target.split('#').next().unwrap_or_default();
    match target.split_once('?') {
        Some((path, query)) => (path, query),
        None => (target, ""),
    }
}

/// Parses `a=1&b=two%20words` into decoded pairs
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (percent_decode(k), percent_decode(v)),
            None => (percent_decode(pair), String::new()),
        })
        .collect()
}

fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|h| u8::from_str_radix(h, 16).ok());
                match hex {
                    Some(byte) => {
                        out.push(byte);
                        i += 2;
                    }
                    None => out.push(b'%'),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query() {
        let pairs = parse_query("id=42&q=ada+lovelace&flag&name=Ada%20L.");
        assert_eq!(
            pairs,
            vec![
                ("id".to_string(), "42".to_string()),
                ("q".to_string(), "ada lovelace".to_string()),
                ("flag".to_string(), String::new()),
                ("name".to_string(), "Ada L.".to_string()),
            ]
        );
    }

    #[test]
    fn test_malformed_escape_kept() {
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
    }

    #[test]
    fn test_history_and_back() {
        let location = MemoryLocation::new("/dashboard");
        location.navigate("/tasks?id=7");
        location.navigate("/tasks?id=7");
        location.navigate("/contacts");

        assert_eq!(location.history(), vec!["/dashboard", "/tasks?id=7", "/contacts"]);
        assert!(location.back());
        assert_eq!(location.href(), "/tasks?id=7");
        assert!(location.back());
        assert!(!location.back());
        assert_eq!(location.path(), "/dashboard");
    }

    #[test]
    fn test_fragment_ignored() {
        let location = MemoryLocation::new("/contacts?id=abc#form");
        assert_eq!(location.path(), "/contacts");
        assert_eq!(location.query("id").as_deref(), Some("abc"));
    }
}
