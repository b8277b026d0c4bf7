use anyhow::Result;
use regex::Regex;
use std::fmt;

use crate::config::Config;
use crate::harvest;

/// Default file-name policy: letters, underscore or hyphen, then `.log`.
pub const DEFAULT_NAME_PATTERN: &str = r"^[a-zA-Z_-]*\.log$";

/// Filename filter selecting which remote files are logs.
///
/// Matching is anchored at the start of the name; anchor the end with `$`
/// in the pattern itself.
#[derive(Debug, Clone)]
pub struct NamePattern {
    source: String,
    regex: Regex,
}

impl NamePattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{})", pattern))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    /// Keep the matching names, preserving their order.
    pub fn select(&self, names: Vec<String>) -> Vec<String> {
        names.into_iter().filter(|n| self.is_match(n)).collect()
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl Default for NamePattern {
    fn default() -> Self {
        Self::new(DEFAULT_NAME_PATTERN)
            .unwrap_or_else(|e| unreachable!("default name pattern is valid: {e}"))
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Connect to the configured remote and print the log files it would harvest.
pub fn list_sources(config: &Config) -> Result<()> {
    let pattern = config.remote.name_pattern()?;
    let mut transport = harvest::connect_transport(config)?;
    let names = transport.list(config.remote.listing_dir(), &pattern)?;
    transport.disconnect();

    println!(
        "{} {} (mask {})",
        transport.protocol(),
        config.remote.connect_params()?.target(),
        pattern
    );
    println!("{:<32} STATUS", "FILE");
    for name in &names {
        println!("{:<32} {}", name, "MATCH");
    }
    println!("{} log file(s)", names.len());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pattern_accepts_plain_log_names() {
        let p = NamePattern::default();
        assert!(p.is_match("A.log"));
        assert!(p.is_match("app_server-main.log"));
        assert!(p.is_match(".log"));
    }

    #[test]
    fn default_pattern_rejects_other_names() {
        let p = NamePattern::default();
        assert!(!p.is_match("app2.log"));
        assert!(!p.is_match("app.log.1"));
        assert!(!p.is_match("app.txt"));
        assert!(!p.is_match("app.logx"));
        assert!(!p.is_match("my app.log"));
        assert!(!p.is_match("appXlog"));
    }

    #[test]
    fn matching_is_anchored_at_start() {
        let p = NamePattern::new(r"server.*\.log").unwrap();
        assert!(p.is_match("server-1.log"));
        assert!(p.is_match("server-1.log.gz"), "end is not anchored implicitly");
        assert!(!p.is_match("old-server-1.log"));
    }

    #[test]
    fn select_preserves_order() {
        let p = NamePattern::default();
        let names = vec![
            "z.log".to_string(),
            "skip.txt".to_string(),
            "a.log".to_string(),
        ];
        assert_eq!(p.select(names), vec!["z.log", "a.log"]);
    }

    #[test]
    fn display_shows_pattern_as_written() {
        let p = NamePattern::new(r"[a-z]+\.log$").unwrap();
        assert_eq!(p.to_string(), r"[a-z]+\.log$");
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        assert!(NamePattern::new("(unclosed").is_err());
    }
}
