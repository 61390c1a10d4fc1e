//! Engine configuration
//!
//! Settings shared by the ETL runner, the chain orchestrator and the default
//! query evaluator.

/// Default delimiter used when upserting a string onto an existing string
pub const DEFAULT_DELIMITER: &str = "\n";

/// Engine configuration
///
/// # Examples
///
/// ```rust
/// use jtl::EngineConfig;
///
/// let config = EngineConfig::default()
///     .with_delimiter(" | ")
///     .with_cache_size(64);
/// assert_eq!(config.delimiter, " | ");
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Delimiter placed between concatenated strings under upsert.
    /// Default: `"\n"`
    pub delimiter: String,

    /// Cache parsed query programs. Default: true
    pub enable_query_cache: bool,

    /// Maximum number of cached query programs. Default: 512
    pub max_cache_size: usize,
}

impl EngineConfig {
    /// Create new configuration with all defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the string upsert delimiter
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Enable or disable the query program cache
    pub fn with_query_cache(mut self, enabled: bool) -> Self {
        self.enable_query_cache = enabled;
        self
    }

    /// Set maximum query cache size
    pub fn with_cache_size(mut self, size: usize) -> Self {
        self.max_cache_size = size;
        self
    }

    /// Options handed to the merge engine
    pub fn merge_options(&self) -> crate::merge::MergeOptions {
        crate::merge::MergeOptions::new(self.delimiter.clone())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER.to_string(),
            enable_query_cache: true,
            max_cache_size: 512,
        }
    }
}

/// Decode backslash escapes in a user-supplied delimiter
///
/// Command lines and JSON specs usually carry delimiters like `\n` as two
/// characters. Supports `\n`, `\t`, `\r`, `\0`, `\\`, `\"`, `\'` and
/// `\uXXXX`; any other escape is kept verbatim.
pub fn decode_escapes(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) if hex.len() == 4 => out.push(decoded),
                    _ => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.delimiter, "\n");
        assert!(config.enable_query_cache);
    }

    #[test]
    fn test_decode_escapes() {
        assert_eq!(decode_escapes("\\n"), "\n");
        assert_eq!(decode_escapes(" | "), " | ");
        assert_eq!(decode_escapes("a\\tb"), "a\tb");
        assert_eq!(decode_escapes("\\u00e9"), "é");
        assert_eq!(decode_escapes("\\q"), "\\q");
        assert_eq!(decode_escapes("trailing\\"), "trailing\\");
    }
}
