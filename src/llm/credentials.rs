//! 单次请求的 Provider 凭据
//!
//! 凭据随调用显式传递，不存入 ProviderPool / 记忆 / transcript；Debug 输出只显示 Provider 名。

use std::collections::HashMap;
use std::fmt;

/// 单个 API Key；Debug / Display 不泄露内容
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Provider id -> Credential
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    keys: HashMap<String, Credential>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: impl Into<String>, secret: impl Into<String>) -> Self {
        self.insert(provider, secret);
        self
    }

    pub fn insert(&mut self, provider: impl Into<String>, secret: impl Into<String>) {
        self.keys.insert(provider.into(), Credential::new(secret));
    }

    pub fn get(&self, provider: &str) -> Option<&Credential> {
        self.keys.get(provider)
    }

    pub fn contains(&self, provider: &str) -> bool {
        self.keys.contains_key(provider)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.keys.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("Credentials").field("providers", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_does_not_leak_secret() {
        let creds = Credentials::new().with("groq", "gsk-very-secret");
        let printed = format!("{:?}", creds);
        assert!(printed.contains("groq"));
        assert!(!printed.contains("gsk-very-secret"));
        assert_eq!(format!("{:?}", creds.get("groq").unwrap()), "Credential(***)");
    }

    #[test]
    fn test_lookup() {
        let creds = Credentials::new().with("gemini", "k");
        assert!(creds.contains("gemini"));
        assert_eq!(creds.get("gemini").map(Credential::expose), Some("k"));
        assert!(creds.get("groq").is_none());
    }
}
