//! Platform tags
//!
//! Every platform name that enters the crate (config files, caller
//! arguments, database rows) goes through [`Platform::normalize`], so the
//! rest of the code only ever compares enum values.

use crate::PlatformError;
use std::fmt;
use std::str::FromStr;

/// A crawlable social-media platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Platform {
    Xhs,
    Douyin,
    Bilibili,
    Weibo,
    Kuaishou,
    Tieba,
    Zhihu,
}

impl Platform {
    /// Parses a platform name, accepting the canonical tag and known aliases
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace.
    ///
    /// # Examples
    ///
    /// ```
    /// use crawl_warden::Platform;
    ///
    /// assert_eq!(Platform::normalize("xiaohongshu").unwrap(), Platform::Xhs);
    /// assert_eq!(Platform::normalize(" DY ").unwrap(), Platform::Douyin);
    /// assert!(Platform::normalize("myspace").is_err());
    /// ```
    pub fn normalize(raw: &str) -> Result<Self, PlatformError> {
        let lowered = raw.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "xhs" | "xiaohongshu" | "redbook" => Ok(Self::Xhs),
            "dy" | "douyin" => Ok(Self::Douyin),
            "bili" | "bilibili" => Ok(Self::Bilibili),
            "wb" | "weibo" => Ok(Self::Weibo),
            "ks" | "kuaishou" => Ok(Self::Kuaishou),
            "tieba" => Ok(Self::Tieba),
            "zhihu" => Ok(Self::Zhihu),
            _ => Err(PlatformError::UnknownPlatform(raw.to_string())),
        }
    }

    /// Returns the canonical tag, the only spelling written to storage
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Xhs => "xhs",
            Self::Douyin => "douyin",
            Self::Bilibili => "bilibili",
            Self::Weibo => "weibo",
            Self::Kuaishou => "kuaishou",
            Self::Tieba => "tieba",
            Self::Zhihu => "zhihu",
        }
    }

    /// Returns all supported platforms
    pub fn all() -> [Self; 7] {
        [
            Self::Xhs,
            Self::Douyin,
            Self::Bilibili,
            Self::Weibo,
            Self::Kuaishou,
            Self::Tieba,
            Self::Zhihu,
        ]
    }
}

impl FromStr for Platform {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::normalize(s)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
