//! Deep links into the subtitle service website.

/// Builds page URLs under the service base URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeepLinks {
    base_url: String,
}

impl DeepLinks {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url }
    }

    /// Page for a subtitle entry
    pub fn entry(&self, id: u64) -> String {
        format!("{}/entry/{}", self.base_url, id)
    }

    /// Listing of entries matching an AniList user's list
    pub fn anilist_user(&self, username: &str) -> String {
        format!("{}/anilist/{}", self.base_url, username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_links() {
        let links = DeepLinks::new("https://jimaku.cc/");
        assert_eq!(links.entry(555), "https://jimaku.cc/entry/555");
        assert_eq!(
            links.anilist_user("someuser"),
            "https://jimaku.cc/anilist/someuser"
        );
    }
}
