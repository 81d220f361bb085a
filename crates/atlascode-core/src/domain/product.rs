use serde::{Deserialize, Serialize};

/// Product a site belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductKey {
    Jira,
    Bitbucket,
}

impl ProductKey {
    /// Storage prefix, e.g. `jira`.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Jira => "jira",
            Self::Bitbucket => "bitbucket",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Jira => "Jira",
            Self::Bitbucket => "Bitbucket",
        }
    }

    /// Global state key of the product's site list, e.g. `jiraSites`.
    pub fn sites_key(&self) -> String {
        format!("{}Sites", self.key())
    }

    pub fn all() -> [ProductKey; 2] {
        [Self::Jira, Self::Bitbucket]
    }
}

impl std::fmt::Display for ProductKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}
