//! Types shared across PR-host implementations.

use serde::{Deserialize, Serialize};

pub use crate::meta::PrState;

/// A pull request as reported by the host, reduced to what the sync and
/// doctor engines consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemotePr {
    pub number: u64,
    pub state: PrState,
    /// Base branch of the PR on the host.
    pub base: String,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_pr_state_parses_host_casing() {
        let json = r#"{"number":12,"state":"MERGED","base":"main","url":"https://example.test/pr/12"}"#;
        let pr: RemotePr = serde_json::from_str(json).unwrap();
        assert_eq!(pr.state, PrState::Merged);
        assert_eq!(pr.number, 12);
    }
}
