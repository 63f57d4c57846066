//! Build metadata reported by `/api/health` and `banbridge --version`.

/// Short git commit hash at build time, or `unknown` outside a checkout.
pub const GIT_HASH: &str = env!("BANBRIDGE_GIT_HASH");

/// Cargo profile the bridge was built with.
pub const BUILD_PROFILE: &str = env!("BANBRIDGE_BUILD_PROFILE");

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// `"0.1.0 (abc1234, release)"`
pub fn version_string() -> String {
    format!("{VERSION} ({GIT_HASH}, {BUILD_PROFILE})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_string_names_version_and_hash() {
        let v = version_string();
        assert!(v.starts_with(VERSION));
        assert!(v.contains(GIT_HASH));
    }

    #[test]
    fn test_git_hash_not_empty() {
        assert!(!GIT_HASH.is_empty());
    }
}
