use std::sync::LazyLock;

static VERSION: LazyLock<String> = LazyLock::new(|| match git_describe() {
    Some(describe) => format!("{} ({describe})", env!("CARGO_PKG_VERSION")),
    None => env!("CARGO_PKG_VERSION").to_string(),
});

/// `git describe` output stamped by build.rs, when built from a checkout.
pub fn git_describe() -> Option<&'static str> {
    option_env!("AGORA_BUILD_GIT_DESCRIBE")
}

/// Version string shown by `agora --version`.
pub fn version() -> &'static str {
    VERSION.as_str()
}
