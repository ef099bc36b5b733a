#[cfg(debug_assertions)]
pub const NAME: &str = "Scribe-debug";

#[cfg(not(debug_assertions))]
pub const NAME: &str = "Scribe";

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Directory under the user's config dir that holds the API key file. Not
/// derived from [`NAME`] so existing key files keep working.
pub const KEY_DIR: &str = "deepseek-nvim";
