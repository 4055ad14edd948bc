#![allow(clippy::doc_markdown)] // Generated file contains OPT_LEVEL without backticks

use std::sync::LazyLock;

include!(concat!(env!("OUT_DIR"), "/built.rs"));

/// Version written to the log and the output @PG record: the package version, the git
/// commit when built from a checkout, and `-dirty` for uncommitted changes.
pub static VERSION: LazyLock<String> = LazyLock::new(|| {
    let prefix = match GIT_COMMIT_HASH_SHORT {
        Some(hash) => format!("{PKG_VERSION}-{hash}"),
        None => PKG_VERSION.to_string(),
    };
    let suffix = if GIT_DIRTY == Some(true) { "-dirty" } else { "" };
    format!("{prefix}{suffix}")
});
