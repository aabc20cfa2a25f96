use std::sync::LazyLock;

/// Defines the application version.
///
/// `IMAGE_VERSION` comes from the build script; the git commit is only
/// available when the crate is built from a checkout.
pub static VERSION: LazyLock<String> = LazyLock::new(|| {
    let dirty = matches!(option_env!("VERGEN_GIT_DIRTY"), Some("true"));
    format!(
        "{}-{}{}",
        env!("IMAGE_VERSION"),
        option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
        if dirty { "-dirty" } else { "" }
    )
});
