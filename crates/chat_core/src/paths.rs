use std::path::PathBuf;

/// Client data directory (~/.agentic-chat)
pub fn app_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join(".agentic-chat")
}

/// Path of the user-level config.json
pub fn config_json_path() -> PathBuf {
    app_dir().join("config.json")
}
