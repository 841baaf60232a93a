use std::path::PathBuf;

/// Port the bridge listens on unless configured otherwise.
pub const DEFAULT_BRIDGE_PORT: u16 = 7271;
const DEFAULT_BRIDGE_HOST: &str = "127.0.0.1";

pub fn default_base_url() -> String {
    format!("http://{}:{}", DEFAULT_BRIDGE_HOST, DEFAULT_BRIDGE_PORT)
}

/// Path of the IPC server mpv is started with (`--input-ipc-server=...`).
#[cfg(unix)]
pub fn mpv_ipc_path() -> String {
    "/tmp/mpvsocket".to_string()
}

#[cfg(windows)]
pub fn mpv_ipc_path() -> String {
    r"\\.\pipe\mpvsocket".to_string()
}

pub fn data_dir() -> PathBuf {
    // ~/.local/share/mpv-remote/ on macOS too, for consistency with Linux
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join("mpv-remote")
    }
    #[cfg(windows)]
    {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mpv-remote")
    }
}

pub fn config_dir() -> PathBuf {
    // On Windows, a config.toml next to the executable wins (portable installs)
    #[cfg(windows)]
    {
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                if exe_dir.join("config.toml").exists() {
                    return exe_dir.to_path_buf();
                }
            }
        }
    }

    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("mpv-remote")
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mpv-remote")
    }
}
