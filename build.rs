use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

// Build-time configuration, read from the environment or from a `.env` file next to
// Cargo.toml (environment wins):
//   - WIFI_RELAY_SSID, WIFI_RELAY_PASSPHRASE, WIFI_RELAY_AUTH: injected as compile-time env
//   - WIFI_RELAY_HOST: overrides the relay server name
//   - WIFI_RELAY_SECRET_FILE, WIFI_RELAY_ROOT_CERT: paths, copied into OUT_DIR
//
// Missing values still produce a binary; the relay refuses to start until they are set.
const PASSTHROUGH: [&str; 4] = [
    "WIFI_RELAY_SSID",
    "WIFI_RELAY_PASSPHRASE",
    "WIFI_RELAY_AUTH",
    "WIFI_RELAY_HOST",
];

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_default());
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("cargo sets OUT_DIR"));

    let env_path = manifest_dir.join(".env");
    let mut file_cfg = HashMap::new();
    if env_path.exists() {
        println!("cargo:rerun-if-changed={}", env_path.display());
        file_cfg = load_env_file(&env_path);
    }

    for key in PASSTHROUGH {
        println!("cargo:rerun-if-env-changed={key}");
        if let Some(value) = get_cfg(key, &file_cfg) {
            println!("cargo:rustc-env={key}={value}");
        }
    }

    embed_file(
        "WIFI_RELAY_SECRET_FILE",
        &file_cfg,
        &manifest_dir,
        &out_dir.join("secret_token"),
    );
    embed_file(
        "WIFI_RELAY_ROOT_CERT",
        &file_cfg,
        &manifest_dir,
        &out_dir.join("server_root_cert.pem"),
    );
}

/// Copy the file named by `key` to `dest`, or leave an empty placeholder there
fn embed_file(key: &str, file_cfg: &HashMap<String, String>, base: &Path, dest: &Path) {
    println!("cargo:rerun-if-env-changed={key}");

    let contents = match get_cfg(key, file_cfg) {
        Some(path) => {
            let path = base.join(path);
            println!("cargo:rerun-if-changed={}", path.display());
            match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    println!(
                        "cargo:warning={key}: cannot read {}: {e}",
                        path.display()
                    );
                    Vec::new()
                }
            }
        }
        None => Vec::new(),
    };

    if let Err(e) = fs::write(dest, contents) {
        panic!("cannot write {}: {e}", dest.display());
    }
}

fn load_env_file(path: &Path) -> HashMap<String, String> {
    let mut map = HashMap::new();

    let contents = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => return map,
    };

    for line in contents.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            let value = value.trim();

            if !key.is_empty() && !value.is_empty() {
                map.insert(key.to_string(), value.to_string());
            }
        }
    }

    map
}

fn get_cfg(key: &str, file_cfg: &HashMap<String, String>) -> Option<String> {
    if let Ok(v) = env::var(key) {
        let v = v.trim();
        if !v.is_empty() {
            return Some(v.to_string());
        }
    }

    file_cfg
        .get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
