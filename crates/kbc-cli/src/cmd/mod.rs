pub mod component;
pub mod config;
pub mod encrypt;
pub mod maintainer;
pub mod migrate;
pub mod monitor;
pub mod oauth;
pub mod orchestration;
pub mod portal;
pub mod project;
pub mod regions;
pub mod user;

use anyhow::Context;
use serde_json::Value;
use std::io::Read;

/// Parse a JSON argument: inline JSON, `@path` for a file, or `-` for stdin.
pub fn read_json_arg(arg: &str) -> anyhow::Result<Value> {
    let text = if arg == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read JSON from stdin")?;
        buf
    } else if let Some(path) = arg.strip_prefix('@') {
        std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?
    } else {
        arg.to_string()
    };
    serde_json::from_str(&text).context("argument is not valid JSON")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_arg_inline_and_file() {
        assert_eq!(read_json_arg(r#"{"a": 1}"#).unwrap()["a"], 1);

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("p.json");
        std::fs::write(&path, r#"{"app_secret": "s"}"#).unwrap();
        let value = read_json_arg(&format!("@{}", path.display())).unwrap();
        assert_eq!(value["app_secret"], "s");

        assert!(read_json_arg("{not json").is_err());
    }
}
