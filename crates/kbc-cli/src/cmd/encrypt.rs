use crate::context::{Context, GlobalArgs};
use crate::output::print_json;
use anyhow::Context as _;
use kbc_core::encryption::EncryptionScope;
use std::io::Read;

pub fn run(
    globals: &GlobalArgs,
    value: Option<String>,
    component: String,
    project: Option<String>,
    config_id: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let ctx = Context::load(globals)?;
    let session = ctx.session(globals)?;

    let plaintext = match value {
        Some(v) => v,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read value from stdin")?;
            buf.trim_end_matches(['\r', '\n']).to_string()
        }
    };

    let scope = EncryptionScope {
        component_id: component,
        project_id: project,
        config_id,
    };
    let cipher = session
        .encryption()?
        .encrypt(&scope, &plaintext)
        .with_context(|| format!("failed to encrypt for {}", scope.component_id))?;

    if json {
        return print_json(&serde_json::json!({ "value": cipher }));
    }
    println!("{cipher}");
    Ok(())
}
