use crate::context::{Context, GlobalArgs};
use crate::output::{print_json, print_table};
use kbc_core::region::Service;

pub fn run(globals: &GlobalArgs, json: bool) -> anyhow::Result<()> {
    let ctx = Context::load(globals)?;
    let regions: Vec<_> = ctx.regions().iter().collect();

    if json {
        return print_json(&regions);
    }

    let rows = regions
        .iter()
        .map(|r| {
            let token = match (ctx.config.manage_token(r), ctx.config.storage_token(r)) {
                (Some(_), Some(_)) => "manage, storage",
                (Some(_), None) => "manage",
                (None, Some(_)) => "storage",
                (None, None) => "-",
            };
            vec![
                r.id.clone(),
                r.aliases.join(","),
                r.url(Service::Connection),
                token.to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "ALIASES", "CONNECTION", "TOKENS"], rows);
    Ok(())
}
