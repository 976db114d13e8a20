use crate::output::print_json;
use chrono::{DateTime, Utc};
use kbc_core::monitoring::{links, TimeWindow};

pub fn run(
    component: &str,
    job: Option<&str>,
    window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    json: bool,
) -> anyhow::Result<()> {
    let window = window
        .map(|(from, to)| TimeWindow::new(from, to))
        .transpose()?;
    let built = links(component, job, window.as_ref())?;

    if json {
        return print_json(&built);
    }
    println!("Live tail:       {}", built.live_tail);
    if let Some(url) = &built.pod_stats {
        println!("Pod stats:       {url}");
    }
    if let Some(url) = &built.container_stats {
        println!("Container stats: {url}");
    }
    if job.is_some() && window.is_none() {
        println!("(pass --from and --to for the pod stats dashboard)");
    }
    Ok(())
}
