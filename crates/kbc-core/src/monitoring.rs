//! Links into the Datadog dashboards used to debug component jobs.
//! Nothing here touches the network.

use crate::error::{KbcError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

const DATADOG: &str = "https://app.datadoghq.eu";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self> {
        if to < from {
            return Err(KbcError::invalid(format!(
                "time window ends ({to}) before it starts ({from})"
            )));
        }
        Ok(Self { from, to })
    }

    fn query(&self) -> String {
        format!(
            "from_ts={}&to_ts={}",
            self.from.timestamp_millis(),
            self.to.timestamp_millis()
        )
    }
}

/// Container names embed the component id with dots replaced.
fn normalized(component_id: &str) -> String {
    component_id.replace('.', "-")
}

fn require(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(KbcError::missing(what.to_string()));
    }
    Ok(())
}

/// Live tail of error-level logs for a component, optionally one job only.
pub fn live_tail_url(component_id: &str, job_id: Option<&str>) -> Result<String> {
    require(component_id, "component id")?;
    let mut query = format!(
        "%40component%3A{component_id}%20%40priority%3A%28ERROR%20OR%20CRITICAL%20OR%20EMERGENCY%29%20"
    );
    if let Some(job) = job_id.filter(|j| !j.is_empty()) {
        query.push_str(&format!("%40runId%3A{job}"));
    }
    Ok(format!(
        "{DATADOG}/logs/livetail?query={query}&agg_m=count&agg_m_source=base&agg_t=count\
         &cols=host%2Cservice&fromUser=true&messageDisplay=inline&refresh_mode=sliding\
         &storage=live&stream_sort=desc&view=spans&viz=stream&live=true"
    ))
}

/// Job queue dashboard scoped to one job's pod.
pub fn pod_stats_url(component_id: &str, job_id: &str, window: &TimeWindow) -> Result<String> {
    require(component_id, "component id")?;
    require(job_id, "job id")?;
    let norm = normalized(component_id);
    Ok(format!(
        "{DATADOG}/dashboard/9ku-8g9-5b2/job-queue-daemon?fromUser=true&refresh_mode=paused\
         &tpl_var_componentid[0]={component_id}\
         &tpl_var_container_name[0]={job_id}-{job_id}--0-{norm}\
         &tpl_var_pod_name[0]=job-{job_id}&{}&live=false",
        window.query()
    ))
}

/// Container process view for one job.
pub fn container_stats_url(
    component_id: &str,
    job_id: &str,
    window: Option<&TimeWindow>,
) -> Result<String> {
    require(component_id, "component id")?;
    require(job_id, "job id")?;
    let norm = normalized(component_id);
    let mut url = format!(
        "{DATADOG}/containers?query=short_image:{component_id}%20AND%20container_name:{job_id}-{job_id}--0-{norm}\
         &selectedTopGraph=timeseries"
    );
    if let Some(window) = window {
        url.push('&');
        url.push_str(&window.query());
    }
    Ok(url)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitoringLinks {
    pub live_tail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_stats: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_stats: Option<String>,
}

/// Every link that can be built from the inputs given.
pub fn links(component_id: &str, job_id: Option<&str>, window: Option<&TimeWindow>) -> Result<MonitoringLinks> {
    let live_tail = live_tail_url(component_id, job_id)?;
    let job = job_id.filter(|j| !j.is_empty());
    let pod_stats = match (job, window) {
        (Some(job), Some(window)) => Some(pod_stats_url(component_id, job, window)?),
        _ => None,
    };
    let container_stats = match job {
        Some(job) => Some(container_stats_url(component_id, job, window)?),
        None => None,
    };
    Ok(MonitoringLinks {
        live_tail,
        pod_stats,
        container_stats,
    })
}
