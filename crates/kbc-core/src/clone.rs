//! Replaying configurations and orchestrations into another project.
//!
//! Neither operation is transactional. A configuration clone that fails on a
//! row leaves the configuration and the rows created before it in place.

use crate::error::{KbcError, Result};
use crate::orchestrator::{OrchestrationSpec, OrchestratorApi};
use crate::storage::{describe, NewConfiguration, NewConfigurationRow, StorageApi};
use serde_json::Value;

/// Component id under which orchestrations are stored as configurations.
pub const ORCHESTRATOR_COMPONENT: &str = "orchestrator";

/// Copy `component_id/configuration_id` and its rows from `source` to
/// `destination`. Returns the destination configuration id.
pub fn clone_configuration(
    source: &dyn StorageApi,
    destination: &dyn StorageApi,
    component_id: &str,
    configuration_id: &str,
    use_source_id: bool,
) -> Result<String> {
    let config = source.get_configuration(component_id, configuration_id)?;
    let rows = source.list_configuration_rows(component_id, configuration_id)?;

    let payload = NewConfiguration::from_source(&config, use_source_id);
    tracing::info!(
        component_id,
        source_id = configuration_id,
        payload = %describe(&payload),
        "transferring configuration"
    );
    let created = destination.create_configuration(component_id, &payload)?;
    let new_id = created.id;

    tracing::info!(component_id, configuration_id = %new_id, rows = rows.len(), "transferring rows");
    for (index, row) in rows.iter().enumerate() {
        let new_row = NewConfigurationRow::from_source(row);
        destination
            .create_configuration_row(component_id, &new_id, &new_row)
            .map_err(|e| KbcError::RowClone {
                configuration_id: new_id.clone(),
                index,
                row_name: row.name.clone(),
                source: Box::new(e),
            })?;
        tracing::debug!(row = %row.name, index, "row created");
    }

    Ok(new_id)
}

/// Recreate an orchestration from `source` via `destination`'s orchestrator.
///
/// Every configuration referenced by a task must already exist at the
/// destination; the orchestrator rejects the request otherwise.
pub fn clone_orchestration(
    source: &dyn StorageApi,
    destination: &dyn OrchestratorApi,
    orchestration_id: &str,
) -> Result<Value> {
    let orchestration = source.get_configuration(ORCHESTRATOR_COMPONENT, orchestration_id)?;
    let tasks = orchestration
        .configuration
        .get("tasks")
        .cloned()
        .ok_or_else(|| {
            KbcError::incomplete(format!("task list in orchestration {orchestration_id}"))
        })?;
    tracing::info!(orchestration_id, name = %orchestration.name, "cloning orchestration");
    destination.create_orchestration(&OrchestrationSpec::new(&orchestration.name, tasks))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
