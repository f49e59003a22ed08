//! Built-in toolsets served by the gateway.

use super::{CatalogError, PlatformClient, RestTool, Toolset, ToolsetRegistry};

const PAGING: &[&str] = &["page", "size", "search_term"];

fn toolset(
    platform: &PlatformClient,
    name: &str,
    description: &str,
    tools: Vec<RestTool>,
) -> Toolset {
    tools
        .into_iter()
        .fold(Toolset::new(name, description), |set, tool| {
            set.with_tool(tool.into_tool(platform))
        })
}

/// Registry holding every built-in toolset.
pub fn default_registry(platform: &PlatformClient) -> Result<ToolsetRegistry, CatalogError> {
    let mut registry = ToolsetRegistry::new();

    let toolsets = vec![
        toolset(platform, "default", "Account, organization and project basics", vec![
            RestTool::get("get_account", "Get the caller's account", "/ng/api/accounts/{account_id}"),
            RestTool::get("list_organizations", "List organizations", "/ng/api/organizations").query(PAGING),
            RestTool::get("list_projects", "List projects", "/ng/api/projects").query(PAGING),
        ]),
        toolset(platform, "pipelines", "Pipelines and executions", vec![
            RestTool::get("list_pipelines", "List pipelines", "/pipeline/api/pipelines/list").query(PAGING),
            RestTool::get("get_pipeline", "Get a pipeline definition", "/pipeline/api/pipelines/{pipeline_id}"),
            RestTool::get("list_executions", "List pipeline executions", "/pipeline/api/pipelines/execution/summary").query(&["pipeline_id", "status", "page", "size"]),
            RestTool::get("get_execution", "Get a pipeline execution", "/pipeline/api/pipelines/execution/v2/{execution_id}"),
        ]),
        toolset(platform, "templates", "Reusable templates", vec![
            RestTool::get("list_templates", "List templates", "/template/api/templates/list-metadata").query(PAGING),
        ]),
        toolset(platform, "audit", "Audit trail", vec![
            RestTool::get("list_audit_events", "List audit events", "/audit/api/audits/list").query(&["start_time", "end_time", "page", "size"]),
        ]),
        toolset(platform, "connectors", "Connectors to external systems", vec![
            RestTool::get("list_connectors", "List connectors", "/ng/api/connectors").query(PAGING),
            RestTool::get("get_connector", "Get a connector", "/ng/api/connectors/{connector_id}"),
        ]),
        toolset(platform, "dashboards", "Dashboards", vec![
            RestTool::get("list_dashboards", "List dashboards", "/dashboard/v1/search").query(PAGING),
            RestTool::get("get_dashboard_data", "Get dashboard data", "/dashboard/v1/dashboards/{dashboard_id}/download"),
        ]),
        toolset(platform, "ci", "Continuous integration builds", vec![
            RestTool::get("get_build_logs", "Download logs for a build", "/gateway/log-service/blob/download").query(&["prefix"]),
        ]),
        toolset(platform, "services", "Deployment services", vec![
            RestTool::get("list_services", "List services", "/ng/api/servicesV2").query(PAGING),
            RestTool::get("get_service", "Get a service", "/ng/api/servicesV2/{service_id}"),
        ]),
        toolset(platform, "environments", "Deployment environments", vec![
            RestTool::get("list_environments", "List environments", "/ng/api/environmentsV2").query(PAGING),
            RestTool::get("get_environment", "Get an environment", "/ng/api/environmentsV2/{environment_id}"),
        ]),
        toolset(platform, "infrastructure", "Infrastructure definitions", vec![
            RestTool::get("list_infrastructures", "List infrastructure definitions", "/ng/api/infrastructures").query(&["environment_id", "page", "size"]),
        ]),
        toolset(platform, "ccm", "Cloud cost management", vec![
            RestTool::get("get_cost_overview", "Get the cloud cost overview", "/ccm/api/overview").query(&["start_time", "end_time"]),
            RestTool::get("list_perspectives", "List cost perspectives", "/ccm/api/perspective/getAllPerspectives").query(PAGING),
        ]),
        toolset(platform, "repositories", "Code repositories", vec![
            RestTool::get("list_repositories", "List repositories", "/code/api/v1/repos").query(PAGING),
            RestTool::get("get_repository", "Get a repository", "/code/api/v1/repos/{repo_id}"),
        ]),
        toolset(platform, "pullrequests", "Pull requests", vec![
            RestTool::get("list_pull_requests", "List pull requests", "/code/api/v1/repos/{repo_id}/pullreq").query(&["state", "page", "limit"]),
            RestTool::get("get_pull_request", "Get a pull request", "/code/api/v1/repos/{repo_id}/pullreq/{pr_number}"),
            RestTool::post("create_pull_request", "Open a pull request", "/code/api/v1/repos/{repo_id}/pullreq"),
        ]),
        toolset(platform, "sto", "Security testing orchestration", vec![
            RestTool::get("list_security_issues", "List security issues", "/sto/api/v2/issues").query(&["severity", "page", "size"]),
        ]),
        toolset(platform, "scs", "Software supply chain security", vec![
            RestTool::get("list_artifact_sources", "List artifact sources", "/ssca-manager/v1/artifact-sources").query(PAGING),
        ]),
        toolset(platform, "chaos", "Chaos experiments", vec![
            RestTool::get("list_experiments", "List chaos experiments", "/chaos/manager/api/rest/v2/experiment").query(PAGING),
            RestTool::post("run_experiment", "Run a chaos experiment", "/chaos/manager/api/rest/v2/experiments/{experiment_id}/run"),
        ]),
        toolset(platform, "idp", "Internal developer portal", vec![
            RestTool::get("list_entities", "List catalog entities", "/v1/entities").query(&["kind", "page", "limit"]),
            RestTool::get("get_scorecard", "Get a scorecard", "/v1/scorecards/{scorecard_id}"),
        ]),
        toolset(platform, "registries", "Artifact registries", vec![
            RestTool::get("list_registries", "List artifact registries", "/har/api/v1/spaces/registries").query(PAGING),
            RestTool::get("list_artifacts", "List artifacts in a registry", "/har/api/v1/registry/{registry_id}/artifacts").query(PAGING),
        ]),
        toolset(platform, "sei", "Software engineering insights", vec![
            RestTool::get("get_productivity_metrics", "Get productivity metrics", "/sei/api/v1/productivity").query(&["team_id", "start_time", "end_time"]),
        ]),
        toolset(platform, "dbops", "Database DevOps", vec![
            RestTool::get("list_db_schemas", "List database schemas", "/dbops/v1/schema").query(PAGING),
        ]),
        toolset(platform, "iacm", "Infrastructure as code management", vec![
            RestTool::get("list_workspaces", "List IaC workspaces", "/iacm/api/workspaces").query(PAGING),
        ]),
        toolset(platform, "fme", "Feature management and experimentation", vec![
            RestTool::get("list_feature_flags", "List feature flags", "/fme/api/v2/splits").query(PAGING),
        ]),
    ];

    for set in toolsets {
        registry.register(set)?;
    }

    tracing::info!(
        toolsets = registry.toolsets().len(),
        tools = registry.tool_count(),
        "Default tool catalog registered"
    );

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::ModuleRegistry;
    use crate::toolsets::ToolGroupIndex;
    use reqwest::Url;
    use std::collections::BTreeSet;
    use std::time::Duration;

    fn platform() -> PlatformClient {
        PlatformClient::new(Url::parse("http://platform.test").unwrap(), Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_every_module_toolset_is_registered() {
        let registry = default_registry(&platform()).unwrap();
        let registered: BTreeSet<&str> = registry.toolsets().iter().map(|t| t.name.as_str()).collect();

        for module in ModuleRegistry::default().all_modules() {
            for toolset in module.toolsets {
                assert!(registered.contains(toolset), "toolset {} has no tools", toolset);
            }
        }
    }

    #[test]
    fn test_index_covers_every_tool() {
        let registry = default_registry(&platform()).unwrap();
        let index = ToolGroupIndex::from_registry(&registry).unwrap();

        assert_eq!(index.len(), registry.tool_count());
        assert_eq!(index.group_of("list_pipelines"), Some("pipelines"));
        assert_eq!(index.group_of("list_security_issues"), Some("sto"));
    }
}
