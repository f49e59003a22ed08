//! Handler for tools that map onto a single platform REST call.
//!
//! The caller's credential is forwarded verbatim. Scope identifiers are sent
//! as `accountIdentifier`, `orgIdentifier` and `projectIdentifier` query
//! parameters; `org_id` and `project_id` arguments narrow the request scope.

use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde_json::{Map, Value, json};
use service_core::observability::TracedRequestExt;
use std::sync::Arc;
use std::time::Duration;

use super::{Tool, ToolContext, ToolError, ToolHandler};
use crate::config::resolve_under;
use crate::protocol::{CallToolResult, ToolDescriptor};

pub const ORG_ARGUMENT: &str = "org_id";
pub const PROJECT_ARGUMENT: &str = "project_id";
pub const BODY_ARGUMENT: &str = "body";

/// Shared HTTP client for platform calls made on behalf of callers.
#[derive(Debug, Clone)]
pub struct PlatformClient {
    client: Client,
    base_url: Url,
}

impl PlatformClient {
    pub fn new(base_url: Url, request_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

/// Declarative description of a REST-backed tool.
#[derive(Debug, Clone)]
pub struct RestTool {
    name: &'static str,
    description: &'static str,
    method: Method,
    path: &'static str,
    query: &'static [&'static str],
}

impl RestTool {
    pub fn get(name: &'static str, description: &'static str, path: &'static str) -> Self {
        Self {
            name,
            description,
            method: Method::GET,
            path,
            query: &[],
        }
    }

    pub fn post(name: &'static str, description: &'static str, path: &'static str) -> Self {
        Self {
            method: Method::POST,
            ..Self::get(name, description, path)
        }
    }

    /// Optional arguments passed through as query parameters.
    pub fn query(mut self, params: &'static [&'static str]) -> Self {
        self.query = params;
        self
    }

    pub fn descriptor(&self) -> ToolDescriptor {
        let path_params = path_params(self.path);
        let mut params: Vec<&str> = path_params.iter().map(String::as_str).collect();
        params.extend_from_slice(self.query);
        params.extend_from_slice(&[ORG_ARGUMENT, PROJECT_ARGUMENT]);

        let mut descriptor = ToolDescriptor::with_string_params(self.name, self.description, &params)
            .require(&path_params.iter().map(String::as_str).collect::<Vec<_>>());

        if self.method == Method::POST {
            descriptor.input_schema["properties"][BODY_ARGUMENT] = json!({ "type": "object" });
        }
        descriptor
    }

    pub fn into_tool(self, platform: &PlatformClient) -> Tool {
        let descriptor = self.descriptor();
        let handler = RestToolHandler {
            platform: platform.clone(),
            method: self.method,
            path: self.path,
            path_params: path_params(self.path),
            query_params: self.query,
        };
        Tool::new(descriptor, Arc::new(handler))
    }
}

#[derive(Debug, Clone)]
pub struct RestToolHandler {
    platform: PlatformClient,
    method: Method,
    path: &'static str,
    path_params: Vec<String>,
    query_params: &'static [&'static str],
}

impl RestToolHandler {
    fn render_path(&self, args: &Map<String, Value>) -> Result<String, ToolError> {
        let mut path = self.path.to_string();
        for param in &self.path_params {
            let value = scalar_arg(args, param).ok_or_else(|| {
                ToolError::InvalidArguments(format!("missing required argument '{}'", param))
            })?;
            let dots = value.to_ascii_lowercase().replace("%2e", ".");
            if value.contains(['/', '?', '#']) || dots == "." || dots == ".." {
                return Err(ToolError::InvalidArguments(format!(
                    "argument '{}' is not a valid path segment",
                    param
                )));
            }
            path = path.replace(&format!("{{{}}}", param), &value);
        }
        Ok(path)
    }
}

#[async_trait]
impl ToolHandler for RestToolHandler {
    async fn call(&self, ctx: &ToolContext, arguments: Value) -> Result<CallToolResult, ToolError> {
        let args = match arguments {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => {
                return Err(ToolError::InvalidArguments(
                    "arguments must be an object".to_string(),
                ));
            }
        };

        let url = resolve_under(&self.platform.base_url, &self.render_path(&args)?)
            .map_err(ToolError::InvalidArguments)?;

        let scope = ctx.scope.overridden(
            scalar_arg(&args, ORG_ARGUMENT),
            scalar_arg(&args, PROJECT_ARGUMENT),
        );

        let mut query = vec![("accountIdentifier", scope.account_id.clone())];
        if let Some(org_id) = scope.org_id {
            query.push(("orgIdentifier", org_id));
        }
        if let Some(project_id) = scope.project_id {
            query.push(("projectIdentifier", project_id));
        }
        for param in self.query_params {
            if let Some(value) = scalar_arg(&args, param) {
                query.push((*param, value));
            }
        }

        let credential = ctx.credential.as_ref().ok_or(ToolError::MissingCredential)?;
        let (header, value) = credential.forward_header();

        let mut request = self
            .platform
            .client
            .request(self.method.clone(), url)
            .query(&query)
            .header(header, value)
            .with_trace_context();

        if let Some(body) = args.get(BODY_ARGUMENT) {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            Ok(CallToolResult::text(text))
        } else {
            tracing::warn!(
                account_id = %ctx.scope.account_id,
                path = self.path,
                status = status.as_u16(),
                "Platform call returned an error status"
            );
            Ok(CallToolResult::error_text(format!(
                "platform returned {}: {}",
                status, text
            )))
        }
    }
}

/// `{name}` placeholders in a path template, in order.
fn path_params(template: &str) -> Vec<String> {
    template
        .split('{')
        .skip(1)
        .filter_map(|rest| rest.split_once('}').map(|(name, _)| name.to_string()))
        .collect()
}

/// String form of a scalar argument. Blank strings count as absent.
fn scalar_arg(args: &Map<String, Value>, name: &str) -> Option<String> {
    match args.get(name)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn handler(path: &'static str) -> RestToolHandler {
        let platform = PlatformClient::new(
            Url::parse("http://platform.test").unwrap(),
            Duration::from_secs(1),
        )
        .unwrap();
        RestToolHandler {
            platform,
            method: Method::GET,
            path,
            path_params: path_params(path),
            query_params: &[],
        }
    }

    #[test]
    fn test_path_params() {
        assert_eq!(
            path_params("/pipeline/api/pipelines/{pipeline_id}/runs/{run_id}"),
            vec!["pipeline_id", "run_id"]
        );
        assert!(path_params("/ng/api/connectors").is_empty());
    }

    #[test]
    fn test_render_path() {
        let handler = handler("/pipelines/{pipeline_id}/runs/{run_id}");
        let rendered = handler
            .render_path(&args(json!({ "pipeline_id": "deploy", "run_id": 42 })))
            .unwrap();
        assert_eq!(rendered, "/pipelines/deploy/runs/42");
    }

    #[test]
    fn test_render_path_rejects_missing_and_traversal() {
        let handler = handler("/pipelines/{pipeline_id}");
        assert!(matches!(
            handler.render_path(&args(json!({}))),
            Err(ToolError::InvalidArguments(_))
        ));
        assert!(matches!(
            handler.render_path(&args(json!({ "pipeline_id": "../admin" }))),
            Err(ToolError::InvalidArguments(_))
        ));
        for dots in ["..", ".", "%2E%2e", "%2e"] {
            assert!(matches!(
                handler.render_path(&args(json!({ "pipeline_id": dots }))),
                Err(ToolError::InvalidArguments(_))
            ));
        }
    }

    #[test]
    fn test_descriptor_lists_arguments() {
        let descriptor = RestTool::post("run_pipeline", "Run a pipeline", "/pipelines/{pipeline_id}/run")
            .query(&["branch"])
            .descriptor();

        let properties = &descriptor.input_schema["properties"];
        for param in ["pipeline_id", "branch", ORG_ARGUMENT, PROJECT_ARGUMENT] {
            assert_eq!(properties[param]["type"], "string", "{}", param);
        }
        assert_eq!(properties[BODY_ARGUMENT]["type"], "object");
        assert_eq!(descriptor.input_schema["required"], json!(["pipeline_id"]));
    }

    #[test]
    fn test_scalar_arg() {
        let a = args(json!({ "s": " x ", "blank": "  ", "n": 3, "b": true, "o": {} }));
        assert_eq!(scalar_arg(&a, "s").as_deref(), Some("x"));
        assert_eq!(scalar_arg(&a, "blank"), None);
        assert_eq!(scalar_arg(&a, "n").as_deref(), Some("3"));
        assert_eq!(scalar_arg(&a, "b").as_deref(), Some("true"));
        assert_eq!(scalar_arg(&a, "o"), None);
        assert_eq!(scalar_arg(&a, "missing"), None);
    }
}
