pub mod tool_authz;

pub use tool_authz::{
    DEFAULT_MAX_BODY_BYTES, ToolAuthorizer, ToolAuthzError, filter_tools,
    tool_authorization_middleware,
};
