pub(crate) mod exec;
pub(crate) mod handles;
pub(crate) mod load;
pub(crate) mod query;
pub(crate) mod read;
pub(crate) mod types;
pub(crate) mod vars;

use serde::de::DeserializeOwned;

use crate::tools::context::FunctionCallError;

pub(crate) use exec::EvalCodeHandler;
pub(crate) use handles::RegisterHandleHandler;
pub(crate) use handles::ResolveHandleHandler;
pub(crate) use load::LoadHandler;
pub(crate) use query::LlmQueryBatchedHandler;
pub(crate) use query::LlmQueryHandler;
pub(crate) use read::PeekHandler;
pub(crate) use read::ScanHandler;
pub(crate) use vars::ListVarsHandler;
pub(crate) use vars::UnloadHandler;
pub(crate) use vars::VarInfoHandler;

/// Decode tool arguments; an empty payload is read as `{}`.
pub(crate) fn parse_arguments<T: DeserializeOwned>(arguments: &str) -> Result<T, FunctionCallError> {
    let arguments = if arguments.trim().is_empty() {
        "{}"
    } else {
        arguments
    };
    serde_json::from_str(arguments).map_err(|err| {
        FunctionCallError::InvalidArguments(format!("failed to parse function arguments: {err}"))
    })
}

fn default_content_type() -> String {
    "custom".to_string()
}
