//! Message types for `hemmer.provider.v1`, mirroring `proto/provider.proto`.

use std::collections::HashMap;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Diagnostic {
    #[prost(enumeration = "diagnostic::Severity", tag = "1")]
    pub severity: i32,
    #[prost(string, tag = "2")]
    pub summary: String,
    #[prost(string, tag = "3")]
    pub detail: String,
    #[prost(string, tag = "4")]
    pub attribute: String,
}

pub mod diagnostic {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Severity {
        Unspecified = 0,
        Error = 1,
        Warning = 2,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Schema {
    #[prost(int64, tag = "1")]
    pub version: i64,
    #[prost(message, optional, tag = "2")]
    pub block: Option<Block>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Block {
    #[prost(message, repeated, tag = "1")]
    pub attributes: Vec<Attribute>,
    #[prost(message, repeated, tag = "2")]
    pub block_types: Vec<NestedBlock>,
    #[prost(string, tag = "3")]
    pub description: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Attribute {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(bytes = "vec", tag = "2")]
    pub r#type: Vec<u8>,
    #[prost(bool, tag = "3")]
    pub required: bool,
    #[prost(bool, tag = "4")]
    pub optional: bool,
    #[prost(bool, tag = "5")]
    pub computed: bool,
    #[prost(bool, tag = "6")]
    pub sensitive: bool,
    #[prost(string, tag = "7")]
    pub description: String,
    #[prost(bool, tag = "8")]
    pub force_new: bool,
    #[prost(bytes = "vec", tag = "9")]
    pub default_value: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NestedBlock {
    #[prost(string, tag = "1")]
    pub type_name: String,
    #[prost(message, optional, tag = "2")]
    pub block: Option<Block>,
    #[prost(enumeration = "nested_block::NestingMode", tag = "3")]
    pub nesting_mode: i32,
    #[prost(int32, tag = "4")]
    pub min_items: i32,
    #[prost(int32, tag = "5")]
    pub max_items: i32,
}

pub mod nested_block {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum NestingMode {
        Invalid = 0,
        Single = 1,
        List = 2,
        Set = 3,
        Map = 4,
    }
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct ServerCapabilities {
    #[prost(bool, tag = "1")]
    pub plan_destroy: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AttributeChange {
    #[prost(string, tag = "1")]
    pub path: String,
    #[prost(bytes = "vec", tag = "2")]
    pub before: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub after: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ImportedResource {
    #[prost(string, tag = "1")]
    pub resource_type: String,
    #[prost(bytes = "vec", tag = "2")]
    pub state: Vec<u8>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct GetMetadataRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetMetadataResponse {
    #[prost(message, optional, tag = "1")]
    pub server_capabilities: Option<ServerCapabilities>,
    #[prost(string, repeated, tag = "2")]
    pub resources: Vec<String>,
    #[prost(string, repeated, tag = "3")]
    pub data_sources: Vec<String>,
    #[prost(message, repeated, tag = "4")]
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct GetSchemaRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetSchemaResponse {
    #[prost(message, optional, tag = "1")]
    pub provider: Option<Schema>,
    #[prost(map = "string, message", tag = "2")]
    pub resources: HashMap<String, Schema>,
    #[prost(map = "string, message", tag = "3")]
    pub data_sources: HashMap<String, Schema>,
    #[prost(message, repeated, tag = "4")]
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ValidateProviderConfigRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub config: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ValidateProviderConfigResponse {
    #[prost(message, repeated, tag = "1")]
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConfigureRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub config: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConfigureResponse {
    #[prost(message, repeated, tag = "1")]
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct StopRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StopResponse {
    #[prost(string, tag = "1")]
    pub error: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ValidateResourceConfigRequest {
    #[prost(string, tag = "1")]
    pub resource_type: String,
    #[prost(bytes = "vec", tag = "2")]
    pub config: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ValidateResourceConfigResponse {
    #[prost(message, repeated, tag = "1")]
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpgradeResourceStateRequest {
    #[prost(string, tag = "1")]
    pub resource_type: String,
    #[prost(int64, tag = "2")]
    pub version: i64,
    #[prost(bytes = "vec", tag = "3")]
    pub raw_state: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpgradeResourceStateResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub upgraded_state: Vec<u8>,
    #[prost(message, repeated, tag = "2")]
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PlanRequest {
    #[prost(string, tag = "1")]
    pub resource_type: String,
    #[prost(bytes = "vec", tag = "2")]
    pub prior_state: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub proposed_state: Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub config: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PlanResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub planned_state: Vec<u8>,
    #[prost(message, repeated, tag = "2")]
    pub changes: Vec<AttributeChange>,
    #[prost(bool, tag = "3")]
    pub requires_replace: bool,
    #[prost(message, repeated, tag = "4")]
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateRequest {
    #[prost(string, tag = "1")]
    pub resource_type: String,
    #[prost(bytes = "vec", tag = "2")]
    pub planned_state: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub state: Vec<u8>,
    #[prost(message, repeated, tag = "2")]
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReadRequest {
    #[prost(string, tag = "1")]
    pub resource_type: String,
    #[prost(bytes = "vec", tag = "2")]
    pub current_state: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReadResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub state: Vec<u8>,
    #[prost(message, repeated, tag = "2")]
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateRequest {
    #[prost(string, tag = "1")]
    pub resource_type: String,
    #[prost(bytes = "vec", tag = "2")]
    pub prior_state: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub planned_state: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub state: Vec<u8>,
    #[prost(message, repeated, tag = "2")]
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteRequest {
    #[prost(string, tag = "1")]
    pub resource_type: String,
    #[prost(bytes = "vec", tag = "2")]
    pub current_state: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteResponse {
    #[prost(message, repeated, tag = "1")]
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ImportResourceStateRequest {
    #[prost(string, tag = "1")]
    pub resource_type: String,
    #[prost(string, tag = "2")]
    pub id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ImportResourceStateResponse {
    #[prost(message, repeated, tag = "1")]
    pub imported: Vec<ImportedResource>,
    #[prost(message, repeated, tag = "2")]
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ValidateDataSourceConfigRequest {
    #[prost(string, tag = "1")]
    pub data_source_type: String,
    #[prost(bytes = "vec", tag = "2")]
    pub config: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ValidateDataSourceConfigResponse {
    #[prost(message, repeated, tag = "1")]
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReadDataSourceRequest {
    #[prost(string, tag = "1")]
    pub data_source_type: String,
    #[prost(bytes = "vec", tag = "2")]
    pub config: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReadDataSourceResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub state: Vec<u8>,
    #[prost(message, repeated, tag = "2")]
    pub diagnostics: Vec<Diagnostic>,
}
