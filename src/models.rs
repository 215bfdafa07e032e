use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::error::ApiError;

// --- Resource limit defaults ---
// These must match the inputs the hub spawner form offers.

pub const DEFAULT_NPROCS: i32 = 1;
pub const DEFAULT_MEMORY: i32 = 1;
pub const DEFAULT_RUNTIME: i32 = 1;
pub const DEFAULT_GPU: bool = false;

/// Message returned whenever a creation body is missing or is not a JSON object.
pub const NO_DATA_MESSAGE: &str = "No data found; is the Content-Type `application/json`?";

// --- Stored Records ---

/// User
///
/// Resource limits granted to a single hub user, stored in the `users` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, FromRow)]
pub struct User {
    /// Hub username, unique across the roster.
    pub username: String,
    /// How many CPUs the user's server may use.
    pub nprocs: i32,
    /// Memory allowance.
    pub memory: i32,
    /// Maximum runtime.
    pub runtime: i32,
    /// Whether the user's server gets a GPU.
    pub gpu: bool,
}

/// Group
///
/// Resource limits shared by every member of a hub group, stored in the `groups` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, FromRow)]
pub struct Group {
    pub groupname: String,
    pub nprocs: i32,
    pub memory: i32,
    pub runtime: i32,
    pub gpu: bool,
}

/// Image
///
/// A container image offered by the spawner, keyed by its numeric id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, FromRow)]
pub struct Image {
    pub id: i32,
    pub nprocs: i32,
    pub memory: i32,
    pub runtime: i32,
    pub gpu: bool,
}

// --- Creation Payloads ---

/// CreateUserRequest
///
/// Body of `POST /api/user`. Every limit is optional; absent values take the defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateUserRequest {
    #[schema(example = "jdoe")]
    pub username: String,
    pub nprocs: Option<i32>,
    pub memory: Option<i32>,
    pub runtime: Option<i32>,
    pub gpu: Option<bool>,
}

impl CreateUserRequest {
    pub fn into_record(self) -> User {
        User {
            username: self.username,
            nprocs: self.nprocs.unwrap_or(DEFAULT_NPROCS),
            memory: self.memory.unwrap_or(DEFAULT_MEMORY),
            runtime: self.runtime.unwrap_or(DEFAULT_RUNTIME),
            gpu: self.gpu.unwrap_or(DEFAULT_GPU),
        }
    }
}

/// CreateGroupRequest
///
/// Body of `POST /api/group`.
#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateGroupRequest {
    #[schema(example = "staff")]
    pub groupname: String,
    pub nprocs: Option<i32>,
    pub memory: Option<i32>,
    pub runtime: Option<i32>,
    pub gpu: Option<bool>,
}

impl CreateGroupRequest {
    pub fn into_record(self) -> Group {
        Group {
            groupname: self.groupname,
            nprocs: self.nprocs.unwrap_or(DEFAULT_NPROCS),
            memory: self.memory.unwrap_or(DEFAULT_MEMORY),
            runtime: self.runtime.unwrap_or(DEFAULT_RUNTIME),
            gpu: self.gpu.unwrap_or(DEFAULT_GPU),
        }
    }
}

/// CreateImageRequest
///
/// Body of `POST /api/image`. The id is normally assigned by storage; supplying one that
/// already exists is a conflict.
#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateImageRequest {
    pub id: Option<i32>,
    pub nprocs: Option<i32>,
    pub memory: Option<i32>,
    pub runtime: Option<i32>,
    pub gpu: Option<bool>,
}

/// NewImage
///
/// An image ready for insertion: defaults applied, id still optional.
#[derive(Debug, Clone, PartialEq)]
pub struct NewImage {
    pub id: Option<i32>,
    pub nprocs: i32,
    pub memory: i32,
    pub runtime: i32,
    pub gpu: bool,
}

impl CreateImageRequest {
    pub fn into_new_image(self) -> NewImage {
        NewImage {
            id: self.id,
            nprocs: self.nprocs.unwrap_or(DEFAULT_NPROCS),
            memory: self.memory.unwrap_or(DEFAULT_MEMORY),
            runtime: self.runtime.unwrap_or(DEFAULT_RUNTIME),
            gpu: self.gpu.unwrap_or(DEFAULT_GPU),
        }
    }
}

// --- Payload Sanitation ---

/// is_falsy
///
/// A field holding one of these values counts as "not provided".
fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// sanitize_payload
///
/// Parses a raw creation body as a JSON object, whatever its declared content type, and drops
/// every falsy field so storage defaults apply.
pub fn sanitize_payload(body: &[u8]) -> Result<Map<String, Value>, ApiError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|_| ApiError::Validation(NO_DATA_MESSAGE.into()))?;

    match value {
        Value::Object(map) => Ok(map.into_iter().filter(|(_, v)| !is_falsy(v)).collect()),
        _ => Err(ApiError::Validation(NO_DATA_MESSAGE.into())),
    }
}

/// parse_create_payload
///
/// Sanitizes a creation body and binds it to one of the `Create*Request` types.
pub fn parse_create_payload<T: DeserializeOwned>(
    body: &[u8],
) -> Result<(T, Map<String, Value>), ApiError> {
    let fields = sanitize_payload(body)?;
    let request = serde_json::from_value(Value::Object(fields.clone()))
        .map_err(|e| ApiError::Validation(format!("Invalid record; {e}")))?;
    Ok((request, fields))
}
