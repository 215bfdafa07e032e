use crate::{
    AppState,
    error::ApiError,
    hub::HubUser,
    models::{
        CreateGroupRequest, CreateImageRequest, CreateUserRequest, Group, Image, User,
        parse_create_payload,
    },
};
use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::Html,
};
use serde_json::Value;
use std::collections::BTreeMap;

// --- Users ---

/// list_users
///
/// [Public Route] Every user record, keyed by username.
#[utoipa::path(
    get,
    path = "/user",
    responses((status = 200, description = "Users keyed by username", body = BTreeMap<String, User>))
)]
pub async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<String, User>>, ApiError> {
    let users = state.repo.list_users().await?;
    Ok(Json(
        users
            .into_iter()
            .map(|user| (user.username.clone(), user))
            .collect(),
    ))
}

/// create_user
///
/// [Admin Route] Adds a user. The body is read as JSON whatever its content type, and empty
/// fields fall back to the default limits.
#[utoipa::path(
    post,
    path = "/user",
    request_body = CreateUserRequest,
    responses(
        (status = 204, description = "Created"),
        (status = 400, description = "Missing or malformed body"),
        (status = 401, description = "Not an administrator"),
        (status = 409, description = "Username already exists")
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    Extension(admin): Extension<HubUser>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let (request, fields) = parse_create_payload::<CreateUserRequest>(&body)?;
    let fields = Value::Object(fields);
    tracing::info!("body: {}", fields);

    state.repo.create_user(request.into_record()).await?;

    tracing::warn!("User `{}` added user: `{}`", admin.name, fields);
    Ok(StatusCode::NO_CONTENT)
}

/// get_user
///
/// [Public Route] One user record.
#[utoipa::path(
    get,
    path = "/user/{username}",
    params(("username" = String, Path, description = "Hub username")),
    responses(
        (status = 200, description = "Found", body = User),
        (status = 404, description = "Unknown username")
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<User>, ApiError> {
    state
        .repo
        .get_user(&username)
        .await?
        .map(Json)
        .ok_or_else(|| unknown_username(&username))
}

/// delete_user
///
/// [Admin Route] Removes a user record.
#[utoipa::path(
    delete,
    path = "/user/{username}",
    params(("username" = String, Path, description = "Hub username")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 401, description = "Not an administrator"),
        (status = 404, description = "Unknown username")
    )
)]
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(admin): Extension<HubUser>,
    Path(username): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !state.repo.delete_user(&username).await? {
        return Err(unknown_username(&username));
    }

    tracing::warn!("User `{}` deleted User `{}`", admin.name, username);
    Ok(StatusCode::NO_CONTENT)
}

fn unknown_username(username: &str) -> ApiError {
    ApiError::NotFound(format!("`{username}` is not a valid username"))
}

// --- Groups ---

/// list_groups
///
/// [Public Route] Every group record, keyed by group name.
#[utoipa::path(
    get,
    path = "/group",
    responses((status = 200, description = "Groups keyed by name", body = BTreeMap<String, Group>))
)]
pub async fn list_groups(
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<String, Group>>, ApiError> {
    let groups = state.repo.list_groups().await?;
    Ok(Json(
        groups
            .into_iter()
            .map(|group| (group.groupname.clone(), group))
            .collect(),
    ))
}

/// create_group
///
/// [Admin Route] Adds a group.
#[utoipa::path(
    post,
    path = "/group",
    request_body = CreateGroupRequest,
    responses(
        (status = 204, description = "Created"),
        (status = 400, description = "Missing or malformed body"),
        (status = 401, description = "Not an administrator"),
        (status = 409, description = "Group already exists")
    )
)]
pub async fn create_group(
    State(state): State<AppState>,
    Extension(admin): Extension<HubUser>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let (request, fields) = parse_create_payload::<CreateGroupRequest>(&body)?;
    let fields = Value::Object(fields);
    tracing::info!("body: {}", fields);

    state.repo.create_group(request.into_record()).await?;

    tracing::warn!("User `{}` added group: `{}`", admin.name, fields);
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/group/{groupname}",
    params(("groupname" = String, Path, description = "Hub group name")),
    responses(
        (status = 200, description = "Found", body = Group),
        (status = 404, description = "Unknown group")
    )
)]
pub async fn get_group(
    State(state): State<AppState>,
    Path(groupname): Path<String>,
) -> Result<Json<Group>, ApiError> {
    state
        .repo
        .get_group(&groupname)
        .await?
        .map(Json)
        .ok_or_else(|| unknown_group(&groupname))
}

#[utoipa::path(
    delete,
    path = "/group/{groupname}",
    params(("groupname" = String, Path, description = "Hub group name")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 401, description = "Not an administrator"),
        (status = 404, description = "Unknown group")
    )
)]
pub async fn delete_group(
    State(state): State<AppState>,
    Extension(admin): Extension<HubUser>,
    Path(groupname): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !state.repo.delete_group(&groupname).await? {
        return Err(unknown_group(&groupname));
    }

    tracing::warn!("User `{}` deleted Group `{}`", admin.name, groupname);
    Ok(StatusCode::NO_CONTENT)
}

fn unknown_group(groupname: &str) -> ApiError {
    ApiError::NotFound(format!("`{groupname}` is not a valid group name"))
}

// --- Images ---

/// list_images
///
/// [Public Route] Every image record, keyed by id.
#[utoipa::path(
    get,
    path = "/image",
    responses((status = 200, description = "Images keyed by id", body = BTreeMap<String, Image>))
)]
pub async fn list_images(
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<i32, Image>>, ApiError> {
    let images = state.repo.list_images().await?;
    Ok(Json(images.into_iter().map(|image| (image.id, image)).collect()))
}

/// create_image
///
/// [Admin Route] Registers an image. Storage assigns the id unless the body carries one.
#[utoipa::path(
    post,
    path = "/image",
    request_body = CreateImageRequest,
    responses(
        (status = 204, description = "Created"),
        (status = 400, description = "Missing or malformed body"),
        (status = 401, description = "Not an administrator"),
        (status = 409, description = "Image id already exists")
    )
)]
pub async fn create_image(
    State(state): State<AppState>,
    Extension(admin): Extension<HubUser>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let (request, fields) = parse_create_payload::<CreateImageRequest>(&body)?;
    let fields = Value::Object(fields);
    tracing::info!("body: {}", fields);

    let image = state.repo.create_image(request.into_new_image()).await?;

    tracing::warn!(
        "User `{}` added image `{}`: `{}`",
        admin.name,
        image.id,
        fields
    );
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/image/{id}",
    params(("id" = i32, Path, description = "Image id")),
    responses(
        (status = 200, description = "Found", body = Image),
        (status = 404, description = "Unknown image")
    )
)]
pub async fn get_image(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<Image>, ApiError> {
    let id = parse_image_id(&raw_id)?;
    state
        .repo
        .get_image(id)
        .await?
        .map(Json)
        .ok_or_else(|| unknown_image(&raw_id))
}

#[utoipa::path(
    delete,
    path = "/image/{id}",
    params(("id" = i32, Path, description = "Image id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 401, description = "Not an administrator"),
        (status = 404, description = "Unknown image")
    )
)]
pub async fn delete_image(
    State(state): State<AppState>,
    Extension(admin): Extension<HubUser>,
    Path(raw_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_image_id(&raw_id)?;
    if !state.repo.delete_image(id).await? {
        return Err(unknown_image(&raw_id));
    }

    tracing::warn!("User `{}` deleted Image `{}`", admin.name, id);
    Ok(StatusCode::NO_CONTENT)
}

// A non-numeric id can never match a row, so it is reported like any other unknown id.
fn parse_image_id(raw_id: &str) -> Result<i32, ApiError> {
    raw_id.parse().map_err(|_| unknown_image(raw_id))
}

fn unknown_image(id: &str) -> ApiError {
    ApiError::NotFound(format!("`{id}` is not a valid image id"))
}

// --- Pages ---

/// index
///
/// Landing page served at the service prefix.
pub async fn index() -> Html<&'static str> {
    Html(include_str!("../templates/index.html"))
}
