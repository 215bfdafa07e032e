/// Router Module Index
///
/// Read and write routes live in separate routers so the auth gate can be layered onto the
/// write side as a whole. Both are merged under the same `/api` mount; axum combines the
/// method routers of matching paths.

/// Roster reads, open to anyone.
pub mod public;

/// Roster writes, guarded by the admin `AccessPolicy`.
pub mod admin;
