/// Clients for managed third-party services
///
/// - `search`: Meilisearch indexing and queries
/// - `notifications`: Novu topics, subscribers, triggers and the in-app feed
/// - `storage`: S3 presigned URLs and deletes

pub mod notifications;
pub mod search;
pub mod storage;
