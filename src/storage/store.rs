use std::time::Duration;

use async_trait::async_trait;

use super::StoreError;

/// The list, set and keyed-value operations the chain cache is built on.
/// Ranges and indices follow Redis rules: inclusive, negative counts from
/// the tail. Each call is atomic on its own; sequences of calls are not.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn list_range(&self, key: &str, start: isize, stop: isize)
    -> Result<Vec<String>, StoreError>;

    async fn list_index(&self, key: &str, index: isize) -> Result<Option<String>, StoreError>;

    async fn list_push_front(&self, key: &str, value: String) -> Result<(), StoreError>;

    async fn list_set(&self, key: &str, index: isize, value: String) -> Result<(), StoreError>;

    /// Remove every element equal to `value`, returning how many went
    async fn list_remove(&self, key: &str, value: &str) -> Result<usize, StoreError>;

    async fn list_trim(&self, key: &str, start: isize, stop: isize) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError>;

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError>;

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;

    async fn put_with_ttl(&self, key: &str, value: String, ttl: Duration)
    -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn close(&self) -> Result<(), StoreError>;
}
