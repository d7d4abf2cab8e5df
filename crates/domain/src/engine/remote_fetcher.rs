use crate::errors::DomainError;
use async_trait::async_trait;
use std::path::PathBuf;
use url::Url;

#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Downloads `url` into a new temporary file and returns its path.
    async fn fetch(&self, url: &Url) -> Result<PathBuf, DomainError>;
}
