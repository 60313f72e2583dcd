use async_trait::async_trait;
use std::sync::Arc;

use crate::models::response::Response;
use super::registry::SourceRegistry;

/// One typed capability of a data source: turn a `Req` into a `Res`.
///
/// A source implements `Processor` once per request/result pair it serves.
/// Implementations never return operational failures as panics or errors;
/// they report them through the [`Response`] status.
#[async_trait]
pub trait Processor<Req, Res>: Send + Sync
where
    Req: Send + Sync + 'static,
    Res: Send + 'static,
{
    /// Human-readable name of the owning source (for logs and messages).
    fn source_name(&self) -> &str;

    async fn process(&self, request: &Req) -> Response<Res>;
}

/// A provider adapter for one external financial-data API.
///
/// Each adapter announces its capabilities explicitly: it registers one
/// [`Processor`] per request/result pair into the [`SourceRegistry`]. If an
/// API stops working or changes, only that adapter is replaced.
pub trait DataSource: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn register_capabilities(self: Arc<Self>, registry: &mut SourceRegistry);
}
