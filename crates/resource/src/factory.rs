//! Native client construction.
//!
//! A [`ResourceFactory`] turns a [`ResourceConfig`] into a boxed
//! [`ResourceClient`]. The manager owns at most one factory per
//! [`ResourceKind`](crate::ResourceKind).

use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;

use crate::config::ResourceConfig;
use crate::error::BoxError;

/// A constructed native client owned by a [`ResourceHandle`](crate::ResourceHandle).
///
/// Both methods report native errors; the handle translates them.
#[async_trait]
pub trait ResourceClient: Any + Send + Sync {
    /// Cheap liveness probe. The default does nothing and succeeds.
    async fn ping(&self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Release the client's connections. Called at most once.
    async fn close(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Builds native clients for one resource kind.
#[async_trait]
pub trait ResourceFactory: Send + Sync + 'static {
    /// Construct a client from `config`.
    async fn create(&self, config: &ResourceConfig) -> Result<Box<dyn ResourceClient>, BoxError>;
}

/// [`ResourceFactory`] backed by an async closure. See [`factory_fn`].
pub struct FnFactory<F, C> {
    build: F,
    _client: PhantomData<fn() -> C>,
}

/// Wrap an async closure as a factory.
///
/// ```
/// use orchid_resource::{factory_fn, BoxError, ResourceClient};
///
/// struct Noop;
/// impl ResourceClient for Noop {}
///
/// let factory = factory_fn(|_config| async { Ok::<_, BoxError>(Noop) });
/// # let _ = factory;
/// ```
pub fn factory_fn<F, Fut, C>(build: F) -> FnFactory<F, C>
where
    F: Fn(ResourceConfig) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<C, BoxError>> + Send,
    C: ResourceClient,
{
    FnFactory {
        build,
        _client: PhantomData,
    }
}

#[async_trait]
impl<F, Fut, C> ResourceFactory for FnFactory<F, C>
where
    F: Fn(ResourceConfig) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<C, BoxError>> + Send,
    C: ResourceClient,
{
    async fn create(&self, config: &ResourceConfig) -> Result<Box<dyn ResourceClient>, BoxError> {
        let client = (self.build)(config.clone()).await?;
        Ok(Box::new(client))
    }
}

impl<F, C> std::fmt::Debug for FnFactory<F, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnFactory")
            .field("client", &std::any::type_name::<C>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::ResourceKind;

    struct Counter(u32);

    impl ResourceClient for Counter {}

    #[tokio::test]
    async fn closure_factory_builds_client() {
        let factory = factory_fn(|config: ResourceConfig| async move {
            let start = config.params.get("start").and_then(serde_json::Value::as_u64);
            Ok::<_, BoxError>(Counter(u32::try_from(start.unwrap_or(0)).unwrap_or(0)))
        });

        let config = ResourceConfig::new(ResourceKind::Cache)
            .with_params(serde_json::json!({ "start": 7 }));
        let client = factory.create(&config).await.expect("create should succeed");

        let any: &dyn Any = &*client;
        let counter = any.downcast_ref::<Counter>().expect("client is a Counter");
        assert_eq!(counter.0, 7);
    }

    #[tokio::test]
    async fn closure_factory_propagates_errors() {
        let factory = factory_fn(|_config| async { Err::<Counter, BoxError>("refused".into()) });
        let err = factory
            .create(&ResourceConfig::new(ResourceKind::Broker))
            .await
            .err()
            .expect("create should fail");
        assert_eq!(err.to_string(), "refused");
    }

    #[tokio::test]
    async fn default_client_methods_succeed() {
        let client = Counter(0);
        assert!(client.ping().await.is_ok());
        assert!(client.close().await.is_ok());
    }
}
