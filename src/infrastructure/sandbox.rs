//! Ephemeral sandboxed browsing contexts
//!
//! A sandbox is an isolated session (own cookie jar, own connection pool)
//! pointed at one URL. Contexts are only handed out through [`with_sandbox`],
//! which destroys the context on every exit path of the caller's work:
//! success, error, and timeout (the work future is dropped first).

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use crate::error::ResolutionResult;
use crate::extraction::Page;
use crate::infrastructure::config::HttpConfig;
use crate::infrastructure::simple_http_client::HttpClient;

#[async_trait]
pub trait Sandbox: Send {
    fn id(&self) -> Uuid;

    /// URL the context currently points at
    fn url(&self) -> &Url;

    /// Wait until the current URL has finished loading and return its content
    async fn wait_for_load(&mut self) -> ResolutionResult<Page>;

    /// Point the context at another URL inside the same session
    async fn navigate(&mut self, url: &Url) -> ResolutionResult<Page>;

    /// Release every resource held by the context
    async fn destroy(self: Box<Self>);
}

pub type SandboxHandle = Box<dyn Sandbox>;

#[async_trait]
pub trait SandboxFactory: Send + Sync {
    async fn open(&self, url: &Url) -> ResolutionResult<SandboxHandle>;
}

/// Open a context at `url`, run `work` against it, then destroy it whatever
/// `work` returned.
pub async fn with_sandbox<T, F>(factory: &dyn SandboxFactory, url: &Url, work: F) -> ResolutionResult<T>
where
    F: for<'a> FnOnce(&'a mut SandboxHandle) -> BoxFuture<'a, ResolutionResult<T>>,
{
    let mut sandbox = factory.open(url).await?;
    let id = sandbox.id();
    debug!("Opened sandbox {} at {}", id, url);

    let result = work(&mut sandbox).await;

    sandbox.destroy().await;
    debug!("Destroyed sandbox {} (ok: {})", id, result.is_ok());
    result
}

/// Sandbox backed by a fresh HTTP session
pub struct HttpSandbox {
    id: Uuid,
    url: Url,
    client: HttpClient,
    loaded: Option<Page>,
}

#[async_trait]
impl Sandbox for HttpSandbox {
    fn id(&self) -> Uuid {
        self.id
    }

    fn url(&self) -> &Url {
        &self.url
    }

    async fn wait_for_load(&mut self) -> ResolutionResult<Page> {
        if let Some(page) = &self.loaded {
            return Ok(page.clone());
        }
        let page = self.client.fetch_page(&self.url).await?;
        self.loaded = Some(page.clone());
        Ok(page)
    }

    async fn navigate(&mut self, url: &Url) -> ResolutionResult<Page> {
        self.url = url.clone();
        self.loaded = None;
        self.wait_for_load().await
    }

    async fn destroy(self: Box<Self>) {
        info!("Closing sandbox {} ({})", self.id, self.url);
    }
}

pub struct HttpSandboxFactory {
    http: HttpConfig,
}

impl HttpSandboxFactory {
    pub const fn new(http: HttpConfig) -> Self {
        Self { http }
    }
}

#[async_trait]
impl SandboxFactory for HttpSandboxFactory {
    async fn open(&self, url: &Url) -> ResolutionResult<SandboxHandle> {
        let id = Uuid::new_v4();
        let client = HttpClient::from_http_config(&self.http)?.with_context_label(&format!("sandbox:{id}"));
        Ok(Box::new(HttpSandbox {
            id,
            url: url.clone(),
            client,
            loaded: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolutionError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct StaticSandbox {
        id: Uuid,
        url: Url,
        destroyed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Sandbox for StaticSandbox {
        fn id(&self) -> Uuid {
            self.id
        }

        fn url(&self) -> &Url {
            &self.url
        }

        async fn wait_for_load(&mut self) -> ResolutionResult<Page> {
            Ok(Page::new(self.url.clone(), "<html></html>".into()))
        }

        async fn navigate(&mut self, url: &Url) -> ResolutionResult<Page> {
            self.url = url.clone();
            self.wait_for_load().await
        }

        async fn destroy(self: Box<Self>) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct StaticFactory {
        destroyed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SandboxFactory for StaticFactory {
        async fn open(&self, url: &Url) -> ResolutionResult<SandboxHandle> {
            Ok(Box::new(StaticSandbox {
                id: Uuid::new_v4(),
                url: url.clone(),
                destroyed: Arc::clone(&self.destroyed),
            }))
        }
    }

    #[tokio::test]
    async fn test_destroyed_on_success_and_error() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let factory = StaticFactory {
            destroyed: Arc::clone(&destroyed),
        };
        let url = Url::parse("https://www.walmart.com/search?q=x").unwrap();

        let ok = with_sandbox(&factory, &url, |sandbox| {
            Box::pin(async move { sandbox.wait_for_load().await.map(|p| p.html.len()) })
        })
        .await;
        assert!(ok.is_ok());

        let err: ResolutionResult<()> = with_sandbox(&factory, &url, |_| {
            Box::pin(async move { Err(ResolutionError::Storage("boom".into())) })
        })
        .await;
        assert!(err.is_err());
        assert_eq!(destroyed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_http_factory_opens_isolated_contexts() {
        let factory = HttpSandboxFactory::new(HttpConfig::default());
        let url = Url::parse("https://www.target.com/s?searchTerm=x").unwrap();
        let a = factory.open(&url).await.unwrap();
        let b = factory.open(&url).await.unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.url(), &url);
        a.destroy().await;
        b.destroy().await;
    }
}
