use std::collections::VecDeque;
use std::sync::Arc;

use futures::future::BoxFuture;
use regex::Regex;

use crate::cloud::{ImageVersion, Page, RegistryCatalog, Repository};
use crate::error::{CloudError, ConfigError};

pub const DEFAULT_PAGE_SIZE: u64 = 100;

/// Position of a page-by-page listing. Pages are numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub page: u64,
    pub page_size: u64,
    pub done: bool,
}

impl PageCursor {
    pub fn new(page_size: u64) -> Self {
        Self {
            page: 1,
            page_size: page_size.max(1),
            done: false,
        }
    }

    /// Moves past the page just fetched. The listing ends on a short page, or
    /// once `page * page_size` reaches the reported total; a missing total also
    /// ends it.
    pub fn advance(&mut self, returned: usize, total_count: Option<u64>) {
        let short = (returned as u64) < self.page_size;
        let exhausted = match total_count {
            Some(total) => self.page.saturating_mul(self.page_size) >= total,
            None => true,
        };
        if short || exhausted {
            self.done = true;
        } else {
            self.page += 1;
        }
    }
}

type FetchPage<T> = Box<dyn FnMut(u64, u64) -> BoxFuture<'static, Result<Page<T>, CloudError>> + Send>;

/// Lazy item-by-item view over a paged remote listing.
///
/// A page is only requested once the previous one has been consumed. A fetch
/// error is yielded once and ends the listing.
pub struct Paginated<T> {
    fetch: FetchPage<T>,
    cursor: PageCursor,
    buffered: VecDeque<T>,
}

impl<T: Send + 'static> Paginated<T> {
    pub fn new<F>(page_size: u64, fetch: F) -> Self
    where
        F: FnMut(u64, u64) -> BoxFuture<'static, Result<Page<T>, CloudError>> + Send + 'static,
    {
        Self {
            fetch: Box::new(fetch),
            cursor: PageCursor::new(page_size),
            buffered: VecDeque::new(),
        }
    }

    pub fn cursor(&self) -> PageCursor {
        self.cursor
    }

    /// Starts over from the first page, dropping anything buffered.
    pub fn restart(&mut self) {
        self.cursor = PageCursor::new(self.cursor.page_size);
        self.buffered.clear();
    }

    pub async fn next(&mut self) -> Option<Result<T, CloudError>> {
        loop {
            if let Some(item) = self.buffered.pop_front() {
                return Some(Ok(item));
            }
            if self.cursor.done {
                return None;
            }

            let PageCursor { page, page_size, .. } = self.cursor;
            match (self.fetch)(page, page_size).await {
                Ok(fetched) => {
                    self.cursor.advance(fetched.items.len(), fetched.total_count);
                    self.buffered.extend(fetched.items);
                }
                Err(e) => {
                    self.cursor.done = true;
                    return Some(Err(e));
                }
            }
        }
    }

    pub async fn try_collect(mut self) -> Result<Vec<T>, CloudError> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await {
            items.push(item?);
        }
        Ok(items)
    }
}

/// Optional pattern every image reference must match to be warmed.
#[derive(Debug, Clone, Default)]
pub struct ImageFilter(Option<Regex>);

impl ImageFilter {
    pub fn compile(pattern: Option<&str>) -> Result<Self, ConfigError> {
        match pattern.map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) => Ok(Self(Some(Regex::new(p)?))),
            None => Ok(Self(None)),
        }
    }

    pub fn matches(&self, image_ref: &str) -> bool {
        self.0.as_ref().map_or(true, |re| re.is_match(image_ref))
    }
}

/// Container registry namespace seen as a list of pullable image references.
#[derive(Clone)]
pub struct ImageCatalog {
    catalog: Arc<dyn RegistryCatalog>,
    registry_id: String,
    namespace: String,
    registry_domain: String,
    page_size: u64,
}

impl ImageCatalog {
    pub fn new(
        catalog: Arc<dyn RegistryCatalog>,
        registry_id: impl Into<String>,
        namespace: impl Into<String>,
        registry_domain: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            registry_id: registry_id.into(),
            namespace: namespace.into(),
            registry_domain: registry_domain.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Registry name used as the host prefix of image references.
    pub async fn registry_name(&self) -> Result<String, CloudError> {
        let info = self.catalog.describe_registry(&self.registry_id).await?;
        if info.name.is_empty() {
            return Err(CloudError::not_found(format!(
                "registry '{}' not found",
                self.registry_id
            )));
        }
        Ok(info.name)
    }

    pub fn repositories(&self) -> Paginated<Repository> {
        let catalog = self.catalog.clone();
        let registry_id = self.registry_id.clone();
        let namespace = self.namespace.clone();
        Paginated::new(self.page_size, move |page, size| {
            let catalog = catalog.clone();
            let registry_id = registry_id.clone();
            let namespace = namespace.clone();
            Box::pin(async move {
                catalog
                    .list_repositories(&registry_id, &namespace, page, size)
                    .await
            })
        })
    }

    /// `repository` is the short name, without the namespace prefix.
    pub fn images(&self, repository: &str) -> Paginated<ImageVersion> {
        let catalog = self.catalog.clone();
        let registry_id = self.registry_id.clone();
        let namespace = self.namespace.clone();
        let repository = repository.to_string();
        Paginated::new(self.page_size, move |page, size| {
            let catalog = catalog.clone();
            let registry_id = registry_id.clone();
            let namespace = namespace.clone();
            let repository = repository.clone();
            Box::pin(async move {
                catalog
                    .list_images(&registry_id, &namespace, &repository, page, size)
                    .await
            })
        })
    }

    /// Strips the `namespace/` prefix the registry puts on repository names.
    pub fn short_repository_name<'a>(&self, full: &'a str) -> &'a str {
        full.strip_prefix(self.namespace.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(full)
    }

    pub fn image_ref(&self, registry_name: &str, repository: &str, version: &str) -> String {
        format!(
            "{}.{}/{}/{}:{}",
            registry_name, self.registry_domain, self.namespace, repository, version
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::RegistryInfo;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn numbers(total: u64, report_total: bool) -> (Paginated<u64>, Arc<Mutex<Vec<u64>>>) {
        let pages = Arc::new(Mutex::new(Vec::new()));
        let seen = pages.clone();
        let p = Paginated::new(10, move |page, size| {
            seen.lock().unwrap().push(page);
            let start = (page - 1) * size;
            let items: Vec<u64> = (start..(start + size).min(total)).collect();
            Box::pin(async move {
                Ok::<_, CloudError>(Page {
                    items,
                    total_count: report_total.then_some(total),
                })
            })
        });
        (p, pages)
    }

    #[tokio::test]
    async fn test_exact_multiple_stops_on_total() {
        let (p, pages) = numbers(30, true);
        let items = p.try_collect().await.unwrap();
        assert_eq!(items.len(), 30);
        assert_eq!(*pages.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_short_page_ends_listing() {
        let (p, pages) = numbers(25, true);
        assert_eq!(p.try_collect().await.unwrap().len(), 25);
        assert_eq!(*pages.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_missing_total_stops_after_first_page() {
        let (p, pages) = numbers(50, false);
        assert_eq!(p.try_collect().await.unwrap().len(), 10);
        assert_eq!(*pages.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_lazy_fetch_and_restart() {
        let (mut p, pages) = numbers(30, true);
        assert_eq!(p.next().await.unwrap().unwrap(), 0);
        assert_eq!(*pages.lock().unwrap(), vec![1]);
        for _ in 0..10 {
            p.next().await.unwrap().unwrap();
        }
        assert_eq!(p.cursor().page, 3);

        p.restart();
        assert_eq!(p.cursor(), PageCursor::new(10));
        assert_eq!(p.next().await.unwrap().unwrap(), 0);
        assert_eq!(*pages.lock().unwrap(), vec![1, 2, 1]);
    }

    #[tokio::test]
    async fn test_error_is_yielded_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let mut p: Paginated<u64> = Paginated::new(10, move |_, _| {
            c.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err::<Page<u64>, _>(CloudError::empty("RepositoryList")) })
        });
        assert!(p.next().await.unwrap().is_err());
        assert!(p.next().await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_filter() {
        let any = ImageFilter::compile(None).unwrap();
        assert!(any.matches("x"));
        let blank = ImageFilter::compile(Some("  ")).unwrap();
        assert!(blank.matches("x"));
        let f = ImageFilter::compile(Some(r":v\d+$")).unwrap();
        assert!(f.matches("reg.example.com/ns/app:v2"));
        assert!(!f.matches("reg.example.com/ns/app:latest"));
        assert!(matches!(
            ImageFilter::compile(Some("([")),
            Err(ConfigError::Pattern(_))
        ));
    }

    struct OneRepo;

    #[async_trait]
    impl RegistryCatalog for OneRepo {
        async fn describe_registry(&self, registry_id: &str) -> Result<RegistryInfo, CloudError> {
            Ok(RegistryInfo {
                registry_id: registry_id.to_string(),
                name: "myreg".to_string(),
            })
        }

        async fn list_repositories(
            &self,
            _registry_id: &str,
            namespace: &str,
            _page: u64,
            _page_size: u64,
        ) -> Result<Page<Repository>, CloudError> {
            Ok(Page {
                items: vec![Repository {
                    name: format!("{namespace}/web"),
                }],
                total_count: Some(1),
            })
        }

        async fn list_images(
            &self,
            _registry_id: &str,
            _namespace: &str,
            repository: &str,
            _page: u64,
            _page_size: u64,
        ) -> Result<Page<ImageVersion>, CloudError> {
            assert_eq!(repository, "web");
            Ok(Page {
                items: vec![ImageVersion {
                    version: "1.0".to_string(),
                }],
                total_count: Some(1),
            })
        }
    }

    #[tokio::test]
    async fn test_image_refs_from_catalog() {
        let catalog = ImageCatalog::new(Arc::new(OneRepo), "tcr-1", "team", "tencentcloudcr.com");
        let name = catalog.registry_name().await.unwrap();
        let repos = catalog.repositories().try_collect().await.unwrap();
        let short = catalog.short_repository_name(&repos[0].name).to_string();
        assert_eq!(short, "web");
        let images = catalog.images(&short).try_collect().await.unwrap();
        assert_eq!(
            catalog.image_ref(&name, &short, &images[0].version),
            "myreg.tencentcloudcr.com/team/web:1.0"
        );
        assert_eq!(catalog.short_repository_name("other/web"), "other/web");
    }
}
