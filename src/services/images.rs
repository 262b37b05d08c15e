use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use reqwest::{header::CONTENT_TYPE, Client as HttpClient, Url};
use tokio::task::JoinHandle;

use crate::error::SearchError;

/// Downloaded image bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Trait for image sources
///
/// Caching, if any, belongs to the implementation.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ImageLoader: Send + Sync {
    async fn resolve_image(&self, url: &Url) -> Result<Image, SearchError>;
}

/// Plain HTTP GET image loader
#[derive(Clone, Default)]
pub struct HttpImageLoader {
    http_client: HttpClient,
}

impl HttpImageLoader {
    pub fn new() -> Self {
        Self {
            http_client: HttpClient::new(),
        }
    }
}

#[async_trait::async_trait]
impl ImageLoader for HttpImageLoader {
    async fn resolve_image(&self, url: &Url) -> Result<Image, SearchError> {
        let response = self.http_client.get(url.clone()).send().await?;

        if !response.status().is_success() {
            return Err(SearchError::Backend {
                code: response.status().as_u16(),
                message: format!("Image request failed for {}", url),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?.to_vec();

        tracing::debug!(url = %url, size = bytes.len(), "Image fetched");

        Ok(Image {
            bytes,
            content_type,
        })
    }
}

/// What a list slot currently displays
#[derive(Debug, Clone, PartialEq)]
pub enum SlotImage {
    /// The bound record has no image
    Empty,
    /// Waiting for the bound image
    Placeholder,
    Loaded(Arc<Image>),
    Failed(SearchError),
}

#[derive(Debug)]
struct SlotState {
    binding: u64,
    reference: Option<Url>,
    image: SlotImage,
}

/// One recyclable list slot with cancel-on-reuse image loading
///
/// Binding a new reference aborts the previous download. A result that still slips
/// through for an earlier binding is ignored.
pub struct ImageSlot {
    loader: Arc<dyn ImageLoader>,
    state: Arc<Mutex<SlotState>>,
    task: Option<JoinHandle<()>>,
}

impl ImageSlot {
    pub fn new(loader: Arc<dyn ImageLoader>) -> Self {
        Self {
            loader,
            state: Arc::new(Mutex::new(SlotState {
                binding: 0,
                reference: None,
                image: SlotImage::Empty,
            })),
            task: None,
        }
    }

    /// Points the slot at a new record's image, cancelling whatever was loading
    pub fn bind(&mut self, reference: Option<Url>) {
        if let Some(task) = self.task.take() {
            task.abort();
        }

        let binding = {
            let mut state = lock(&self.state);
            state.binding += 1;
            state.reference = reference.clone();
            state.image = if reference.is_some() {
                SlotImage::Placeholder
            } else {
                SlotImage::Empty
            };
            state.binding
        };

        let Some(url) = reference else {
            return;
        };

        let loader = self.loader.clone();
        let state = self.state.clone();
        self.task = Some(tokio::spawn(async move {
            let outcome = loader.resolve_image(&url).await;

            let mut state = lock(&state);
            if state.binding != binding {
                tracing::trace!(url = %url, "Ignoring image for recycled slot");
                return;
            }
            state.image = match outcome {
                Ok(image) => SlotImage::Loaded(Arc::new(image)),
                Err(error) => {
                    tracing::warn!(url = %url, error = %error, "Image load failed");
                    SlotImage::Failed(error)
                }
            };
        }));
    }

    pub fn image(&self) -> SlotImage {
        lock(&self.state).image.clone()
    }

    pub fn reference(&self) -> Option<Url> {
        lock(&self.state).reference.clone()
    }

    /// Waits for the current load, if any, to finish
    pub async fn settle(&mut self) {
        if let Some(task) = self.task.take() {
            // Aborted tasks surface as a join error, which leaves nothing to wait for
            let _ = task.await;
        }
    }
}

impl Drop for ImageSlot {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn lock(state: &Mutex<SlotState>) -> MutexGuard<'_, SlotState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
