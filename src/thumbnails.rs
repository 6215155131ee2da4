//! Lazy thumbnail loader: preview renders on demand, at most once per page.
//!
//! Any scheduler that can say "page P is about to become visible" drives
//! the loader through [`ThumbnailLoader::signal_visible`]: a scroll
//! handler, a polling loop, or a [`Stream`] fed to
//! [`ThumbnailLoader::drive`]. [`ProximityWindow`] is a small helper that
//! turns a scroll position into those signals.
//!
//! ## Per-page state machine
//!
//! ```text
//! Idle ──signal──▶ Loading ──render──▶ Success | Error
//! ```
//!
//! The `Idle → Loading` transition happens under the loader's lock at the
//! moment the request is issued, so a second signal for the same page is a
//! no-op even while the first render is still running. Nothing moves a page
//! back to `Idle` except unloading the document.
//!
//! ## Preview handles
//!
//! A successful preview's bytes live in the loader and are addressed by a
//! [`PreviewHandle`]. [`ThumbnailLoader::unload`] (also run on drop) aborts
//! outstanding requests and frees every handle at once.

use crate::output::PageArtifact;
use crate::pipeline::document::PageSource;
use crate::pipeline::render::{self, QualitySpec};
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::debug;

/// Opaque reference to one preview's encoded bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PreviewHandle(u64);

/// Preview state of one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThumbnailState {
    Idle,
    Loading,
    Success {
        handle: PreviewHandle,
        width: u32,
        height: u32,
    },
    Error(String),
}

impl ThumbnailState {
    pub fn is_settled(&self) -> bool {
        matches!(self, ThumbnailState::Success { .. } | ThumbnailState::Error(_))
    }
}

struct LoaderState {
    /// Bumped on unload; results from an older generation are dropped.
    generation: u64,
    slots: Vec<ThumbnailState>,
    previews: HashMap<PreviewHandle, Arc<[u8]>>,
    next_handle: u64,
    tasks: HashMap<usize, AbortHandle>,
}

struct LoaderInner {
    source: Arc<dyn PageSource>,
    state: Mutex<LoaderState>,
    /// Ticks whenever a page settles or the loader is unloaded.
    settled: watch::Sender<u64>,
}

impl LoaderInner {
    fn lock(&self) -> MutexGuard<'_, LoaderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        self.settled.send_modify(|tick| *tick = tick.wrapping_add(1));
    }

    fn settle(&self, generation: u64, artifact: PageArtifact) {
        {
            let mut st = self.lock();
            if st.generation != generation {
                debug!("Dropping stale preview for page {}", artifact.page_num);
                return;
            }
            let page = artifact.page_num;
            st.tasks.remove(&page);

            let next = match (artifact.data, artifact.error) {
                (Some(bytes), _) => {
                    let handle = PreviewHandle(st.next_handle);
                    st.next_handle += 1;
                    st.previews.insert(handle, Arc::from(bytes));
                    ThumbnailState::Success {
                        handle,
                        width: artifact.width,
                        height: artifact.height,
                    }
                }
                (None, err) => {
                    let detail = err
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "no preview produced".to_string());
                    debug!("Preview for page {} failed: {}", page, detail);
                    ThumbnailState::Error(detail)
                }
            };
            if let Some(slot) = st.slots.get_mut(page - 1) {
                *slot = next;
            }
        }
        self.notify();
    }
}

/// Drives preview renders for one loaded document.
///
/// Requires a Tokio runtime: each request is a spawned task.
pub struct ThumbnailLoader {
    inner: Arc<LoaderInner>,
}

impl fmt::Debug for ThumbnailLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.inner.lock();
        f.debug_struct("ThumbnailLoader")
            .field("pages", &st.slots.len())
            .field("in_flight", &st.tasks.len())
            .field("previews", &st.previews.len())
            .finish()
    }
}

impl ThumbnailLoader {
    pub fn new(source: Arc<dyn PageSource>) -> Self {
        let pages = source.page_count();
        let (settled, _) = watch::channel(0);
        Self {
            inner: Arc::new(LoaderInner {
                source,
                state: Mutex::new(LoaderState {
                    generation: 0,
                    slots: vec![ThumbnailState::Idle; pages],
                    previews: HashMap::new(),
                    next_handle: 0,
                    tasks: HashMap::new(),
                }),
                settled,
            }),
        }
    }

    pub fn page_count(&self) -> usize {
        self.inner.lock().slots.len()
    }

    /// Page `page_num` is about to become visible.
    ///
    /// Issues a preview render if the page is `Idle` and returns `true`;
    /// otherwise (already loading or settled, out of range, unloaded) does
    /// nothing and returns `false`.
    pub fn signal_visible(&self, page_num: usize) -> bool {
        let mut st = self.inner.lock();
        let idx = match page_num.checked_sub(1) {
            Some(i) if st.slots.get(i) == Some(&ThumbnailState::Idle) => i,
            _ => return false,
        };
        st.slots[idx] = ThumbnailState::Loading;

        let generation = st.generation;
        let inner = Arc::clone(&self.inner);
        debug!("Requesting preview for page {}", page_num);
        let task = tokio::spawn(async move {
            let artifact =
                render::render_page(Arc::clone(&inner.source), page_num, QualitySpec::preview())
                    .await;
            inner.settle(generation, artifact);
        });
        st.tasks.insert(page_num, task.abort_handle());
        true
    }

    /// Signal every page yielded by `signals`; returns how many requests
    /// were actually issued.
    pub async fn drive<S>(&self, signals: S) -> usize
    where
        S: Stream<Item = usize>,
    {
        futures::pin_mut!(signals);
        let mut issued = 0;
        while let Some(page_num) = signals.next().await {
            if self.signal_visible(page_num) {
                issued += 1;
            }
        }
        issued
    }

    /// Current state; `Idle` for pages the loader does not know.
    pub fn status(&self, page_num: usize) -> ThumbnailState {
        let st = self.inner.lock();
        page_num
            .checked_sub(1)
            .and_then(|i| st.slots.get(i))
            .cloned()
            .unwrap_or(ThumbnailState::Idle)
    }

    /// Wait until the page's request has settled.
    ///
    /// Returns immediately for pages that are not `Loading`.
    pub async fn settled(&self, page_num: usize) -> ThumbnailState {
        let mut rx = self.inner.settled.subscribe();
        loop {
            let state = self.status(page_num);
            if state != ThumbnailState::Loading {
                return state;
            }
            if rx.changed().await.is_err() {
                return self.status(page_num);
            }
        }
    }

    pub fn preview_bytes(&self, handle: PreviewHandle) -> Option<Arc<[u8]>> {
        self.inner.lock().previews.get(&handle).cloned()
    }

    /// Free one preview's bytes. The page stays `Success`.
    pub fn release(&self, handle: PreviewHandle) -> bool {
        self.inner.lock().previews.remove(&handle).is_some()
    }

    /// Number of previews currently holding bytes.
    pub fn live_handles(&self) -> usize {
        self.inner.lock().previews.len()
    }

    /// Abort in-flight requests, free every preview and forget all pages.
    pub fn unload(&self) {
        {
            let mut st = self.inner.lock();
            st.generation += 1;
            for (_, task) in st.tasks.drain() {
                task.abort();
            }
            let freed = st.previews.len();
            st.previews.clear();
            st.slots.clear();
            debug!("Thumbnail loader unloaded, {} previews released", freed);
        }
        self.inner.notify();
    }
}

impl Drop for ThumbnailLoader {
    fn drop(&mut self) {
        self.unload();
    }
}

// ── Visibility helper ────────────────────────────────────────────────────

/// Vertical page layout used to decide which pages are near the viewport.
#[derive(Debug, Clone, PartialEq)]
pub struct ProximityWindow {
    /// `(top, bottom)` of each page in scroll coordinates.
    extents: Vec<(f64, f64)>,
    margin: f64,
}

impl ProximityWindow {
    /// Pages within this many pixels of the viewport count as visible.
    pub const DEFAULT_MARGIN: f64 = 200.0;

    /// Stack pages of the given heights top to bottom, `gap` pixels apart.
    pub fn new(page_heights: &[f64], gap: f64) -> Self {
        let mut top = 0.0;
        let extents = page_heights
            .iter()
            .map(|&h| {
                let extent = (top, top + h);
                top += h + gap;
                extent
            })
            .collect();
        Self {
            extents,
            margin: Self::DEFAULT_MARGIN,
        }
    }

    /// Layout of `source` with every page drawn at `scale`.
    ///
    /// Pages whose size cannot be read take the height of the page before.
    pub fn for_document(source: &dyn PageSource, scale: f32, gap: f64) -> Self {
        let mut last = 0.0;
        let heights: Vec<f64> = (1..=source.page_count())
            .map(|p| {
                if let Ok(size) = source.page_size(p) {
                    last = f64::from(size.viewport(scale).height);
                }
                last
            })
            .collect();
        Self::new(&heights, gap)
    }

    pub fn with_margin(mut self, margin: f64) -> Self {
        self.margin = margin.max(0.0);
        self
    }

    /// Pages overlapping `[scroll_top - margin, scroll_top + viewport_height + margin]`.
    pub fn candidates(&self, scroll_top: f64, viewport_height: f64) -> Vec<usize> {
        let lo = scroll_top - self.margin;
        let hi = scroll_top + viewport_height + self.margin;
        self.extents
            .iter()
            .enumerate()
            .filter(|(_, &(top, bottom))| bottom >= lo && top <= hi)
            .map(|(i, _)| i + 1)
            .collect()
    }
}
