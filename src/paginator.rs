use std::time::{Duration, Instant};

use kuchiki::NodeRef;
use log::{debug, warn};
use serde::Serialize;

use crate::dom;
use crate::error::{Result, ThesisError};
use crate::options::{PageMargins, PageSize, View};
use crate::rules::Rule;
use crate::types::PageGeometry;

pub const CONTENT_SELECTOR: &str = ".md";
pub const BOOK_ROOT_CLASS: &str = "📖-root";
pub const IN_PROGRESS_CLASS: &str = "📖-in-progress";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageSetup {
    pub size: PageSize,
    pub margin: PageMargins,
    #[serde(skip)]
    pub geometry: PageGeometry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    Pages,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Paper {
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Marks {
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrintSetup {
    pub layout: Layout,
    pub paper: Paper,
    pub marks: Marks,
    pub bleed: String,
}

impl Default for PrintSetup {
    fn default() -> Self {
        Self {
            layout: Layout::Pages,
            paper: Paper::Auto,
            marks: Marks::None,
            bleed: "0pt".to_string(),
        }
    }
}

/// Everything the pagination engine is invoked with.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSetup {
    pub content: String,
    pub page_setup: PageSetup,
    pub print_setup: PrintSetup,
    pub view: View,
    pub rules: Vec<Rule>,
}

/// A pagination engine. `make_book` starts laying out the content; the
/// engine may keep working after it returns, which a [`ProgressProbe`] observes.
pub trait Paginator {
    fn make_book(&mut self, document: &NodeRef, setup: BookSetup) -> Result<()>;
}

pub trait ProgressProbe {
    fn in_progress(&self) -> Result<bool>;
}

/// Reads the engine's progress marker off the book root in the DOM.
pub struct DomProgressProbe {
    document: NodeRef,
}

impl DomProgressProbe {
    pub fn new(document: &NodeRef) -> Self {
        Self {
            document: document.clone(),
        }
    }
}

impl ProgressProbe for DomProgressProbe {
    fn in_progress(&self) -> Result<bool> {
        let root = self
            .document
            .descendants()
            .find(|node| dom::has_class(node, BOOK_ROOT_CLASS))
            .ok_or_else(|| ThesisError::MissingElement(BOOK_ROOT_CLASS.to_string()))?;
        Ok(dom::has_class(&root, IN_PROGRESS_CLASS))
    }
}

/// Polls `probe` every `interval` until it reports idle. A probe error counts
/// as still in progress. Gives up with `PaginationTimeout` after `timeout`.
pub async fn wait_for_settlement<P: ProgressProbe + ?Sized>(
    probe: &P,
    interval: Duration,
    timeout: Duration,
) -> Result<Duration> {
    if interval.is_zero() {
        return Err(ThesisError::InvalidConfiguration(
            "settlement poll interval must be non-zero".to_string(),
        ));
    }
    let started = Instant::now();
    let mut ticker = tokio::time::interval(interval);
    let poll = async {
        let mut polls = 0u64;
        loop {
            ticker.tick().await;
            polls += 1;
            match probe.in_progress() {
                Ok(false) => return polls,
                Ok(true) => {}
                Err(err) => {
                    if polls == 1 {
                        warn!("pagination probe failed, treating as in progress: {err}");
                    }
                }
            }
        }
    };
    match tokio::time::timeout(timeout, poll).await {
        Ok(polls) => {
            let elapsed = started.elapsed();
            debug!("pagination settled after {polls} polls ({elapsed:?})");
            Ok(elapsed)
        }
        Err(_) => Err(ThesisError::PaginationTimeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct CountdownProbe {
        remaining: Cell<u32>,
        fail_first: bool,
    }

    impl ProgressProbe for CountdownProbe {
        fn in_progress(&self) -> Result<bool> {
            let left = self.remaining.get();
            if left == 0 {
                return Ok(false);
            }
            self.remaining.set(left - 1);
            if self.fail_first {
                return Err(ThesisError::MissingElement("root".to_string()));
            }
            Ok(true)
        }
    }

    #[tokio::test]
    async fn settles_once_marker_disappears() {
        let probe = CountdownProbe {
            remaining: Cell::new(3),
            fail_first: false,
        };
        wait_for_settlement(&probe, Duration::from_millis(1), Duration::from_secs(5))
            .await
            .expect("settled");
        assert_eq!(probe.remaining.get(), 0);
    }

    #[tokio::test]
    async fn probe_faults_are_retried() {
        let probe = CountdownProbe {
            remaining: Cell::new(2),
            fail_first: true,
        };
        assert!(
            wait_for_settlement(&probe, Duration::from_millis(1), Duration::from_secs(5))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn unsettled_engine_times_out() {
        let probe = CountdownProbe {
            remaining: Cell::new(u32::MAX),
            fail_first: false,
        };
        let err = wait_for_settlement(&probe, Duration::from_millis(1), Duration::from_millis(30))
            .await
            .expect_err("timeout");
        assert!(matches!(err, ThesisError::PaginationTimeout(_)));
    }

    #[tokio::test]
    async fn zero_interval_is_a_configuration_error() {
        let probe = CountdownProbe {
            remaining: Cell::new(0),
            fail_first: false,
        };
        let err = wait_for_settlement(&probe, Duration::ZERO, Duration::from_secs(1))
            .await
            .expect_err("zero interval");
        assert!(matches!(err, ThesisError::InvalidConfiguration(_)));
    }

    #[test]
    fn dom_probe_reads_marker_class() {
        let doc = dom::parse_document(r#"<div class="📖-root 📖-in-progress"></div>"#);
        let probe = DomProgressProbe::new(&doc);
        assert!(probe.in_progress().expect("probe"));
        let root = doc.select_first("div").expect("root");
        dom::set_attr(root.as_node(), "class", BOOK_ROOT_CLASS);
        assert!(!probe.in_progress().expect("probe"));

        let bare = dom::parse_document("<div></div>");
        assert!(DomProgressProbe::new(&bare).in_progress().is_err());
    }
}
