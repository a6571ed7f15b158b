//! # markdeep-thesis
//!
//! Turns a browser-rendered Markdeep document into a print-ready thesis.
//! The rendered HTML is parsed into a DOM and rewritten in one pass:
//!
//! - base font size written onto the root element
//! - title page built from the options and placed at the top of `.md`
//! - endnote references turned into self-contained footnote markers
//! - long table of contents flattened, headings given stable page anchors
//! - code listing line numbers frozen into attributes
//! - pixel-sized diagrams moved into a viewBox and zoomed
//!
//! The prepared DOM is then handed to a math engine and a pagination
//! engine, both supplied by the caller through [`MathEngine`] and
//! [`Paginator`].
//!
//! ```no_run
//! use markdeep_thesis::{MarkdeepThesis, ThesisOptions};
//!
//! let options = ThesisOptions::from_json_str(r#"{ "fontSize": 11 }"#).unwrap();
//! let thesis = MarkdeepThesis::builder().options(options).build().unwrap();
//! let prepared = thesis.prepare_html("<div class=\"md\">...</div>").unwrap();
//! println!("{}", prepared.to_html());
//! ```

pub mod diagrams;
mod dom;
pub mod endnotes;
mod error;
pub mod listings;
pub mod math;
pub mod options;
pub mod paginator;
pub mod rules;
pub mod scroll;
pub mod sequencer;
pub mod title_page;
pub mod toc;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

pub use endnotes::EndnoteSummary;
pub use error::{Result, ThesisError};
use kuchiki::NodeRef;
pub use listings::ListingSummary;
use log::info;
pub use math::{CompletionHook, MathCleanup, MathEngine, MathJaxConfig};
pub use options::{PageMargins, PageSize, ThesisOptions, TitlePage, View};
pub use paginator::{BookSetup, DomProgressProbe, PageSetup, Paginator, PrintSetup, ProgressProbe};
pub use rules::{PageDescriptor, Rule, RunningHeader, RunningHeaderFn};
pub use scroll::{FileScrollSlot, MemoryScrollSlot, ScrollSettings, ScrollSlot, Viewport};
pub use sequencer::{Sequencer, Stage};
pub use types::{Margins, PageGeometry, Pt, Size};

/// Per-pass counts from [`MarkdeepThesis::prepare`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrepareReport {
    pub title_page: bool,
    pub endnotes: EndnoteSummary,
    pub toc_entries: usize,
    pub heading_targets: usize,
    pub listings: ListingSummary,
    pub diagrams: usize,
    pub empty_paragraphs_removed: usize,
}

pub struct PreparedDocument {
    pub document: NodeRef,
    pub report: PrepareReport,
}

impl PreparedDocument {
    pub fn to_html(&self) -> String {
        self.document.to_string()
    }
}

pub struct MarkdeepThesis {
    options: ThesisOptions,
    running_header: RunningHeader,
    math_timeout: Duration,
    scroll: ScrollSettings,
    mathjax_src: String,
}

#[derive(Clone)]
pub struct MarkdeepThesisBuilder {
    options: Option<ThesisOptions>,
    running_header: Option<RunningHeaderFn>,
    math_timeout: Duration,
    scroll: ScrollSettings,
    mathjax_src: String,
}

impl Default for MarkdeepThesisBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdeepThesisBuilder {
    pub fn new() -> Self {
        Self {
            options: None,
            running_header: None,
            math_timeout: Duration::from_secs(60),
            scroll: ScrollSettings::default(),
            mathjax_src: math::DEFAULT_MATHJAX_SRC.to_string(),
        }
    }

    pub fn options(mut self, options: ThesisOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Replaces the `runningHeader` template from the options.
    pub fn running_header<F>(mut self, formatter: F) -> Self
    where
        F: Fn(&PageDescriptor) -> String + Send + Sync + 'static,
    {
        self.running_header = Some(Arc::new(formatter));
        self
    }

    pub fn math_timeout(mut self, timeout: Duration) -> Self {
        self.math_timeout = timeout;
        self
    }

    pub fn scroll_settings(mut self, settings: ScrollSettings) -> Self {
        self.scroll = settings;
        self
    }

    pub fn mathjax_src(mut self, src: impl Into<String>) -> Self {
        self.mathjax_src = src.into();
        self
    }

    pub fn build(self) -> Result<MarkdeepThesis> {
        let options = match self.options {
            Some(options) => options,
            None => ThesisOptions::resolve(None)?,
        };
        options.page_geometry()?;
        if self.math_timeout.is_zero() {
            return Err(ThesisError::InvalidConfiguration(
                "math timeout must be non-zero".to_string(),
            ));
        }
        self.scroll.validate()?;
        let running_header = match self.running_header {
            Some(formatter) => RunningHeader::new(formatter),
            None => RunningHeader::from_template(options.running_header.clone()),
        };
        Ok(MarkdeepThesis {
            options,
            running_header,
            math_timeout: self.math_timeout,
            scroll: self.scroll,
            mathjax_src: self.mathjax_src,
        })
    }
}

impl MarkdeepThesis {
    pub fn builder() -> MarkdeepThesisBuilder {
        MarkdeepThesisBuilder::new()
    }

    pub fn options(&self) -> &ThesisOptions {
        &self.options
    }

    /// Runs every DOM preparation pass in order. Stops at the first
    /// malformed structure; passes already applied stay applied.
    pub fn prepare(&self, document: &NodeRef) -> Result<PrepareReport> {
        self.options.apply_font_size(document)?;
        let title_page = title_page::render_title_page(document, self.options.title_page.as_ref())?;
        let endnotes = endnotes::convert_endnotes(document)?;
        let toc_entries = toc::rebuild_toc(document)?.len();
        let heading_targets = toc::pin_heading_targets(document);
        let listings = listings::stabilize_line_numbers(document)?;
        let diagrams = diagrams::rescale_diagrams(document, self.options.markdeep_diagram_scale)?;
        let empty_paragraphs_removed = dom::remove_empty_paragraphs(document);

        let report = PrepareReport {
            title_page,
            endnotes,
            toc_entries,
            heading_targets,
            listings,
            diagrams,
            empty_paragraphs_removed,
        };
        info!(
            "prepared: title_page={} endnote_refs={} toc_entries={} heading_targets={} listing_lines={} diagrams={} empty_p={}",
            report.title_page,
            report.endnotes.references,
            report.toc_entries,
            report.heading_targets,
            report.listings.lines,
            report.diagrams,
            report.empty_paragraphs_removed
        );
        Ok(report)
    }

    pub fn prepare_html(&self, html: &str) -> Result<PreparedDocument> {
        let document = dom::parse_document(html);
        let report = self.prepare(&document)?;
        Ok(PreparedDocument { document, report })
    }

    pub fn math_config(&self) -> MathJaxConfig {
        MathJaxConfig::from_backends(self.options.math_jax.as_slice())
    }

    /// Adds the math engine bootstrap script for in-browser typesetting.
    pub fn inject_math_engine(&self, document: &NodeRef) -> Result<()> {
        math::inject_math_engine(document, &self.math_config(), &self.mathjax_src)
    }

    pub fn book_setup(&self) -> Result<BookSetup> {
        Ok(BookSetup {
            content: paginator::CONTENT_SELECTOR.to_string(),
            page_setup: PageSetup {
                size: self.options.page_size.clone(),
                margin: self.options.page_margins.clone(),
                geometry: self.options.page_geometry()?,
            },
            print_setup: PrintSetup::default(),
            view: self.options.view,
            rules: rules::thesis_rules(
                self.running_header.clone(),
                &self.options.extra_bindery_rules,
            ),
        })
    }

    /// Typesets math, then paginates. Returns the sequencer parked in
    /// [`Stage::Paginating`] so the caller can wait for it to settle.
    pub async fn bind<M, P>(
        &self,
        document: &NodeRef,
        math: &mut M,
        paginator: &mut P,
    ) -> Result<Sequencer>
    where
        M: MathEngine + ?Sized,
        P: Paginator + ?Sized,
    {
        let mut sequencer = Sequencer::new(self.math_timeout);
        let setup = self.book_setup()?;
        sequencer
            .run(document, &self.math_config(), setup, math, paginator)
            .await?;
        Ok(sequencer)
    }

    /// Waits for the paginator to settle, then restores the saved scroll
    /// offset.
    pub async fn restore_scroll<P, S>(
        &self,
        sequencer: &mut Sequencer,
        probe: &P,
        slot: &S,
        viewport: &mut dyn Viewport,
    ) -> Result<Option<u64>>
    where
        P: ProgressProbe + ?Sized,
        S: ScrollSlot + ?Sized,
    {
        sequencer
            .settle(probe, self.scroll.poll_interval, self.scroll.timeout)
            .await?;
        scroll::restore_settled_scroll_position(slot, viewport, self.scroll.settle_delay).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const RENDERED: &str = r##"<!DOCTYPE html>
<html><head><title>Thesis</title></head><body>
<div class="md">
<div class="longTOC"><div class="tocHeader">Contents</div><p><a href="#" class="tocTop">(Top)</a><br>
<a href="#intro" class="level1"><span class="tocNumber">1&nbsp;&nbsp;</span>Intro</a><br>
<a href="#intro/code" class="level2"><span class="tocNumber">1.1&nbsp;&nbsp;</span>Code</a><br>
</p></div>
<a class="target" name="intro">&nbsp;</a><a class="target" name="intro">&nbsp;</a><a class="target" name="toc1">&nbsp;</a><h1>Intro</h1>
<p>A claim<sup><a href="#endnote-src">1</a></sup> and the same claim<sup><a href="#endnote-src">1</a></sup>, see <a href="https://example.org">here</a>.</p>
<p>   </p>
<a class="target" name="code">&nbsp;</a><a class="target" name="intro/code">&nbsp;</a><a class="target" name="toc1.1">&nbsp;</a><h2>Code</h2>
<pre class="listing tilde"><code><span class="linenumbers"><span class="line"></span>fn main() {
<span class="line"></span>    run();
<span class="line"></span>}</span></code></pre>
<svg class="diagram" width="100" height="50"><path d="M 4 4 L 96 46"></path></svg>
<div class="endnote"><a class="target" name="endnote-src">&nbsp;</a><sup>1</sup> Source <em>one</em>.</div>
</div></body></html>"##;

    fn thesis() -> MarkdeepThesis {
        let _ = env_logger::builder().is_test(true).try_init();
        let options = ThesisOptions::resolve(Some(json!({
            "titlePage": { "thesisTitle": "T", "thesisAuthor": "A", "reviewers": ["R1", "R2"] },
            "markdeepDiagramScale": 2.0,
            "extraBinderyRules": [{ "rule": "Custom" }]
        })))
        .expect("options");
        MarkdeepThesis::builder()
            .options(options)
            .math_timeout(Duration::from_millis(200))
            .scroll_settings(ScrollSettings {
                poll_interval: Duration::from_millis(1),
                settle_delay: Duration::from_millis(1),
                timeout: Duration::from_millis(200),
            })
            .build()
            .expect("build")
    }

    #[test]
    fn end_to_end_preparation() {
        let prepared = thesis().prepare_html(RENDERED).expect("prepare");
        let doc = &prepared.document;
        let report = &prepared.report;
        assert!(report.title_page);
        assert_eq!(report.endnotes.references, 2);
        assert_eq!(report.endnotes.bodies_removed, 1);
        assert_eq!(report.toc_entries, 2);
        assert_eq!(report.heading_targets, 2);
        assert_eq!(report.listings.lines, 3);
        assert_eq!(report.diagrams, 1);
        assert_eq!(report.empty_paragraphs_removed, 1);

        let title = doc.select_first(".title-page").expect("title page").text_contents();
        for expected in ["T", "A", "R1", "R2"] {
            assert!(title.contains(expected), "missing {expected} in {title}");
        }

        let contents: Vec<String> = doc
            .select("a.footnote-reference")
            .expect("select")
            .map(|a| endnotes::footnote_content(a.as_node()).expect("decode"))
            .collect();
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0], contents[1]);
        assert!(contents[0].contains("Source <em>one</em>."));
        assert!(doc.select(".endnote").expect("select").next().is_none());

        let numbers: Vec<String> = doc
            .select(".linenumbers .line")
            .expect("select")
            .filter_map(|line| dom::attr(line.as_node(), listings::LINE_NUMBER_ATTR))
            .collect();
        assert_eq!(numbers, vec!["1", "2", "3"]);

        let svg = doc.select_first("svg.diagram").expect("diagram");
        assert_eq!(dom::attr(svg.as_node(), "viewBox").as_deref(), Some("0 0 100 50"));
        let style = dom::attr(svg.as_node(), "style").expect("style");
        assert!(style.contains("width: 200px") && style.contains("height: 100px"), "{style}");

        let root = doc.select_first("html").expect("html");
        let root_style = dom::attr(root.as_node(), "style").expect("root style");
        assert!(root_style.contains("--base-font-size: 10.5pt"));

        let html = prepared.to_html();
        assert!(html.contains("data-footnote-content"));
    }

    #[test]
    fn book_setup_carries_fixed_print_layout_and_extras_last() {
        let setup = thesis().book_setup().expect("setup");
        assert_eq!(setup.content, ".md");
        assert_eq!(setup.view, View::Print);
        let json = serde_json::to_value(&setup).expect("json");
        assert_eq!(json["printSetup"]["layout"], "pages");
        assert_eq!(json["printSetup"]["marks"], "none");
        assert_eq!(json["printSetup"]["bleed"], "0pt");
        assert_eq!(json["pageSetup"]["size"]["width"], "21cm");
        assert_eq!(json["pageSetup"]["margin"]["inner"], "3.5cm");
        let rules = json["rules"].as_array().expect("rules");
        assert_eq!(rules.last(), Some(&json!({ "rule": "Custom" })));
    }

    #[test]
    fn custom_running_header_is_offset_like_the_template() {
        let thesis = MarkdeepThesis::builder()
            .running_header(|page| format!("- {} -", page.number))
            .build()
            .expect("build");
        let setup = thesis.book_setup().expect("setup");
        let header = setup
            .rules
            .iter()
            .find_map(|rule| match rule {
                Rule::RunningHeader(header) => Some(header.clone()),
                _ => None,
            })
            .expect("running header rule");
        let page = |number| PageDescriptor {
            number,
            is_left: true,
        };
        assert_eq!(header.render(&page(2)), "");
        assert_eq!(header.render(&page(5)), "- 3 -");
    }

    #[test]
    fn running_header_template_reaches_serialized_setup() {
        let options = ThesisOptions::resolve(Some(json!({
            "runningHeader": "Chapter page {number} ({side})"
        })))
        .expect("options");
        let thesis = MarkdeepThesis::builder().options(options).build().expect("build");
        let json = serde_json::to_value(thesis.book_setup().expect("setup")).expect("json");
        let header = json["rules"]
            .as_array()
            .expect("rules")
            .iter()
            .find(|rule| rule["rule"] == "RunningHeader")
            .expect("running header rule");
        assert_eq!(header["template"], "Chapter page {number} ({side})");
        assert_eq!(header["frontMatterPages"], 2);
    }

    #[test]
    fn zero_scroll_timings_are_rejected_at_build() {
        for settings in [
            ScrollSettings {
                poll_interval: Duration::ZERO,
                ..ScrollSettings::default()
            },
            ScrollSettings {
                timeout: Duration::ZERO,
                ..ScrollSettings::default()
            },
        ] {
            let result = MarkdeepThesis::builder().scroll_settings(settings).build();
            assert!(matches!(result, Err(ThesisError::InvalidConfiguration(_))));
        }
    }

    struct InstantMath;

    impl MathEngine for InstantMath {
        fn load(&mut self, _: &NodeRef, config: &MathJaxConfig, on_end: CompletionHook) -> Result<()> {
            assert_eq!(config.jax.last().map(String::as_str), Some("output/SVG"));
            on_end.fire();
            Ok(())
        }
    }

    /// Marks the book root busy on `make_book`; the test clears it.
    #[derive(Default)]
    struct RecordingPaginator {
        setups: Vec<BookSetup>,
    }

    impl Paginator for RecordingPaginator {
        fn make_book(&mut self, document: &NodeRef, setup: BookSetup) -> Result<()> {
            let body = document
                .select_first("body")
                .map_err(|_| ThesisError::Pagination("no body".to_string()))?;
            for node in dom::parse_fragment(r#"<div class="📖-root 📖-in-progress"></div>"#) {
                body.as_node().append(node);
            }
            self.setups.push(setup);
            Ok(())
        }
    }

    #[tokio::test]
    async fn bind_then_restore_scroll_after_settlement() {
        let thesis = thesis();
        let prepared = thesis.prepare_html(RENDERED).expect("prepare");
        let mut paginator = RecordingPaginator::default();
        let mut sequencer = thesis
            .bind(&prepared.document, &mut InstantMath, &mut paginator)
            .await
            .expect("bind");
        assert_eq!(sequencer.stage(), Stage::Paginating);
        assert_eq!(paginator.setups.len(), 1);

        let probe = DomProgressProbe::new(&prepared.document);
        assert!(probe.in_progress().expect("probe"));
        let root = prepared
            .document
            .descendants()
            .find(|node| dom::has_class(node, paginator::BOOK_ROOT_CLASS))
            .expect("book root");
        dom::set_attr(&root, "class", paginator::BOOK_ROOT_CLASS);

        struct Window(u64);
        impl Viewport for Window {
            fn scroll_offset(&self) -> u64 {
                self.0
            }
            fn scroll_to(&mut self, offset: u64) {
                self.0 = offset;
            }
        }
        let slot = MemoryScrollSlot::default();
        scroll::save_scroll_position(&slot, &Window(480)).expect("save");
        let mut window = Window(0);
        let restored = thesis
            .restore_scroll(&mut sequencer, &probe, &slot, &mut window)
            .await
            .expect("restore");
        assert_eq!(restored, Some(480));
        assert_eq!(window.0, 480);
        assert_eq!(sequencer.stage(), Stage::Settled);
    }
}
