use kuchiki::NodeRef;
use log::debug;
use tokio::sync::oneshot;

use crate::dom;
use crate::error::{Result, ThesisError};

pub const DEFAULT_MATHJAX_SRC: &str =
    "markdeep-thesis/lib/mathjax/2.7.5/MathJax.js?config=TeX-MML-AM_SVG";
pub const MATH_DONE_EVENT: &str = "markdeep-thesis:math-done";
const OUTPUT_JAX: &str = "output/SVG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathBackend {
    Tex,
    MathMl,
    AsciiMath,
}

impl MathBackend {
    pub fn from_name(name: &str) -> Option<MathBackend> {
        match name {
            "TeX" => Some(MathBackend::Tex),
            "MathML" => Some(MathBackend::MathMl),
            "AsciiMath" => Some(MathBackend::AsciiMath),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            MathBackend::Tex => "tex2jax.js",
            MathBackend::MathMl => "mml2jax.js",
            MathBackend::AsciiMath => "asciimath2jax.js",
        }
    }

    pub fn input_jax(self) -> &'static str {
        match self {
            MathBackend::Tex => "input/TeX",
            MathBackend::MathMl => "input/MathML",
            MathBackend::AsciiMath => "input/AsciiMath",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MathJaxConfig {
    pub extensions: Vec<String>,
    pub jax: Vec<String>,
}

impl MathJaxConfig {
    /// Unrecognised backend names are dropped. The SVG output jax is always
    /// last.
    pub fn from_backends<S: AsRef<str>>(names: &[S]) -> MathJaxConfig {
        let mut config = MathJaxConfig::default();
        for name in names {
            match MathBackend::from_name(name.as_ref()) {
                Some(backend) => {
                    config.extensions.push(backend.extension().to_string());
                    config.jax.push(backend.input_jax().to_string());
                }
                None => debug!("ignoring unknown math backend '{}'", name.as_ref()),
            }
        }
        config.jax.push(OUTPUT_JAX.to_string());
        config
    }

    /// Engine configuration script. Completion is announced as a DOM event so
    /// whatever drives pagination can listen for it.
    pub fn bootstrap_script(&self) -> String {
        let extensions = serde_json::to_string(&self.extensions).unwrap_or_else(|_| "[]".into());
        let jax = serde_json::to_string(&self.jax).unwrap_or_else(|_| "[]".into());
        format!(
            "MathJax.Hub.Config({{extensions: {extensions}, jax: {jax}}});\n\
             MathJax.Hub.Startup.onload();\n\
             MathJax.Hub.Register.StartupHook(\"End\", function () {{\n\
             \x20   document.dispatchEvent(new Event(\"{MATH_DONE_EVENT}\"));\n\
             }});"
        )
    }
}

/// Appends the engine `<script>` (source URL plus configuration) to `<head>`.
pub fn inject_math_engine(document: &NodeRef, config: &MathJaxConfig, src: &str) -> Result<()> {
    let head = document
        .select_first("head")
        .map_err(|_| ThesisError::MissingElement("head".to_string()))?;
    let markup = format!(
        "<script type=\"text/javascript\" src=\"{}\">{}</script>",
        src.replace('"', "&quot;"),
        config.bootstrap_script()
    );
    for node in dom::parse_fragment(&markup) {
        head.as_node().append(node);
    }
    Ok(())
}

/// Fired once by a math engine when typesetting has finished.
#[derive(Debug)]
pub struct CompletionHook(oneshot::Sender<std::result::Result<(), String>>);

impl CompletionHook {
    pub fn channel() -> (
        CompletionHook,
        oneshot::Receiver<std::result::Result<(), String>>,
    ) {
        let (tx, rx) = oneshot::channel();
        (CompletionHook(tx), rx)
    }

    pub fn fire(self) {
        let _ = self.0.send(Ok(()));
    }

    pub fn fail(self, reason: impl Into<String>) {
        let _ = self.0.send(Err(reason.into()));
    }
}

/// A math typesetting engine. `load` starts typesetting and returns; the
/// engine owns `on_end` and fires it exactly once when all math is done.
pub trait MathEngine {
    fn load(
        &mut self,
        document: &NodeRef,
        config: &MathJaxConfig,
        on_end: CompletionHook,
    ) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MathCleanup {
    pub graphics_relocated: usize,
    pub previews_removed: usize,
    pub scripts_removed: usize,
}

fn detach_all(document: &NodeRef, selector: &str) -> usize {
    let nodes: Vec<NodeRef> = match document.select(selector) {
        Ok(found) => found.map(|el| el.as_node().clone()).collect(),
        Err(_) => return 0,
    };
    for node in &nodes {
        node.detach();
    }
    nodes.len()
}

/// Pulls every generated math graphic out of its wrapper into the text flow
/// and removes the engine's preview markers and inline source scripts.
pub fn postprocess_math(document: &NodeRef) -> MathCleanup {
    let graphics: Vec<NodeRef> = match document.select(".MathJax_SVG > svg") {
        Ok(found) => found.map(|el| el.as_node().clone()).collect(),
        Err(_) => Vec::new(),
    };
    for svg in &graphics {
        dom::replace_parent_with(svg);
    }
    let cleanup = MathCleanup {
        graphics_relocated: graphics.len(),
        previews_removed: detach_all(document, ".MathJax_Preview"),
        scripts_removed: detach_all(document, "script[type^='math/tex']"),
    };
    debug!(
        "math: {} graphics relocated, {} previews and {} scripts removed",
        cleanup.graphics_relocated, cleanup.previews_removed, cleanup.scripts_removed
    );
    cleanup
}
